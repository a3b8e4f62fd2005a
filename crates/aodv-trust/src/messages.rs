//! Wire messages
//!
//! All frames exchanged between routers are a postcard-encoded
//! [`WireMessage`]. The same formats are used with and without trust
//! filtering.

use serde::{Deserialize, Serialize};

use aodv_core::{ControlKind, DataPacket, NodeAddress, ProtocolError};

/// Route request, flooded toward the destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub struct RouteRequest<A: NodeAddress> {
    /// Node searching for a route
    pub originator: A,
    /// Originator's own sequence number
    pub originator_seq: u32,
    /// Node being searched for
    pub destination: A,
    /// Last destination sequence number known along the way
    pub dest_seq: Option<u32>,
    /// Per-originator request id
    pub broadcast_id: u32,
    /// Hops travelled so far
    pub hop_count: u8,
    /// Weakest neighbor score along the path so far
    pub path_trust: f64,
}

/// Route reply, unicast back along the reverse path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub struct RouteReply<A: NodeAddress> {
    /// Node that asked for the route
    pub originator: A,
    /// Destination the route leads to
    pub destination: A,
    /// Destination sequence number vouched for
    pub dest_seq: u32,
    /// Hops from the replying node to the destination
    pub hop_count: u8,
    /// Remaining lifetime of the route, in milliseconds
    pub lifetime_ms: u32,
    /// Weakest neighbor score along the path so far
    pub path_trust: f64,
}

/// Destinations that became unreachable through the sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub struct RouteError<A: NodeAddress> {
    /// (destination, sequence number) pairs
    pub unreachable: Vec<(A, u32)>,
}

/// Periodic liveness beacon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub struct Hello<A: NodeAddress> {
    /// Beaconing node
    pub sender: A,
    /// Its own sequence number
    pub sender_seq: u32,
}

/// Every frame a router sends or receives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub enum WireMessage<A: NodeAddress> {
    Request(RouteRequest<A>),
    Reply(RouteReply<A>),
    Error(RouteError<A>),
    Hello(Hello<A>),
    Data(DataPacket<A>),
}

impl<A: NodeAddress> WireMessage<A> {
    /// Encode for transmission
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        postcard::to_allocvec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a received frame, rejecting structurally impossible messages
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let message: Self = postcard::from_bytes(bytes)?;
        message.check()?;
        Ok(message)
    }

    /// Control message kind; `None` for data
    pub fn kind(&self) -> Option<ControlKind> {
        match self {
            Self::Request(_) => Some(ControlKind::RouteRequest),
            Self::Reply(_) => Some(ControlKind::RouteReply),
            Self::Error(_) => Some(ControlKind::RouteError),
            Self::Hello(_) => Some(ControlKind::Hello),
            Self::Data(_) => None,
        }
    }

    fn check(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Request(req) if req.originator == req.destination => Err(
                ProtocolError::Malformed("request originator equals destination".into()),
            ),
            Self::Reply(rep) if rep.originator == rep.destination => Err(
                ProtocolError::Malformed("reply originator equals destination".into()),
            ),
            Self::Request(RouteRequest { path_trust, .. })
            | Self::Reply(RouteReply { path_trust, .. })
                if !path_trust.is_finite() =>
            {
                Err(ProtocolError::Malformed("path trust is not finite".into()))
            }
            Self::Error(err) if err.unreachable.is_empty() => Err(ProtocolError::Malformed(
                "route error lists no destination".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aodv_core::{Ipv4Address, PacketId};

    fn addr(n: u8) -> Ipv4Address {
        Ipv4Address::new(10, 1, 1, n)
    }

    fn request() -> RouteRequest<Ipv4Address> {
        RouteRequest {
            originator: addr(1),
            originator_seq: 3,
            destination: addr(9),
            dest_seq: None,
            broadcast_id: 1,
            hop_count: 0,
            path_trust: 1.0,
        }
    }

    #[test]
    fn test_request_roundtrip_and_kind() {
        let msg = WireMessage::Request(request());
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.kind(), Some(ControlKind::RouteRequest));
    }

    #[test]
    fn test_data_has_no_control_kind() {
        let packet = DataPacket::new(PacketId::new(addr(1), 1), addr(9), 64, vec![7; 32]);
        let msg = WireMessage::Data(packet);
        let decoded = WireMessage::<Ipv4Address>::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind(), None);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(WireMessage::<Ipv4Address>::decode(&[0xff, 0xff, 0xff]).is_err());
        assert!(WireMessage::<Ipv4Address>::decode(&[]).is_err());
    }

    #[test]
    fn test_structural_checks() {
        let mut req = request();
        req.destination = req.originator;
        let bytes = WireMessage::Request(req).encode().unwrap();
        assert!(matches!(
            WireMessage::<Ipv4Address>::decode(&bytes),
            Err(ProtocolError::Malformed(_))
        ));

        let bytes = WireMessage::<Ipv4Address>::Error(RouteError {
            unreachable: vec![],
        })
        .encode()
        .unwrap();
        assert!(matches!(
            WireMessage::<Ipv4Address>::decode(&bytes),
            Err(ProtocolError::Malformed(_))
        ));

        let mut req = request();
        req.path_trust = f64::NAN;
        let bytes = WireMessage::Request(req).encode().unwrap();
        assert!(WireMessage::<Ipv4Address>::decode(&bytes).is_err());
    }
}
