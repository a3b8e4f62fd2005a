//! Observable routing events
//!
//! Routers report everything an external harness needs to compute delivery
//! statistics through [`RoutingEvent`]s handed to
//! [`NodeContext::emit`](crate::NodeContext::emit).

use serde::{Deserialize, Serialize};

use crate::identity::NodeAddress;
use crate::packet::PacketId;

/// Kind of control message, for overhead accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ControlKind {
    RouteRequest,
    RouteReply,
    RouteError,
    Hello,
}

impl std::fmt::Display for ControlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RouteRequest => write!(f, "RREQ"),
            Self::RouteReply => write!(f, "RREP"),
            Self::RouteError => write!(f, "RERR"),
            Self::Hello => write!(f, "HELLO"),
        }
    }
}

/// Trust classification of a neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustState {
    /// Score above the trusted threshold
    Trusted,
    /// Between thresholds: participates but loses tie-breaks
    Suspect,
    /// Below the blacklist threshold: excluded from routing
    Blacklisted,
}

impl std::fmt::Display for TrustState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trusted => write!(f, "TRUSTED"),
            Self::Suspect => write!(f, "SUSPECT"),
            Self::Blacklisted => write!(f, "BLACKLISTED"),
        }
    }
}

/// Events emitted by a router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub enum RoutingEvent<A: NodeAddress> {
    /// The application handed a packet to the router
    DataOriginated {
        packet_id: PacketId<A>,
        destination: A,
        bytes: usize,
    },

    /// A packet was transmitted to the next hop
    DataForwarded {
        packet_id: PacketId<A>,
        next_hop: A,
    },

    /// A packet reached its destination
    DataDelivered {
        packet_id: PacketId<A>,
        bytes: usize,
        hops: u8,
    },

    /// A packet was discarded
    DataDropped {
        packet_id: PacketId<A>,
        reason: DropReason,
    },

    /// A route became usable
    RouteEstablished {
        destination: A,
        next_hop: A,
        hop_count: u8,
    },

    /// A route stopped being usable
    RouteInvalidated { destination: A },

    /// Discovery gave up on a destination
    DestinationUnreachable { destination: A },

    /// A neighbor moved between trust classes
    TrustStateChanged {
        neighbor: A,
        from: TrustState,
        to: TrustState,
        score: f64,
    },

    /// A control message left this node
    ControlSent { kind: ControlKind },
}

/// Reasons a data packet might be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DropReason {
    /// TTL exhausted
    TtlExpired,
    /// Intermediate node holds no valid route
    NoRoute,
    /// Route discovery exhausted its retries
    Unreachable,
    /// Discovery buffer overflowed
    BufferFull,
    /// Next hop link failed while forwarding
    LinkBroken,
    /// Frame could not be encoded or decoded
    Malformed,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TtlExpired => write!(f, "TTL expired"),
            Self::NoRoute => write!(f, "No route available"),
            Self::Unreachable => write!(f, "Destination unreachable"),
            Self::BufferFull => write!(f, "Discovery buffer full"),
            Self::LinkBroken => write!(f, "Link broken"),
            Self::Malformed => write!(f, "Malformed frame"),
        }
    }
}
