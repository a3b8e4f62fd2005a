//! Application data packets carried over discovered routes

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::identity::NodeAddress;

/// Unique identifier for a data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub struct PacketId<A: NodeAddress> {
    /// Node that originated the packet
    pub source: A,
    /// Per-source sequence number
    pub sequence: u64,
}

impl<A: NodeAddress> PacketId<A> {
    /// Create a new packet ID
    pub fn new(source: A, sequence: u64) -> Self {
        Self { source, sequence }
    }
}

impl<A: NodeAddress> Display for PacketId<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.source.short_id(), self.sequence)
    }
}

/// A data packet routed hop by hop toward its destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub struct DataPacket<A: NodeAddress> {
    /// Packet identifier
    pub id: PacketId<A>,
    /// Final destination
    pub destination: A,
    /// Remaining hops before the packet is discarded
    pub ttl: u8,
    /// Hops travelled so far
    pub hops: u8,
    /// Opaque application payload
    pub payload: Vec<u8>,
}

impl<A: NodeAddress> DataPacket<A> {
    /// Create a new packet at its source
    pub fn new(id: PacketId<A>, destination: A, ttl: u8, payload: Vec<u8>) -> Self {
        Self {
            id,
            destination,
            ttl,
            hops: 0,
            payload,
        }
    }

    /// Originating node
    pub fn source(&self) -> A {
        self.id.source
    }

    /// Whether the packet may take another hop
    pub fn can_forward(&self) -> bool {
        self.ttl > 0
    }

    /// Account for one more hop; returns false when the TTL is exhausted
    pub fn take_hop(&mut self) -> bool {
        if self.ttl == 0 {
            return false;
        }
        self.ttl -= 1;
        self.hops = self.hops.saturating_add(1);
        true
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
