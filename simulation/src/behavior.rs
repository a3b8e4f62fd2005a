//! Attacker behaviors
//!
//! A malicious node runs an ordinary router for everything it does not
//! tamper with; the simulator consults its [`NodeBehavior`] before handing
//! it a received frame.

use std::collections::BTreeSet;

use aodv_core::Ipv4Address;
use aodv_trust::{RouteReply, RouteRequest, WireMessage};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Sequence number advantage a blackhole claims over the request
pub const FORGED_SEQ_BOOST: u32 = 10;

/// Lifetime a blackhole advertises in its forged replies, in milliseconds
pub const FORGED_LIFETIME_MS: u32 = 6000;

/// How a node treats traffic it should relay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeBehavior {
    Honest,
    /// Claims a fresh one-hop route to every destination, drops all transit data
    Blackhole,
    /// Drops transit data with the given probability
    Grayhole { drop_probability: f64 },
}

impl NodeBehavior {
    pub fn is_malicious(&self) -> bool {
        !matches!(self, Self::Honest)
    }
}

impl std::fmt::Display for NodeBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Honest => write!(f, "honest"),
            Self::Blackhole => write!(f, "blackhole"),
            Self::Grayhole { drop_probability } => {
                write!(f, "grayhole({:.0}%)", drop_probability * 100.0)
            }
        }
    }
}

/// What the simulator should do with a received frame
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Hand it to the router
    Deliver,
    /// Swallow transit data
    Drop,
    /// Swallow the request and send this reply to the neighbor it came from
    Forge(RouteReply<Ipv4Address>),
    /// Swallow a request already answered
    Ignore,
}

/// Per-node attacker state
#[derive(Debug, Clone)]
pub struct Attacker {
    behavior: NodeBehavior,
    address: Ipv4Address,
    answered: BTreeSet<(Ipv4Address, u32)>,
}

impl Attacker {
    pub fn new(address: Ipv4Address, behavior: NodeBehavior) -> Self {
        Self {
            behavior,
            address,
            answered: BTreeSet::new(),
        }
    }

    pub fn behavior(&self) -> NodeBehavior {
        self.behavior
    }

    /// Decide the fate of a frame received by this node
    pub fn inspect(&mut self, message: &WireMessage<Ipv4Address>, rng: &mut impl Rng) -> Verdict {
        match (self.behavior, message) {
            (NodeBehavior::Honest, _) => Verdict::Deliver,
            (NodeBehavior::Blackhole, WireMessage::Request(req)) => self.forge(req),
            (NodeBehavior::Blackhole, WireMessage::Data(packet))
                if packet.destination != self.address =>
            {
                Verdict::Drop
            }
            (NodeBehavior::Grayhole { drop_probability }, WireMessage::Data(packet))
                if packet.destination != self.address
                    && rng.random_bool(drop_probability.clamp(0.0, 1.0)) =>
            {
                Verdict::Drop
            }
            _ => Verdict::Deliver,
        }
    }

    fn forge(&mut self, req: &RouteRequest<Ipv4Address>) -> Verdict {
        if req.destination == self.address || req.originator == self.address {
            return Verdict::Deliver;
        }
        if !self.answered.insert((req.originator, req.broadcast_id)) {
            return Verdict::Ignore;
        }
        Verdict::Forge(RouteReply {
            originator: req.originator,
            destination: req.destination,
            dest_seq: req
                .dest_seq
                .unwrap_or(0)
                .wrapping_add(FORGED_SEQ_BOOST),
            hop_count: 1,
            lifetime_ms: FORGED_LIFETIME_MS,
            path_trust: 1.0,
        })
    }
}
