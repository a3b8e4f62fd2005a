//! Collaborator traits
//!
//! A router owns its tables but nothing else: radio access, timers, the
//! clock and neighbor discovery all belong to the environment and are
//! reached through [`NodeContext`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::event::RoutingEvent;
use crate::identity::NodeAddress;
use crate::time::Timestamp;

/// Where a frame should go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "A: NodeAddress")]
pub enum SendTarget<A: NodeAddress> {
    /// A single neighbor
    Unicast(A),
    /// Every node in radio range
    Broadcast,
}

/// Handle of an armed timer
///
/// Handles are unique per environment and never reused, so a router can
/// compare a firing handle against the one it stored to ignore timers it
/// has already superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Environment of a single routing instance
///
/// `T` is the router's own timer payload; the environment hands it back
/// unchanged when the timer fires.
pub trait NodeContext<A: NodeAddress, T> {
    /// Address of the node this router runs on
    fn local_address(&self) -> A;

    /// Nodes currently in direct radio range
    fn neighbors(&self) -> Vec<A>;

    /// Current virtual time
    fn now(&self) -> Timestamp;

    /// Transmit a frame
    ///
    /// A unicast to a node that is no longer reachable fails synchronously;
    /// routers treat that failure as a link break.
    fn send(&mut self, target: SendTarget<A>, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Arm a timer firing `delay` from now
    fn schedule_after(&mut self, delay: Duration, timer: T) -> TimerHandle;

    /// Disarm a timer; cancelling an already fired handle is a no-op
    fn cancel(&mut self, handle: TimerHandle);

    /// Report an observable effect
    fn emit(&mut self, event: RoutingEvent<A>);
}
