//! Duplicate request suppression
//!
//! A route request is identified network-wide by its originator and
//! broadcast id. Each node handles a given request once; copies arriving
//! over other paths are dropped.

use std::collections::HashMap;
use std::time::Duration;

use aodv_core::{NodeAddress, Timestamp};

/// Recently handled (originator, broadcast id) pairs
#[derive(Debug, Clone)]
pub struct SeenRequestCache<A: NodeAddress> {
    entries: HashMap<(A, u32), Timestamp>,
    lifetime: Duration,
}

impl<A: NodeAddress> SeenRequestCache<A> {
    /// Create a cache remembering requests for `lifetime`
    pub fn new(lifetime: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lifetime,
        }
    }

    /// Whether the request was handled and has not expired yet
    pub fn contains(&self, originator: &A, broadcast_id: u32, now: Timestamp) -> bool {
        self.entries
            .get(&(*originator, broadcast_id))
            .is_some_and(|expiry| *expiry > now)
    }

    /// Remember a request; returns false if it was already known
    pub fn insert(&mut self, originator: A, broadcast_id: u32, now: Timestamp) -> bool {
        if self.contains(&originator, broadcast_id, now) {
            return false;
        }
        self.entries
            .insert((originator, broadcast_id), now + self.lifetime);
        true
    }

    /// Drop expired pairs; returns how many were removed
    pub fn expire(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expiry| *expiry > now);
        before - self.entries.len()
    }

    /// Change how long new entries are remembered
    pub fn set_lifetime(&mut self, lifetime: Duration) {
        self.lifetime = lifetime;
    }

    /// Get the number of remembered requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
