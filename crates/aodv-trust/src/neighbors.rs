//! Neighbor liveness
//!
//! Remembers when each neighbor was last heard, and the last sequence
//! number it used for itself. A neighbor silent for longer than the allowed
//! hello loss counts as a broken link; a neighbor whose own sequence number
//! goes backwards is replaying old state.

use std::collections::BTreeMap;
use std::time::Duration;

use aodv_core::{NodeAddress, Timestamp};

use crate::sequence::seq_newer;

/// How a neighbor's own sequence number moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceChange {
    /// No earlier number known
    First,
    /// Same as last time
    Unchanged,
    /// Fresher than last time
    Advanced,
    /// Older than last time
    Regressed,
}

/// Last-heard instants and own sequence numbers of direct neighbors
#[derive(Debug, Clone)]
pub struct NeighborLiveness<A: NodeAddress> {
    last_heard: BTreeMap<A, Timestamp>,
    last_seq: BTreeMap<A, u32>,
}

impl<A: NodeAddress> NeighborLiveness<A> {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            last_heard: BTreeMap::new(),
            last_seq: BTreeMap::new(),
        }
    }

    /// Record a sequence number a neighbor used for itself
    ///
    /// The stored number only moves forward; it survives link breaks so a
    /// returning neighbor cannot roll its own state back.
    pub fn record_seq(&mut self, neighbor: A, seq: u32) -> SequenceChange {
        match self.last_seq.get(&neighbor).copied() {
            None => {
                self.last_seq.insert(neighbor, seq);
                SequenceChange::First
            }
            Some(last) if last == seq => SequenceChange::Unchanged,
            Some(last) if seq_newer(seq, last) => {
                self.last_seq.insert(neighbor, seq);
                SequenceChange::Advanced
            }
            Some(_) => SequenceChange::Regressed,
        }
    }

    /// Note traffic from a neighbor; returns true on first contact
    pub fn heard(&mut self, neighbor: A, now: Timestamp) -> bool {
        self.last_heard.insert(neighbor, now).is_none()
    }

    /// When a neighbor was last heard
    pub fn last_heard(&self, neighbor: &A) -> Option<Timestamp> {
        self.last_heard.get(neighbor).copied()
    }

    /// Remove and return neighbors silent for longer than `timeout`
    pub fn take_silent(&mut self, now: Timestamp, timeout: Duration) -> Vec<A> {
        let silent: Vec<A> = self
            .last_heard
            .iter()
            .filter(|(_, at)| now.saturating_since(**at) > timeout)
            .map(|(n, _)| *n)
            .collect();
        for neighbor in &silent {
            self.last_heard.remove(neighbor);
        }
        silent
    }

    /// Forget a neighbor
    pub fn forget(&mut self, neighbor: &A) {
        self.last_heard.remove(neighbor);
    }

    /// Get the number of tracked neighbors
    pub fn len(&self) -> usize {
        self.last_heard.len()
    }

    /// Check if no neighbor is tracked
    pub fn is_empty(&self) -> bool {
        self.last_heard.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aodv_core::Ipv4Address;

    fn addr(n: u8) -> Ipv4Address {
        Ipv4Address::new(10, 1, 1, n)
    }

    #[test]
    fn test_silent_neighbors_are_taken() {
        let mut live = NeighborLiveness::new();
        assert!(live.heard(addr(2), Timestamp::ZERO));
        assert!(live.heard(addr(3), Timestamp::from_secs(1)));
        assert!(!live.heard(addr(2), Timestamp::from_millis(500)));

        let timeout = Duration::from_secs(2);
        assert!(live.take_silent(Timestamp::from_millis(2500), timeout).is_empty());
        assert_eq!(live.take_silent(Timestamp::from_millis(2501), timeout), vec![addr(2)]);
        assert_eq!(live.len(), 1);
        assert_eq!(live.last_heard(&addr(3)), Some(Timestamp::from_secs(1)));
    }

    #[test]
    fn test_sequence_progression() {
        let mut live = NeighborLiveness::new();
        assert_eq!(live.record_seq(addr(2), 5), SequenceChange::First);
        assert_eq!(live.record_seq(addr(2), 5), SequenceChange::Unchanged);
        assert_eq!(live.record_seq(addr(2), 6), SequenceChange::Advanced);
        assert_eq!(live.record_seq(addr(2), 3), SequenceChange::Regressed);
        // Regression does not roll the stored number back
        assert_eq!(live.record_seq(addr(2), 6), SequenceChange::Unchanged);

        // Survives a silent period
        live.heard(addr(2), Timestamp::ZERO);
        live.take_silent(Timestamp::from_secs(10), Duration::from_secs(2));
        assert_eq!(live.record_seq(addr(2), 4), SequenceChange::Regressed);
    }
}
