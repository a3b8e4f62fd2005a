//! Forwarding watchdog
//!
//! When this node hands a data packet to a next hop that is not the
//! packet's destination, it expects to overhear that neighbor passing the
//! packet on. Each expectation is a [`ForwardWatch`]:
//!
//! 1. `watch` is called after a successful unicast
//! 2. `confirm` is called when the forward is overheard (POSITIVE)
//! 3. `expire` is called when the deadline timer fires first (NEGATIVE)
//! 4. `release` drops all watches on a neighbor whose link broke, without
//!    judging it

use std::collections::HashMap;
use std::time::Duration;

use aodv_core::{NodeAddress, PacketId, TimerHandle, Timestamp};
use tracing::trace;

/// One awaited forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardWatch<A: NodeAddress> {
    /// Packet handed over
    pub packet_id: PacketId<A>,
    /// Neighbor expected to forward it
    pub neighbor: A,
    /// Latest acceptable forward
    pub deadline: Timestamp,
    /// Armed deadline timer
    pub timer: Option<TimerHandle>,
}

/// Awaited forwards of one node
#[derive(Debug, Clone)]
pub struct ForwardWatchdog<A: NodeAddress> {
    watches: HashMap<(PacketId<A>, A), ForwardWatch<A>>,
    timeout: Duration,
}

impl<A: NodeAddress> ForwardWatchdog<A> {
    /// Create a watchdog giving neighbors `timeout` to forward
    pub fn new(timeout: Duration) -> Self {
        Self {
            watches: HashMap::new(),
            timeout,
        }
    }

    /// Confirmation window
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the confirmation window for future watches
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Start awaiting a forward; false if it is already awaited
    pub fn watch(&mut self, packet_id: PacketId<A>, neighbor: A, now: Timestamp) -> bool {
        let key = (packet_id, neighbor);
        if self.watches.contains_key(&key) {
            return false;
        }
        trace!(packet_id = %packet_id, neighbor = %neighbor, "awaiting forward");
        self.watches.insert(
            key,
            ForwardWatch {
                packet_id,
                neighbor,
                deadline: now + self.timeout,
                timer: None,
            },
        );
        true
    }

    /// Attach the deadline timer to a watch
    pub fn arm(&mut self, packet_id: PacketId<A>, neighbor: A, timer: TimerHandle) {
        if let Some(watch) = self.watches.get_mut(&(packet_id, neighbor)) {
            watch.timer = Some(timer);
        }
    }

    /// Forward overheard; returns the satisfied watch
    pub fn confirm(&mut self, packet_id: PacketId<A>, neighbor: A) -> Option<ForwardWatch<A>> {
        self.watches.remove(&(packet_id, neighbor))
    }

    /// Deadline timer fired; returns the failed watch
    ///
    /// Ignored unless `timer` is the handle armed for this watch.
    pub fn expire(
        &mut self,
        packet_id: PacketId<A>,
        neighbor: A,
        timer: TimerHandle,
    ) -> Option<ForwardWatch<A>> {
        let key = (packet_id, neighbor);
        match self.watches.get(&key) {
            Some(watch) if watch.timer == Some(timer) => self.watches.remove(&key),
            _ => None,
        }
    }

    /// Drop every watch on `neighbor`
    pub fn release(&mut self, neighbor: &A) -> Vec<ForwardWatch<A>> {
        let keys: Vec<(PacketId<A>, A)> = self
            .watches
            .keys()
            .filter(|(_, n)| n == neighbor)
            .copied()
            .collect();
        keys.iter()
            .filter_map(|key| self.watches.remove(key))
            .collect()
    }

    /// Whether a forward is awaited
    pub fn is_watching(&self, packet_id: &PacketId<A>, neighbor: &A) -> bool {
        self.watches.contains_key(&(*packet_id, *neighbor))
    }

    /// Get the number of awaited forwards
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Check if nothing is awaited
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aodv_core::Ipv4Address;

    fn addr(n: u8) -> Ipv4Address {
        Ipv4Address::new(10, 1, 1, n)
    }

    fn id(seq: u64) -> PacketId<Ipv4Address> {
        PacketId::new(addr(1), seq)
    }

    #[test]
    fn test_confirm_clears_watch() {
        let mut dog = ForwardWatchdog::new(Duration::from_millis(500));
        assert!(dog.watch(id(1), addr(2), Timestamp::ZERO));
        assert!(!dog.watch(id(1), addr(2), Timestamp::ZERO));
        dog.arm(id(1), addr(2), TimerHandle(7));

        let watch = dog.confirm(id(1), addr(2)).unwrap();
        assert_eq!(watch.deadline, Timestamp::from_millis(500));
        assert!(dog.expire(id(1), addr(2), TimerHandle(7)).is_none());
        assert!(dog.is_empty());
    }

    #[test]
    fn test_expire_checks_handle() {
        let mut dog = ForwardWatchdog::new(Duration::from_millis(500));
        dog.watch(id(1), addr(2), Timestamp::ZERO);
        dog.arm(id(1), addr(2), TimerHandle(7));

        assert!(dog.expire(id(1), addr(2), TimerHandle(6)).is_none());
        assert!(dog.expire(id(1), addr(2), TimerHandle(7)).is_some());
    }

    #[test]
    fn test_release_neighbor() {
        let mut dog = ForwardWatchdog::new(Duration::from_millis(500));
        dog.watch(id(1), addr(2), Timestamp::ZERO);
        dog.watch(id(2), addr(2), Timestamp::ZERO);
        dog.watch(id(3), addr(3), Timestamp::ZERO);

        assert_eq!(dog.release(&addr(2)).len(), 2);
        assert!(dog.is_watching(&id(3), &addr(3)));
        assert_eq!(dog.len(), 1);
    }
}
