//! Mock node context for testing
//!
//! Records every frame, timer and event a router produces so tests can
//! drive a single routing instance by hand.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aodv_core::{Ipv4Address, MockContext};
//!
//! let local = Ipv4Address::new(10, 1, 1, 1);
//! let mut ctx: MockContext<Ipv4Address, MyTimer> =
//!     MockContext::new(local).with_neighbors([Ipv4Address::new(10, 1, 1, 2)]);
//!
//! router.start(&mut ctx);
//! let frames = ctx.take_sent();
//! ctx.advance(Duration::from_secs(1));
//! for (handle, timer) in ctx.due_timers() {
//!     router.on_timer(&mut ctx, handle, timer);
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::error::TransportError;
use crate::event::RoutingEvent;
use crate::identity::NodeAddress;
use crate::time::Timestamp;
use crate::traits::{NodeContext, SendTarget, TimerHandle};

/// A frame captured by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame<A: NodeAddress> {
    /// Requested destination
    pub target: SendTarget<A>,
    /// Encoded frame
    pub frame: Vec<u8>,
    /// Time of transmission
    pub at: Timestamp,
}

/// In-memory [`NodeContext`]
#[derive(Debug)]
pub struct MockContext<A: NodeAddress, T> {
    local: A,
    neighbors: BTreeSet<A>,
    broken_links: BTreeSet<A>,
    now: Timestamp,
    next_handle: u64,
    timers: BTreeMap<TimerHandle, (Timestamp, T)>,
    sent: Vec<SentFrame<A>>,
    events: Vec<RoutingEvent<A>>,
}

impl<A: NodeAddress, T> MockContext<A, T> {
    /// Create a context for `local` with no neighbors at time zero
    pub fn new(local: A) -> Self {
        Self {
            local,
            neighbors: BTreeSet::new(),
            broken_links: BTreeSet::new(),
            now: Timestamp::ZERO,
            next_handle: 1,
            timers: BTreeMap::new(),
            sent: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Builder-style neighbor set
    pub fn with_neighbors(mut self, neighbors: impl IntoIterator<Item = A>) -> Self {
        self.neighbors.extend(neighbors);
        self
    }

    /// Bring a node into radio range
    pub fn add_neighbor(&mut self, neighbor: A) {
        self.neighbors.insert(neighbor);
    }

    /// Take a node out of radio range
    pub fn remove_neighbor(&mut self, neighbor: &A) {
        self.neighbors.remove(neighbor);
    }

    /// Make unicasts to `neighbor` fail while keeping it listed as a neighbor
    pub fn break_link(&mut self, neighbor: A) {
        self.broken_links.insert(neighbor);
    }

    /// Undo [`break_link`](Self::break_link)
    pub fn restore_link(&mut self, neighbor: &A) {
        self.broken_links.remove(neighbor);
    }

    /// Move the clock forward
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Set the clock
    pub fn set_now(&mut self, now: Timestamp) {
        self.now = now;
    }

    /// Drain captured frames
    pub fn take_sent(&mut self) -> Vec<SentFrame<A>> {
        std::mem::take(&mut self.sent)
    }

    /// Captured frames, oldest first
    pub fn sent(&self) -> &[SentFrame<A>] {
        &self.sent
    }

    /// Drain captured events
    pub fn take_events(&mut self) -> Vec<RoutingEvent<A>> {
        std::mem::take(&mut self.events)
    }

    /// Captured events, oldest first
    pub fn events(&self) -> &[RoutingEvent<A>] {
        &self.events
    }

    /// Remove and return every timer due at the current time, in firing order
    pub fn due_timers(&mut self) -> Vec<(TimerHandle, T)> {
        let mut due: Vec<(Timestamp, TimerHandle)> = self
            .timers
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= self.now)
            .map(|(handle, (deadline, _))| (*deadline, *handle))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, handle)| self.timers.remove(&handle).map(|(_, t)| (handle, t)))
            .collect()
    }

    /// Whether `handle` is still armed
    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    /// Number of armed timers
    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    /// Armed timer payloads with their deadlines
    pub fn timers(&self) -> impl Iterator<Item = (TimerHandle, Timestamp, &T)> {
        self.timers.iter().map(|(h, (at, t))| (*h, *at, t))
    }
}

impl<A: NodeAddress, T> NodeContext<A, T> for MockContext<A, T> {
    fn local_address(&self) -> A {
        self.local
    }

    fn neighbors(&self) -> Vec<A> {
        self.neighbors.iter().copied().collect()
    }

    fn now(&self) -> Timestamp {
        self.now
    }

    fn send(&mut self, target: SendTarget<A>, frame: Vec<u8>) -> Result<(), TransportError> {
        if let SendTarget::Unicast(to) = target
            && (!self.neighbors.contains(&to) || self.broken_links.contains(&to))
        {
            return Err(TransportError::LinkUnavailable(to.short_id()));
        }
        self.sent.push(SentFrame {
            target,
            frame,
            at: self.now,
        });
        Ok(())
    }

    fn schedule_after(&mut self, delay: Duration, timer: T) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.timers.insert(handle, (self.now + delay, timer));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }

    fn emit(&mut self, event: RoutingEvent<A>) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ipv4Address;

    fn addr(n: u8) -> Ipv4Address {
        Ipv4Address::new(10, 1, 1, n)
    }

    #[test]
    fn test_unicast_requires_neighbor() {
        let mut ctx: MockContext<Ipv4Address, ()> =
            MockContext::new(addr(1)).with_neighbors([addr(2)]);

        assert!(ctx.send(SendTarget::Unicast(addr(2)), vec![1]).is_ok());
        assert!(ctx.send(SendTarget::Unicast(addr(3)), vec![2]).is_err());
        assert!(ctx.send(SendTarget::Broadcast, vec![3]).is_ok());

        ctx.break_link(addr(2));
        assert!(ctx.send(SendTarget::Unicast(addr(2)), vec![4]).is_err());
        assert_eq!(ctx.take_sent().len(), 2);
    }

    #[test]
    fn test_timers_fire_in_order() {
        let mut ctx: MockContext<Ipv4Address, &'static str> = MockContext::new(addr(1));
        let late = ctx.schedule_after(Duration::from_millis(300), "late");
        let early = ctx.schedule_after(Duration::from_millis(100), "early");
        let cancelled = ctx.schedule_after(Duration::from_millis(200), "cancelled");
        ctx.cancel(cancelled);

        ctx.advance(Duration::from_millis(150));
        assert_eq!(ctx.due_timers(), vec![(early, "early")]);

        ctx.advance(Duration::from_millis(500));
        assert_eq!(ctx.due_timers(), vec![(late, "late")]);
        assert_eq!(ctx.armed_timers(), 0);
    }
}
