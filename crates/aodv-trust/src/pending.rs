//! In-flight route discoveries
//!
//! While a discovery runs, data for its destination waits in a bounded
//! buffer. A full buffer evicts its oldest packet.

use std::collections::{BTreeMap, VecDeque};

use aodv_core::{DataPacket, NodeAddress, TimerHandle, Timestamp};

/// A discovery this node originated
#[derive(Debug, Clone)]
pub struct PendingRequest<A: NodeAddress> {
    /// Destination being searched
    pub destination: A,
    /// Own sequence number carried by the request
    pub originator_seq: u32,
    /// Broadcast id of the latest attempt
    pub broadcast_id: u32,
    /// Retries performed so far
    pub retries: u32,
    /// When the armed retry fires
    pub next_retry: Timestamp,
    /// Armed retry timer
    pub retry_timer: Option<TimerHandle>,
    /// Data waiting for the route
    pub buffered: VecDeque<DataPacket<A>>,
}

impl<A: NodeAddress> PendingRequest<A> {
    /// Start tracking a discovery
    pub fn new(destination: A, originator_seq: u32, broadcast_id: u32) -> Self {
        Self {
            destination,
            originator_seq,
            broadcast_id,
            retries: 0,
            next_retry: Timestamp::ZERO,
            retry_timer: None,
            buffered: VecDeque::new(),
        }
    }
}

/// All discoveries of one node, keyed by destination
#[derive(Debug, Clone)]
pub struct PendingRequests<A: NodeAddress> {
    requests: BTreeMap<A, PendingRequest<A>>,
    max_buffered: usize,
}

impl<A: NodeAddress> PendingRequests<A> {
    /// Create an empty set with a per-destination buffer bound
    pub fn new(max_buffered: usize) -> Self {
        Self {
            requests: BTreeMap::new(),
            max_buffered: max_buffered.max(1),
        }
    }

    /// Whether a discovery for `dest` is running
    pub fn contains(&self, dest: &A) -> bool {
        self.requests.contains_key(dest)
    }

    /// Discovery for `dest`
    pub fn get(&self, dest: &A) -> Option<&PendingRequest<A>> {
        self.requests.get(dest)
    }

    /// Mutable discovery for `dest`
    pub fn get_mut(&mut self, dest: &A) -> Option<&mut PendingRequest<A>> {
        self.requests.get_mut(dest)
    }

    /// Track a new discovery, replacing any previous one
    pub fn insert(&mut self, request: PendingRequest<A>) {
        self.requests.insert(request.destination, request);
    }

    /// Stop tracking a discovery
    pub fn remove(&mut self, dest: &A) -> Option<PendingRequest<A>> {
        self.requests.remove(dest)
    }

    /// Queue a packet behind a running discovery
    ///
    /// Returns the packet that had to make room, or the packet itself if no
    /// discovery is running for its destination.
    pub fn buffer(&mut self, packet: DataPacket<A>) -> Option<DataPacket<A>> {
        let Some(request) = self.requests.get_mut(&packet.destination) else {
            return Some(packet);
        };
        let evicted = if request.buffered.len() >= self.max_buffered {
            request.buffered.pop_front()
        } else {
            None
        };
        request.buffered.push_back(packet);
        evicted
    }

    /// Change the buffer bound for future packets
    pub fn set_max_buffered(&mut self, max_buffered: usize) {
        self.max_buffered = max_buffered.max(1);
    }

    /// Destinations being searched
    pub fn destinations(&self) -> Vec<A> {
        self.requests.keys().copied().collect()
    }

    /// Get the number of running discoveries
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if no discovery is running
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
