//! Sequence number and broadcast id registry
//!
//! Both counters are 32-bit, increase by one per use and wrap on overflow.
//! Freshness comparisons use serial-number arithmetic so that a counter
//! that just wrapped still compares as newer than its predecessor.

/// Whether `a` is strictly fresher than `b`, wrap-aware
#[inline]
pub fn seq_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// Whether `a` is at least as fresh as `b`, wrap-aware
#[inline]
pub fn seq_at_least(a: u32, b: u32) -> bool {
    a == b || seq_newer(a, b)
}

/// The fresher of two sequence numbers
#[inline]
pub fn seq_max(a: u32, b: u32) -> u32 {
    if seq_newer(b, a) { b } else { a }
}

/// How far `a` runs ahead of `b` (zero if it is not ahead)
#[inline]
pub fn seq_distance(a: u32, b: u32) -> u32 {
    if seq_newer(a, b) { a.wrapping_sub(b) } else { 0 }
}

/// Own sequence number and broadcast id counters of one node
#[derive(Debug, Clone, Default)]
pub struct SequenceRegistry {
    own_seq: u32,
    broadcast_id: u32,
}

impl SequenceRegistry {
    /// Create a registry with both counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current own sequence number
    pub fn own_seq(&self) -> u32 {
        self.own_seq
    }

    /// Increment and return the own sequence number
    pub fn next_seq(&mut self) -> u32 {
        self.own_seq = self.own_seq.wrapping_add(1);
        self.own_seq
    }

    /// Raise the own sequence number to at least `seq`
    pub fn raise_to(&mut self, seq: u32) -> u32 {
        self.own_seq = seq_max(self.own_seq, seq);
        self.own_seq
    }

    /// Increment and return the broadcast id
    pub fn next_broadcast_id(&mut self) -> u32 {
        self.broadcast_id = self.broadcast_id.wrapping_add(1);
        self.broadcast_id
    }

    /// Last broadcast id handed out
    pub fn broadcast_id(&self) -> u32 {
        self.broadcast_id
    }
}
