//! Routing table
//!
//! One [`RouteEntry`] per known destination. Entries move between three
//! states:
//!
//! - `InSearch` while this node's own discovery for the destination runs
//! - `Valid` once a reply or request established a usable next hop
//! - `Invalid` after a link break, a route error or lifetime expiry; the
//!   entry keeps its sequence number until purged after the delete period
//!
//! The table never talks to the trust engine. Where a new route offer ties
//! with the existing entry, [`RoutingTable::judge_offer`] reports the tie
//! and the router decides.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use aodv_core::{NodeAddress, TimerHandle, Timestamp};

use crate::sequence::{seq_max, seq_newer};

/// State of a route entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// Usable for forwarding until its lifetime passes
    Valid,
    /// Known but unusable; purged after the delete period
    Invalid,
    /// Our own discovery is running
    InSearch,
}

/// Routing information for one destination
#[derive(Debug, Clone)]
pub struct RouteEntry<A: NodeAddress> {
    /// Destination of the route
    pub destination: A,
    /// Last known destination sequence number
    pub dest_seq: u32,
    /// Whether `dest_seq` is meaningful
    pub valid_seq: bool,
    /// Neighbor to forward through; always set while `Valid`
    pub next_hop: Option<A>,
    /// Hops to the destination; at least 1 while `Valid`
    pub hop_count: u8,
    /// Current state
    pub state: RouteState,
    /// Expiry instant while `Valid`, purge deadline while `Invalid`
    pub lifetime: Timestamp,
    /// Upstream neighbors that forward traffic for this destination to us
    pub precursors: BTreeSet<A>,
    /// Weakest neighbor score along the advertised path
    pub path_trust: f64,
    /// Created by this node's own discovery
    pub originated: bool,
    /// Armed expiry timer, if any
    pub expiry_timer: Option<TimerHandle>,
}

impl<A: NodeAddress> RouteEntry<A> {
    fn searching(destination: A) -> Self {
        Self {
            destination,
            dest_seq: 0,
            valid_seq: false,
            next_hop: None,
            hop_count: 0,
            state: RouteState::InSearch,
            lifetime: Timestamp::ZERO,
            precursors: BTreeSet::new(),
            path_trust: 0.0,
            originated: true,
            expiry_timer: None,
        }
    }

    /// Whether the entry can carry traffic at `now`
    pub fn is_usable(&self, now: Timestamp) -> bool {
        self.state == RouteState::Valid && self.lifetime > now && self.next_hop.is_some()
    }

    /// Known destination sequence number, if any
    pub fn known_seq(&self) -> Option<u32> {
        self.valid_seq.then_some(self.dest_seq)
    }
}

/// A candidate route learned from a request, reply or hello
#[derive(Debug, Clone, Copy)]
pub struct RouteOffer<A: NodeAddress> {
    /// Neighbor the information arrived from
    pub next_hop: A,
    /// Hops to the destination through that neighbor
    pub hop_count: u8,
    /// Advertised destination sequence number
    pub dest_seq: Option<u32>,
    /// Absolute expiry instant
    pub lifetime: Timestamp,
    /// Weakest neighbor score along the path
    pub path_trust: f64,
}

/// How an offer compares with the current entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferVerdict {
    /// Offer is better and should replace the entry
    Accept,
    /// Equally fresh and equally long; the caller breaks the tie
    Tie,
    /// Entry is at least as good
    Reject,
}

/// A route taken out of service
#[derive(Debug, Clone)]
pub struct InvalidatedRoute<A: NodeAddress> {
    /// Destination that became unreachable
    pub destination: A,
    /// Sequence number to advertise in route errors
    pub dest_seq: u32,
    /// Neighbors that must hear about it
    pub precursors: BTreeSet<A>,
    /// Whether this node discovered the route itself
    pub originated: bool,
    /// Expiry timer that should be cancelled
    pub expiry_timer: Option<TimerHandle>,
}

/// Per-destination routing table
#[derive(Debug, Clone)]
pub struct RoutingTable<A: NodeAddress> {
    routes: BTreeMap<A, RouteEntry<A>>,
}

impl<A: NodeAddress> RoutingTable<A> {
    /// Create an empty routing table
    pub fn new() -> Self {
        Self {
            routes: BTreeMap::new(),
        }
    }

    /// Entry for a destination in any state
    pub fn get(&self, dest: &A) -> Option<&RouteEntry<A>> {
        self.routes.get(dest)
    }

    /// Mutable entry for a destination
    pub fn get_mut(&mut self, dest: &A) -> Option<&mut RouteEntry<A>> {
        self.routes.get_mut(dest)
    }

    /// Usable route to a destination
    ///
    /// A `Valid` entry whose lifetime already passed is not returned even
    /// if its expiry timer has not fired yet.
    pub fn valid_route(&self, dest: &A, now: Timestamp) -> Option<&RouteEntry<A>> {
        self.routes.get(dest).filter(|e| e.is_usable(now))
    }

    /// Next hop of a usable route
    pub fn next_hop(&self, dest: &A, now: Timestamp) -> Option<A> {
        self.valid_route(dest, now).and_then(|e| e.next_hop)
    }

    /// Compare an offer with the current entry using the freshness rule
    ///
    /// An offer wins when there is no entry, the entry's sequence number is
    /// unknown, the offer is fresher, or it is equally fresh and shorter.
    /// Equal freshness and length is a tie. An unusable entry takes any
    /// offer at least as fresh as its stored number, whatever the length;
    /// offers older than a known number are always rejected.
    pub fn judge_offer(&self, dest: &A, offer: &RouteOffer<A>, now: Timestamp) -> OfferVerdict {
        let Some(entry) = self.routes.get(dest) else {
            return OfferVerdict::Accept;
        };
        if !entry.is_usable(now) {
            let stale = entry.valid_seq
                && offer
                    .dest_seq
                    .is_some_and(|offered| seq_newer(entry.dest_seq, offered));
            return if stale {
                OfferVerdict::Reject
            } else {
                OfferVerdict::Accept
            };
        }
        let Some(offered) = offer.dest_seq else {
            // Unsequenced offers refresh unsequenced routes or shorten the path
            let same_hop = entry.next_hop == Some(offer.next_hop) && !entry.valid_seq;
            return if same_hop || offer.hop_count < entry.hop_count {
                OfferVerdict::Accept
            } else {
                OfferVerdict::Reject
            };
        };
        if !entry.valid_seq || seq_newer(offered, entry.dest_seq) {
            return OfferVerdict::Accept;
        }
        if offered != entry.dest_seq {
            return OfferVerdict::Reject;
        }
        match offer.hop_count.cmp(&entry.hop_count) {
            std::cmp::Ordering::Less => OfferVerdict::Accept,
            std::cmp::Ordering::Equal if entry.next_hop == Some(offer.next_hop) => {
                OfferVerdict::Accept
            }
            std::cmp::Ordering::Equal => OfferVerdict::Tie,
            std::cmp::Ordering::Greater => OfferVerdict::Reject,
        }
    }

    /// Install an offer as the `Valid` route
    ///
    /// Keeps precursors and the originated flag of an existing entry. The
    /// previous expiry timer handle is returned so the caller can cancel it.
    pub fn install(&mut self, dest: A, offer: RouteOffer<A>) -> Option<TimerHandle> {
        let entry = self
            .routes
            .entry(dest)
            .or_insert_with(|| RouteEntry {
                originated: false,
                ..RouteEntry::searching(dest)
            });

        match offer.dest_seq {
            Some(seq) => {
                entry.dest_seq = if entry.valid_seq {
                    seq_max(entry.dest_seq, seq)
                } else {
                    seq
                };
                entry.valid_seq = true;
            }
            None => entry.valid_seq = false,
        }
        entry.next_hop = Some(offer.next_hop);
        entry.hop_count = offer.hop_count.max(1);
        entry.state = RouteState::Valid;
        entry.lifetime = offer.lifetime;
        entry.path_trust = offer.path_trust;
        entry.expiry_timer.take()
    }

    /// Extend a `Valid` route's lifetime to at least `until`
    ///
    /// Returns true when the lifetime actually moved.
    pub fn refresh(&mut self, dest: &A, until: Timestamp, now: Timestamp) -> bool {
        match self.routes.get_mut(dest) {
            Some(entry) if entry.is_usable(now) && entry.lifetime < until => {
                entry.lifetime = until;
                true
            }
            _ => false,
        }
    }

    /// Mark a destination as being searched by this node
    ///
    /// Keeps the known sequence number of an existing entry. A usable
    /// route is left untouched and `false` returned.
    pub fn mark_in_search(&mut self, dest: A, now: Timestamp) -> bool {
        let entry = self
            .routes
            .entry(dest)
            .or_insert_with(|| RouteEntry::searching(dest));
        if entry.is_usable(now) {
            return false;
        }
        entry.state = RouteState::InSearch;
        entry.originated = true;
        true
    }

    /// Record a precursor for a destination
    pub fn add_precursor(&mut self, dest: &A, precursor: A) {
        if let Some(entry) = self.routes.get_mut(dest) {
            entry.precursors.insert(precursor);
        }
    }

    /// Invalidate a route, bumping its sequence number
    ///
    /// With `reported_seq` (from a route error) the stored number becomes the
    /// fresher of the bumped and the reported one. Only `Valid` entries are
    /// affected.
    pub fn invalidate(
        &mut self,
        dest: &A,
        reported_seq: Option<u32>,
        now: Timestamp,
        delete_period: Duration,
    ) -> Option<InvalidatedRoute<A>> {
        let entry = self.routes.get_mut(dest)?;
        if entry.state != RouteState::Valid {
            return None;
        }
        let bumped = entry.dest_seq.wrapping_add(1);
        entry.dest_seq = match reported_seq {
            Some(seq) => seq_max(bumped, seq),
            None => bumped,
        };
        entry.state = RouteState::Invalid;
        entry.lifetime = now + delete_period;
        Some(InvalidatedRoute {
            destination: entry.destination,
            dest_seq: entry.dest_seq,
            precursors: std::mem::take(&mut entry.precursors),
            originated: entry.originated,
            expiry_timer: entry.expiry_timer.take(),
        })
    }

    /// Invalidate every `Valid` route through `next_hop`
    ///
    /// The neighbor is also dropped from all precursor sets.
    pub fn invalidate_via(
        &mut self,
        next_hop: &A,
        now: Timestamp,
        delete_period: Duration,
    ) -> Vec<InvalidatedRoute<A>> {
        let affected: Vec<A> = self
            .routes
            .values()
            .filter(|e| e.state == RouteState::Valid && e.next_hop.as_ref() == Some(next_hop))
            .map(|e| e.destination)
            .collect();

        for entry in self.routes.values_mut() {
            entry.precursors.remove(next_hop);
        }

        affected
            .iter()
            .filter_map(|dest| self.invalidate(dest, None, now, delete_period))
            .collect()
    }

    /// Demote a `Valid` route whose lifetime passed; no sequence bump
    pub fn expire(&mut self, dest: &A, now: Timestamp, delete_period: Duration) -> bool {
        match self.routes.get_mut(dest) {
            Some(entry) if entry.state == RouteState::Valid && entry.lifetime <= now => {
                entry.state = RouteState::Invalid;
                entry.lifetime = now + delete_period;
                entry.expiry_timer = None;
                true
            }
            _ => false,
        }
    }

    /// Give up a search: `InSearch` becomes `Invalid`
    pub fn abandon_search(&mut self, dest: &A, now: Timestamp, delete_period: Duration) {
        if let Some(entry) = self.routes.get_mut(dest)
            && entry.state == RouteState::InSearch
        {
            entry.state = RouteState::Invalid;
            entry.lifetime = now + delete_period;
        }
    }

    /// Remove `Invalid` entries past their purge deadline
    pub fn purge(&mut self, now: Timestamp) -> Vec<A> {
        let purged: Vec<A> = self
            .routes
            .values()
            .filter(|e| e.state == RouteState::Invalid && e.lifetime <= now)
            .map(|e| e.destination)
            .collect();
        for dest in &purged {
            self.routes.remove(dest);
        }
        purged
    }

    /// Destinations of `Valid` routes whose lifetime passed
    pub fn lapsed(&self, now: Timestamp) -> Vec<A> {
        self.routes
            .values()
            .filter(|e| e.state == RouteState::Valid && e.lifetime <= now)
            .map(|e| e.destination)
            .collect()
    }

    /// Distinct next hops of `Valid` routes
    pub fn active_next_hops(&self) -> BTreeSet<A> {
        self.routes
            .values()
            .filter(|e| e.state == RouteState::Valid)
            .filter_map(|e| e.next_hop)
            .collect()
    }

    /// Whether any route is currently `Valid`
    pub fn has_active_routes(&self, now: Timestamp) -> bool {
        self.routes.values().any(|e| e.is_usable(now))
    }

    /// Iterate over all entries in destination order
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry<A>> {
        self.routes.values()
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Get all destinations with entries
    pub fn destinations(&self) -> Vec<A> {
        self.routes.keys().copied().collect()
    }
}

impl<A: NodeAddress> Default for RoutingTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aodv_core::Ipv4Address;

    fn addr(n: u8) -> Ipv4Address {
        Ipv4Address::new(10, 1, 1, n)
    }

    fn offer(next_hop: u8, hop_count: u8, seq: Option<u32>, until_ms: u64) -> RouteOffer<Ipv4Address> {
        RouteOffer {
            next_hop: addr(next_hop),
            hop_count,
            dest_seq: seq,
            lifetime: Timestamp::from_millis(until_ms),
            path_trust: 1.0,
        }
    }

    #[test]
    fn test_install_and_lookup() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        assert_eq!(table.judge_offer(&addr(9), &offer(2, 3, Some(4), 3000), now), OfferVerdict::Accept);

        table.install(addr(9), offer(2, 3, Some(4), 3000));
        let entry = table.valid_route(&addr(9), now).unwrap();
        assert_eq!(entry.next_hop, Some(addr(2)));
        assert_eq!(entry.hop_count, 3);
        assert_eq!(entry.known_seq(), Some(4));
        assert!(!entry.originated);
    }

    #[test]
    fn test_lapsed_route_is_not_usable() {
        let mut table = RoutingTable::new();
        table.install(addr(9), offer(2, 1, Some(1), 1000));

        assert!(table.valid_route(&addr(9), Timestamp::from_millis(999)).is_some());
        assert!(table.valid_route(&addr(9), Timestamp::from_millis(1000)).is_none());
        assert_eq!(table.lapsed(Timestamp::from_millis(1000)), vec![addr(9)]);
    }

    #[test]
    fn test_freshness_rule() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        table.install(addr(9), offer(2, 3, Some(10), 5000));

        // Fresher wins regardless of length
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 7, Some(11), 5000), now), OfferVerdict::Accept);
        // Stale loses
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 1, Some(9), 5000), now), OfferVerdict::Reject);
        // Same freshness: shorter wins, longer loses, equal ties
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 2, Some(10), 5000), now), OfferVerdict::Accept);
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 4, Some(10), 5000), now), OfferVerdict::Reject);
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 3, Some(10), 5000), now), OfferVerdict::Tie);
        // Same neighbor re-advertising is a refresh, not a tie
        assert_eq!(table.judge_offer(&addr(9), &offer(2, 3, Some(10), 5000), now), OfferVerdict::Accept);
    }

    #[test]
    fn test_unusable_entry_rejects_older_offers() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        table.install(addr(9), offer(2, 2, Some(5), 5000));
        table.invalidate(&addr(9), Some(8), now, Duration::from_secs(15));
        table.mark_in_search(addr(9), now);

        assert_eq!(table.judge_offer(&addr(9), &offer(3, 1, Some(5), 5000), now), OfferVerdict::Reject);
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 1, Some(7), 5000), now), OfferVerdict::Reject);
        // Equal freshness is enough once the entry is unusable, even if longer
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 6, Some(8), 5000), now), OfferVerdict::Accept);
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 6, Some(9), 5000), now), OfferVerdict::Accept);
        // Unsequenced one-hop routes are still learned
        assert_eq!(table.judge_offer(&addr(9), &offer(9, 1, None, 5000), now), OfferVerdict::Accept);
    }

    #[test]
    fn test_lapsed_entry_rejects_older_offers() {
        let mut table = RoutingTable::new();
        table.install(addr(9), offer(2, 2, Some(5), 1000));
        let later = Timestamp::from_millis(2000);

        assert_eq!(table.judge_offer(&addr(9), &offer(3, 1, Some(4), 5000), later), OfferVerdict::Reject);
        assert_eq!(table.judge_offer(&addr(9), &offer(3, 4, Some(5), 5000), later), OfferVerdict::Accept);
    }

    #[test]
    fn test_invalidate_via_bumps_seq_and_collects_precursors() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        table.install(addr(9), offer(2, 2, Some(10), 5000));
        table.install(addr(8), offer(2, 3, Some(3), 5000));
        table.install(addr(7), offer(4, 1, Some(1), 5000));
        table.add_precursor(&addr(9), addr(5));
        table.add_precursor(&addr(7), addr(2));

        let mut broken = table.invalidate_via(&addr(2), now, Duration::from_secs(15));
        broken.sort_by_key(|r| r.destination);

        assert_eq!(broken.len(), 2);
        assert_eq!(broken[0].destination, addr(8));
        assert_eq!(broken[0].dest_seq, 4);
        assert_eq!(broken[1].destination, addr(9));
        assert_eq!(broken[1].dest_seq, 11);
        assert!(broken[1].precursors.contains(&addr(5)));

        assert!(table.valid_route(&addr(9), now).is_none());
        assert_eq!(table.get(&addr(9)).unwrap().state, RouteState::Invalid);
        // Broken neighbor no longer a precursor anywhere
        assert!(table.get(&addr(7)).unwrap().precursors.is_empty());
        assert!(table.valid_route(&addr(7), now).is_some());
    }

    #[test]
    fn test_invalidate_with_reported_seq() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        table.install(addr(9), offer(2, 2, Some(10), 5000));

        let route = table
            .invalidate(&addr(9), Some(20), now, Duration::from_secs(15))
            .unwrap();
        assert_eq!(route.dest_seq, 20);
        // Already invalid: nothing to do
        assert!(table.invalidate(&addr(9), None, now, Duration::from_secs(15)).is_none());
    }

    #[test]
    fn test_in_search_keeps_known_seq_and_purge() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        table.install(addr(9), offer(2, 2, Some(10), 1000));
        table.invalidate(&addr(9), None, now, Duration::from_secs(5));

        assert!(table.mark_in_search(addr(9), now));
        let entry = table.get(&addr(9)).unwrap();
        assert_eq!(entry.state, RouteState::InSearch);
        assert_eq!(entry.known_seq(), Some(11));
        assert!(entry.originated);

        // Searching entries are never purged
        assert!(table.purge(Timestamp::from_secs(60)).is_empty());

        table.abandon_search(&addr(9), now, Duration::from_secs(5));
        assert!(table.purge(Timestamp::from_secs(4)).is_empty());
        assert_eq!(table.purge(Timestamp::from_secs(5)), vec![addr(9)]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_refresh_only_extends_valid_routes() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        table.install(addr(9), offer(2, 2, Some(1), 1000));

        assert!(table.refresh(&addr(9), Timestamp::from_millis(3000), now));
        assert!(!table.refresh(&addr(9), Timestamp::from_millis(2000), now));
        assert_eq!(table.get(&addr(9)).unwrap().lifetime, Timestamp::from_millis(3000));
        assert!(!table.refresh(&addr(8), Timestamp::from_millis(3000), now));
    }

    #[test]
    fn test_mark_in_search_leaves_usable_route() {
        let mut table = RoutingTable::new();
        let now = Timestamp::ZERO;
        table.install(addr(9), offer(2, 2, Some(1), 1000));
        assert!(!table.mark_in_search(addr(9), now));
        assert_eq!(table.get(&addr(9)).unwrap().state, RouteState::Valid);
    }
}
