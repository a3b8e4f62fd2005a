//! Route maintenance
//!
//! Keeps the routing table honest once routes exist:
//!
//! - link breaks (send failure, silent or vanished neighbor, blacklisted
//!   neighbor) invalidate every route through the neighbor and notify the
//!   precursors with route errors
//! - route errors from a next hop invalidate the listed routes and travel on
//!   upstream
//! - hellos keep one-hop routes and neighbor liveness fresh
//! - the periodic sweep purges dead state and applies trust decay

use std::collections::{BTreeMap, BTreeSet};

use aodv_core::{NodeAddress, RoutingEvent, SendTarget, TimerHandle};
use tracing::{debug, trace, warn};

use crate::messages::{Hello, RouteError, WireMessage};
use crate::router::{AodvTrustRouter, RouterContext, RouterTimer};
use crate::table::{InvalidatedRoute, RouteOffer, RouteState};
use crate::trust::ObservationCause;

impl<A: NodeAddress> AodvTrustRouter<A> {
    /// The link to `neighbor` is gone
    ///
    /// Routes through it are invalidated, awaited forwards are released
    /// without judging the neighbor, and precursors get route errors.
    pub(crate) fn handle_link_break(&mut self, ctx: &mut RouterContext<'_, A>, neighbor: A) {
        let now = ctx.now();
        for watch in self.watchdog.release(&neighbor) {
            if let Some(timer) = watch.timer {
                ctx.cancel(timer);
            }
        }
        self.liveness.forget(&neighbor);

        let broken = self
            .routes
            .invalidate_via(&neighbor, now, self.config.delete_period);
        if broken.is_empty() {
            return;
        }
        debug!(node = %self.address, neighbor = %neighbor, routes = broken.len(), "link break");
        self.report_invalidated(ctx, broken);
    }

    /// Announce invalidated routes and repair the ones we discovered
    fn report_invalidated(&mut self, ctx: &mut RouterContext<'_, A>, broken: Vec<InvalidatedRoute<A>>) {
        let mut per_precursor: BTreeMap<A, Vec<(A, u32)>> = BTreeMap::new();
        let mut repair = Vec::new();

        for route in broken {
            if let Some(timer) = route.expiry_timer {
                ctx.cancel(timer);
            }
            ctx.emit(RoutingEvent::RouteInvalidated {
                destination: route.destination,
            });
            for precursor in &route.precursors {
                per_precursor
                    .entry(*precursor)
                    .or_default()
                    .push((route.destination, route.dest_seq));
            }
            if route.originated {
                repair.push(route.destination);
            }
        }

        for (precursor, unreachable) in per_precursor {
            self.send_route_error(ctx, precursor, unreachable);
        }

        for destination in repair {
            if self.config.local_repair {
                if self.originate(ctx, destination) {
                    debug!(node = %self.address, dest = %destination, "local repair started");
                }
            } else {
                warn!(node = %self.address, dest = %destination, "route lost");
                ctx.emit(RoutingEvent::DestinationUnreachable { destination });
            }
        }
    }

    /// Tell `to` that the listed destinations are unreachable through us
    pub(crate) fn send_route_error(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        to: A,
        unreachable: Vec<(A, u32)>,
    ) {
        if unreachable.is_empty() {
            return;
        }
        trace!(node = %self.address, neighbor = %to, count = unreachable.len(), "sending route error");
        let message = WireMessage::Error(RouteError { unreachable });
        if let Err(e) = self.transmit(ctx, SendTarget::Unicast(to), &message) {
            // Not treated as a break: the error itself reports one
            debug!(node = %self.address, neighbor = %to, error = %e, "route error lost");
        }
    }

    /// Handle a route error from neighbor `from`
    pub(crate) fn on_error(&mut self, ctx: &mut RouterContext<'_, A>, from: A, err: RouteError<A>) {
        if !self.trust.admits(&from) {
            trace!(node = %self.address, neighbor = %from, "route error from excluded neighbor dropped");
            return;
        }
        let now = ctx.now();
        let mut broken = Vec::new();
        for (destination, seq) in err.unreachable {
            let via_sender = self.routes.get(&destination).is_some_and(|e| {
                e.state == RouteState::Valid && e.next_hop == Some(from)
            });
            if !via_sender {
                continue;
            }
            if let Some(route) =
                self.routes
                    .invalidate(&destination, Some(seq), now, self.config.delete_period)
            {
                broken.push(route);
            }
        }
        if broken.is_empty() {
            return;
        }
        debug!(node = %self.address, neighbor = %from, routes = broken.len(), "routes invalidated by route error");
        self.report_invalidated(ctx, broken);
    }

    /// Handle a hello from neighbor `from`
    pub(crate) fn on_hello(&mut self, ctx: &mut RouterContext<'_, A>, from: A, hello: Hello<A>) {
        if hello.sender != from {
            self.observe(ctx, from, ObservationCause::Malformed);
            return;
        }
        if !self.trust.admits(&from) {
            return;
        }
        self.observe_sequence(ctx, from, hello.sender_seq);
        if !self.trust.admits(&from) {
            return;
        }

        let now = ctx.now();
        let lifetime = now + self.config.neighbor_timeout();
        let offer = RouteOffer {
            next_hop: from,
            hop_count: 1,
            dest_seq: Some(hello.sender_seq),
            lifetime,
            path_trust: self.trust.assess(&from).score,
        };
        if self.offer_route(ctx, from, offer) {
            return;
        }
        self.routes.refresh(&from, lifetime, now);
        if self.routes.valid_route(&from, now).is_none() {
            // The entry was bumped past the sender's own number by a link break
            self.learn_neighbor_route(ctx, from);
        }
    }

    /// Broadcast a hello carrying our own sequence number
    pub(crate) fn send_hello(&mut self, ctx: &mut RouterContext<'_, A>) {
        let hello = Hello {
            sender: self.address,
            sender_seq: self.sequence.own_seq(),
        };
        let _ = self.transmit(ctx, SendTarget::Broadcast, &WireMessage::Hello(hello));
    }

    /// Periodic maintenance
    pub(crate) fn sweep(&mut self, ctx: &mut RouterContext<'_, A>) {
        let now = ctx.now();

        let purged = self.routes.purge(now);
        let forgotten = self.seen.expire(now);
        if !purged.is_empty() || forgotten > 0 {
            trace!(node = %self.address, purged = purged.len(), forgotten, "sweep purged state");
        }

        if self.config.enable_hello {
            for neighbor in self.liveness.take_silent(now, self.config.neighbor_timeout()) {
                debug!(node = %self.address, neighbor = %neighbor, "neighbor silent");
                self.handle_link_break(ctx, neighbor);
            }
        }

        let present: BTreeSet<A> = ctx.neighbors().into_iter().collect();
        for next_hop in self.routes.active_next_hops() {
            if !present.contains(&next_hop) {
                debug!(node = %self.address, neighbor = %next_hop, "next hop out of range");
                self.handle_link_break(ctx, next_hop);
            }
        }

        for destination in self.routes.lapsed(now) {
            let timer = self.routes.get(&destination).and_then(|e| e.expiry_timer);
            if self.routes.expire(&destination, now, self.config.delete_period) {
                if let Some(timer) = timer {
                    ctx.cancel(timer);
                }
                ctx.emit(RoutingEvent::RouteInvalidated { destination });
            }
        }

        for transition in self.trust.decay(now) {
            self.report_transition(ctx, transition);
        }
    }

    /// Expiry timer of a route fired
    ///
    /// A route refreshed since the timer was armed gets a new timer for its
    /// remaining lifetime.
    pub(crate) fn route_expired(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        destination: A,
        handle: TimerHandle,
    ) {
        let now = ctx.now();
        let Some(entry) = self.routes.get_mut(&destination) else {
            return;
        };
        if entry.expiry_timer != Some(handle) {
            return;
        }
        entry.expiry_timer = None;
        if entry.state != RouteState::Valid {
            return;
        }
        if entry.lifetime > now {
            let remaining = entry.lifetime - now;
            entry.expiry_timer =
                Some(ctx.schedule_after(remaining, RouterTimer::RouteExpiry { destination }));
            return;
        }
        if self.routes.expire(&destination, now, self.config.delete_period) {
            trace!(node = %self.address, dest = %destination, "route expired");
            ctx.emit(RoutingEvent::RouteInvalidated { destination });
        }
    }
}
