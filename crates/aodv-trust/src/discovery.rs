//! Route discovery
//!
//! ## How it works
//!
//! 1. `originate` floods a route request for an unknown destination and
//!    arms a retry timer; data waits in the pending request's buffer
//! 2. Every node handles a request once, learns the reverse route to the
//!    originator, then either answers (it is the destination, or holds a
//!    fresh enough route) or re-broadcasts it
//! 3. Replies travel back along reverse routes, installing forward routes
//!    and precursor lists on the way
//! 4. At the originator the first accepted reply completes the discovery
//!    and releases the buffered data; later equally good replies only win
//!    if the trust engine prefers the replying neighbor
//!
//! Requests and replies from neighbors the trust engine does not admit are
//! dropped before any state changes.

use std::time::Duration;

use aodv_core::{DropReason, NodeAddress, RoutingEvent, SendTarget, TimerHandle};
use tracing::{debug, instrument, trace, warn};

use crate::messages::{RouteReply, RouteRequest, WireMessage};
use crate::neighbors::SequenceChange;
use crate::pending::PendingRequest;
use crate::router::{AodvTrustRouter, RouterContext, RouterTimer};
use crate::sequence::{seq_at_least, seq_distance, seq_max, seq_newer};
use crate::table::RouteOffer;
use crate::trust::ObservationCause;

fn duration_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

impl<A: NodeAddress> AodvTrustRouter<A> {
    /// Start discovering a route to `destination`
    ///
    /// Returns false without side effects when a discovery for the
    /// destination is already running, a usable route exists, or the
    /// destination is this node.
    pub fn originate(&mut self, ctx: &mut RouterContext<'_, A>, destination: A) -> bool {
        let now = ctx.now();
        if destination == self.address || self.pending.contains(&destination) {
            return false;
        }
        if !self.routes.mark_in_search(destination, now) {
            return false;
        }

        let originator_seq = self.sequence.next_seq();
        let broadcast_id = self.sequence.next_broadcast_id();
        self.pending
            .insert(PendingRequest::new(destination, originator_seq, broadcast_id));
        debug!(node = %self.address, dest = %destination, broadcast_id, "route discovery started");
        self.send_request(ctx, destination);
        true
    }

    /// Flood the current attempt of a pending discovery and arm its retry
    fn send_request(&mut self, ctx: &mut RouterContext<'_, A>, destination: A) {
        let now = ctx.now();
        let Some(pending) = self.pending.get(&destination) else {
            return;
        };
        let request = RouteRequest {
            originator: self.address,
            originator_seq: pending.originator_seq,
            destination,
            dest_seq: self.routes.get(&destination).and_then(|e| e.known_seq()),
            broadcast_id: pending.broadcast_id,
            hop_count: 0,
            path_trust: self.trust.initial_path_trust(),
        };
        let backoff = self.config.retry_backoff(pending.retries);

        self.seen.insert(self.address, request.broadcast_id, now);
        let _ = self.transmit(ctx, SendTarget::Broadcast, &WireMessage::Request(request));

        let timer = ctx.schedule_after(backoff, RouterTimer::RequestRetry { destination });
        if let Some(pending) = self.pending.get_mut(&destination) {
            if let Some(stale) = pending.retry_timer.replace(timer) {
                ctx.cancel(stale);
            }
            pending.next_retry = now + backoff;
        }
    }

    /// Retry timer of a discovery fired
    pub(crate) fn retry_request(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        destination: A,
        handle: TimerHandle,
    ) {
        let now = ctx.now();
        let Some(pending) = self.pending.get_mut(&destination) else {
            return;
        };
        if pending.retry_timer != Some(handle) {
            return;
        }
        pending.retry_timer = None;

        // A route may have been learned from someone else's discovery
        if self.routes.valid_route(&destination, now).is_some() {
            self.complete_discovery(ctx, destination);
            return;
        }

        if pending.retries < self.config.request_retry_limit {
            pending.retries += 1;
            pending.broadcast_id = self.sequence.next_broadcast_id();
            debug!(node = %self.address, dest = %destination, retry = pending.retries, "retrying route discovery");
            self.send_request(ctx, destination);
            return;
        }

        let Some(abandoned) = self.pending.remove(&destination) else {
            return;
        };
        warn!(node = %self.address, dest = %destination, dropped = abandoned.buffered.len(), "destination unreachable");
        self.routes
            .abandon_search(&destination, now, self.config.delete_period);
        for packet in abandoned.buffered {
            ctx.emit(RoutingEvent::DataDropped {
                packet_id: packet.id,
                reason: DropReason::Unreachable,
            });
        }
        ctx.emit(RoutingEvent::DestinationUnreachable { destination });
    }

    /// Finish a discovery and release its buffered data
    pub(crate) fn complete_discovery(&mut self, ctx: &mut RouterContext<'_, A>, destination: A) {
        let Some(done) = self.pending.remove(&destination) else {
            return;
        };
        if let Some(timer) = done.retry_timer {
            ctx.cancel(timer);
        }
        debug!(node = %self.address, dest = %destination, buffered = done.buffered.len(), "route discovery complete");
        for packet in done.buffered {
            self.route_data(ctx, packet, None);
        }
    }

    /// Handle a route request from neighbor `from`
    #[instrument(level = "trace", skip(self, ctx, req), fields(node = %self.address, origin = %req.originator, dest = %req.destination))]
    pub(crate) fn on_request(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        from: A,
        req: RouteRequest<A>,
    ) {
        let now = ctx.now();
        if !self.trust.admits(&from) {
            trace!(neighbor = %from, "request from excluded neighbor dropped");
            return;
        }
        if req.originator == self.address {
            // Our own flood echoed back
            return;
        }
        if req.hop_count >= self.config.net_diameter {
            self.observe(ctx, from, ObservationCause::Malformed);
            return;
        }
        if !self.seen.insert(req.originator, req.broadcast_id, now) {
            trace!(broadcast_id = req.broadcast_id, "duplicate request dropped");
            return;
        }

        if from == req.originator {
            self.observe_sequence(ctx, from, req.originator_seq);
        }
        self.learn_neighbor_route(ctx, from);

        let hop_count = req.hop_count.saturating_add(1);
        let path_trust = self.trust.combine_path(req.path_trust, &from);
        let reverse = RouteOffer {
            next_hop: from,
            hop_count,
            dest_seq: Some(req.originator_seq),
            lifetime: now + self.config.active_route_timeout,
            path_trust,
        };
        if !self.offer_route(ctx, req.originator, reverse) {
            self.routes
                .refresh(&req.originator, now + self.config.active_route_timeout, now);
        }

        if req.destination == self.address {
            if let Some(requested) = req.dest_seq {
                self.sequence.raise_to(requested);
            }
            let reply = RouteReply {
                originator: req.originator,
                destination: self.address,
                dest_seq: self.sequence.own_seq(),
                hop_count: 0,
                lifetime_ms: duration_ms(self.config.my_route_timeout),
                path_trust: self.trust.initial_path_trust(),
            };
            debug!("answering request as destination");
            self.send_reply(ctx, from, reply);
            return;
        }

        let cached = self.routes.valid_route(&req.destination, now).and_then(|entry| {
            let fresh = entry.valid_seq
                && req
                    .dest_seq
                    .is_none_or(|requested| seq_at_least(entry.dest_seq, requested));
            let next_hop = entry.next_hop?;
            (fresh && next_hop != from).then(|| {
                (
                    next_hop,
                    RouteReply {
                        originator: req.originator,
                        destination: req.destination,
                        dest_seq: entry.dest_seq,
                        hop_count: entry.hop_count,
                        lifetime_ms: duration_ms(entry.lifetime - now),
                        path_trust: entry.path_trust,
                    },
                )
            })
        });
        if let Some((next_hop, reply)) = cached
            && self.trust.admits(&next_hop)
        {
            self.routes.add_precursor(&req.destination, from);
            self.routes.add_precursor(&req.originator, next_hop);
            debug!(next_hop = %next_hop, "answering request from route cache");
            self.send_reply(ctx, from, reply);
            return;
        }

        if hop_count >= self.config.net_diameter {
            trace!("request reached hop limit");
            return;
        }
        let known = self.routes.get(&req.destination).and_then(|e| e.known_seq());
        let dest_seq = match (req.dest_seq, known) {
            (Some(a), Some(b)) => Some(seq_max(a, b)),
            (a, b) => a.or(b),
        };
        let forwarded = RouteRequest {
            hop_count,
            dest_seq,
            path_trust,
            ..req
        };
        self.broadcast_jittered(ctx, WireMessage::Request(forwarded));
    }

    /// Handle a route reply from neighbor `from`
    #[instrument(level = "trace", skip(self, ctx, rep), fields(node = %self.address, origin = %rep.originator, dest = %rep.destination))]
    pub(crate) fn on_reply(&mut self, ctx: &mut RouterContext<'_, A>, from: A, rep: RouteReply<A>) {
        let now = ctx.now();
        if !self.trust.admits(&from) {
            trace!(neighbor = %from, "reply from excluded neighbor dropped");
            return;
        }
        if rep.destination == self.address || rep.hop_count >= self.config.net_diameter {
            self.observe(ctx, from, ObservationCause::Malformed);
            return;
        }

        if from == rep.destination {
            self.observe_sequence(ctx, from, rep.dest_seq);
        }
        let known = self.routes.get(&rep.destination).and_then(|e| e.known_seq());
        let cause = match known {
            Some(k) if seq_newer(k, rep.dest_seq) => {
                debug!(neighbor = %from, claimed = rep.dest_seq, known = k, "reply older than known route");
                ObservationCause::SequenceRegression
            }
            Some(k) if seq_distance(rep.dest_seq, k) > self.config.max_sequence_jump => {
                debug!(neighbor = %from, claimed = rep.dest_seq, known = k, "implausible sequence jump");
                ObservationCause::ImplausibleSequence
            }
            _ => ObservationCause::ValidReply,
        };
        self.observe(ctx, from, cause);
        if !self.trust.admits(&from) {
            return;
        }

        self.learn_neighbor_route(ctx, from);

        let hop_count = rep.hop_count.saturating_add(1);
        let path_trust = self.trust.combine_path(rep.path_trust, &from);
        let forward = RouteOffer {
            next_hop: from,
            hop_count,
            dest_seq: Some(rep.dest_seq),
            lifetime: now + Duration::from_millis(u64::from(rep.lifetime_ms)),
            path_trust,
        };
        let accepted = self.offer_route(ctx, rep.destination, forward);

        if rep.originator == self.address {
            if accepted {
                self.complete_discovery(ctx, rep.destination);
            } else {
                trace!(neighbor = %from, "reply did not improve route");
            }
            return;
        }
        if !accepted {
            return;
        }

        let Some(reverse_hop) = self.routes.next_hop(&rep.originator, now) else {
            debug!("no reverse route; reply dropped");
            return;
        };
        self.routes.add_precursor(&rep.destination, reverse_hop);
        self.routes.add_precursor(&rep.originator, from);
        self.routes
            .refresh(&rep.originator, now + self.config.active_route_timeout, now);

        let forwarded = RouteReply {
            hop_count,
            path_trust,
            ..rep
        };
        self.send_reply(ctx, reverse_hop, forwarded);
    }

    fn send_reply(&mut self, ctx: &mut RouterContext<'_, A>, to: A, reply: RouteReply<A>) {
        if let Err(e) = self.transmit(ctx, SendTarget::Unicast(to), &WireMessage::Reply(reply)) {
            debug!(node = %self.address, neighbor = %to, error = %e, "reply lost");
            self.handle_link_break(ctx, to);
        }
    }

    /// Learn or refresh the one-hop route to a neighbor we just heard
    pub(crate) fn learn_neighbor_route(&mut self, ctx: &mut RouterContext<'_, A>, neighbor: A) {
        let now = ctx.now();
        let until = now + self.config.active_route_timeout;
        let offer = RouteOffer {
            next_hop: neighbor,
            hop_count: 1,
            dest_seq: None,
            lifetime: until,
            path_trust: self.trust.assess(&neighbor).score,
        };
        if !self.offer_route(ctx, neighbor, offer) {
            self.routes.refresh(&neighbor, until, now);
        }
    }

    /// Judge a neighbor's own sequence number against the last one it used
    pub(crate) fn observe_sequence(&mut self, ctx: &mut RouterContext<'_, A>, neighbor: A, seq: u32) {
        match self.liveness.record_seq(neighbor, seq) {
            SequenceChange::First | SequenceChange::Unchanged => {}
            SequenceChange::Advanced => {
                self.observe(ctx, neighbor, ObservationCause::SequenceProgress)
            }
            SequenceChange::Regressed => {
                debug!(node = %self.address, neighbor = %neighbor, seq, "sequence number regressed");
                self.observe(ctx, neighbor, ObservationCause::SequenceRegression)
            }
        }
    }
}
