//! The routing instance
//!
//! [`AodvTrustRouter`] owns every table of one node and reacts to four kinds
//! of input, all delivered by the environment with a [`RouterContext`]:
//!
//! 1. frames addressed to this node (`on_receive`)
//! 2. frames overheard between other nodes (`on_overheard`)
//! 3. timers it armed earlier (`on_timer`)
//! 4. application data (`send_data`)
//!
//! Route discovery lives in `discovery.rs`, maintenance in `maintenance.rs`;
//! this module holds the data path and the dispatch.

use std::time::Duration;

use aodv_core::{
    DataPacket, DropReason, NodeAddress, NodeContext, PacketId, RoutingEvent, SendTarget,
    TimerHandle, TransportError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::config::AodvConfig;
use crate::error::{ConfigError, RoutingError, RoutingResult};
use crate::messages::WireMessage;
use crate::neighbors::NeighborLiveness;
use crate::pending::PendingRequests;
use crate::seen::SeenRequestCache;
use crate::sequence::SequenceRegistry;
use crate::table::{OfferVerdict, RouteOffer, RoutingTable};
use crate::trust::{ObservationCause, TrustEngine, TrustTransition};
use crate::watchdog::ForwardWatchdog;

/// Timer payloads armed by the router
#[derive(Debug, Clone, PartialEq)]
pub enum RouterTimer<A: NodeAddress> {
    /// Periodic hello broadcast
    Hello,
    /// Periodic maintenance sweep
    Sweep,
    /// Retry or give up a discovery
    RequestRetry { destination: A },
    /// A route's lifetime may have passed
    RouteExpiry { destination: A },
    /// A neighbor's forward was not overheard in time
    ForwardDeadline { packet_id: PacketId<A>, neighbor: A },
    /// Jittered re-broadcast
    DeferredBroadcast { message: WireMessage<A> },
}

/// Environment view handed to every router entry point
pub type RouterContext<'a, A> = dyn NodeContext<A, RouterTimer<A>> + 'a;

/// Trust-augmented AODV routing instance for one node
pub struct AodvTrustRouter<A: NodeAddress> {
    pub(crate) address: A,
    pub(crate) config: AodvConfig,
    pub(crate) sequence: SequenceRegistry,
    pub(crate) routes: RoutingTable<A>,
    pub(crate) trust: TrustEngine<A>,
    pub(crate) pending: PendingRequests<A>,
    pub(crate) seen: SeenRequestCache<A>,
    pub(crate) watchdog: ForwardWatchdog<A>,
    pub(crate) liveness: NeighborLiveness<A>,
    pub(crate) rng: StdRng,
    pub(crate) hello_timer: Option<TimerHandle>,
    pub(crate) sweep_timer: Option<TimerHandle>,
    next_packet_seq: u64,
}

impl<A: NodeAddress> AodvTrustRouter<A> {
    /// Create a router for `address`
    ///
    /// The random stream used for jitter is seeded from the address until
    /// [`assign_streams`](Self::assign_streams) is called.
    pub fn new(address: A, config: AodvConfig) -> Self {
        let seed = address
            .as_bytes()
            .iter()
            .fold(0u64, |acc, b| acc.rotate_left(8) ^ u64::from(*b));
        Self {
            address,
            sequence: SequenceRegistry::new(),
            routes: RoutingTable::new(),
            trust: TrustEngine::new(config.trust.clone(), config.enable_trust),
            pending: PendingRequests::new(config.max_buffered_packets),
            seen: SeenRequestCache::new(config.path_discovery_time),
            watchdog: ForwardWatchdog::new(config.forward_confirm_timeout),
            liveness: NeighborLiveness::new(),
            rng: StdRng::seed_from_u64(seed),
            hello_timer: None,
            sweep_timer: None,
            next_packet_seq: 0,
            config,
        }
    }

    /// Create a router after validating the configuration
    pub fn try_new(address: A, config: AodvConfig) -> Result<Self, ConfigError> {
        let warnings = config.validate();
        if !warnings.is_empty() {
            return Err(ConfigError::Invalid(warnings));
        }
        Ok(Self::new(address, config))
    }

    /// Replace the configuration, keeping learned state
    pub fn configure(&mut self, config: AodvConfig) -> Result<(), ConfigError> {
        let warnings = config.validate();
        if !warnings.is_empty() {
            return Err(ConfigError::Invalid(warnings));
        }
        self.trust
            .reconfigure(config.trust.clone(), config.enable_trust);
        self.pending.set_max_buffered(config.max_buffered_packets);
        self.seen.set_lifetime(config.path_discovery_time);
        self.watchdog.set_timeout(config.forward_confirm_timeout);
        self.config = config;
        Ok(())
    }

    /// Reseed the jitter stream; returns the number of streams consumed
    pub fn assign_streams(&mut self, stream: u64) -> u64 {
        self.rng = StdRng::seed_from_u64(stream);
        1
    }

    /// Own address
    pub fn address(&self) -> A {
        self.address
    }

    /// Active configuration
    pub fn config(&self) -> &AodvConfig {
        &self.config
    }

    /// Routing table
    pub fn routes(&self) -> &RoutingTable<A> {
        &self.routes
    }

    /// Trust engine
    pub fn trust(&self) -> &TrustEngine<A> {
        &self.trust
    }

    /// Running discoveries
    pub fn pending(&self) -> &PendingRequests<A> {
        &self.pending
    }

    /// Duplicate request cache
    pub fn seen(&self) -> &SeenRequestCache<A> {
        &self.seen
    }

    /// Own sequence counters
    pub fn sequence(&self) -> &SequenceRegistry {
        &self.sequence
    }

    /// Awaited forwards
    pub fn watchdog(&self) -> &ForwardWatchdog<A> {
        &self.watchdog
    }

    /// Arm the periodic timers
    pub fn start(&mut self, ctx: &mut RouterContext<'_, A>) {
        if self.config.enable_hello {
            let offset = self.random_delay(self.config.hello_interval);
            self.hello_timer = Some(ctx.schedule_after(offset, RouterTimer::Hello));
        }
        self.sweep_timer = Some(ctx.schedule_after(self.config.sweep_interval, RouterTimer::Sweep));
        debug!(node = %self.address, trust = self.config.enable_trust, "router started");
    }

    /// Hand an application payload to the router
    pub fn send_data(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        destination: A,
        payload: Vec<u8>,
    ) -> RoutingResult<PacketId<A>> {
        if destination == self.address {
            return Err(RoutingError::SelfAddressed);
        }
        self.next_packet_seq += 1;
        let id = PacketId::new(self.address, self.next_packet_seq);
        let packet = DataPacket::new(id, destination, self.config.data_ttl, payload);
        ctx.emit(RoutingEvent::DataOriginated {
            packet_id: id,
            destination,
            bytes: packet.size(),
        });
        self.route_data(ctx, packet, None);
        Ok(id)
    }

    /// A frame addressed to this node (unicast or broadcast) arrived
    pub fn on_receive(&mut self, ctx: &mut RouterContext<'_, A>, from: A, frame: &[u8]) {
        self.note_neighbor(ctx, from);

        let message = match WireMessage::<A>::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!(node = %self.address, neighbor = %from, error = %e, "malformed frame");
                self.observe(ctx, from, ObservationCause::Malformed);
                return;
            }
        };

        match message {
            WireMessage::Request(req) => self.on_request(ctx, from, req),
            WireMessage::Reply(rep) => self.on_reply(ctx, from, rep),
            WireMessage::Error(err) => self.on_error(ctx, from, err),
            WireMessage::Hello(hello) => self.on_hello(ctx, from, hello),
            WireMessage::Data(packet) => self.route_data(ctx, packet, Some(from)),
        }
    }

    /// A frame between two other nodes was overheard
    ///
    /// Only used to confirm that a neighbor forwarded what it was handed.
    pub fn on_overheard(&mut self, ctx: &mut RouterContext<'_, A>, transmitter: A, frame: &[u8]) {
        let Ok(WireMessage::Data(packet)) = WireMessage::<A>::decode(frame) else {
            return;
        };
        if let Some(watch) = self.watchdog.confirm(packet.id, transmitter) {
            if let Some(timer) = watch.timer {
                ctx.cancel(timer);
            }
            trace!(node = %self.address, neighbor = %transmitter, packet_id = %packet.id, "forward confirmed");
            self.observe(ctx, transmitter, ObservationCause::ForwardConfirmed);
        }
    }

    /// A timer armed by this router fired
    pub fn on_timer(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        handle: TimerHandle,
        timer: RouterTimer<A>,
    ) {
        match timer {
            RouterTimer::Hello => {
                if self.hello_timer == Some(handle) {
                    self.send_hello(ctx);
                    let next = self.jittered(self.config.hello_interval);
                    self.hello_timer = Some(ctx.schedule_after(next, RouterTimer::Hello));
                }
            }
            RouterTimer::Sweep => {
                if self.sweep_timer == Some(handle) {
                    self.sweep(ctx);
                    self.sweep_timer =
                        Some(ctx.schedule_after(self.config.sweep_interval, RouterTimer::Sweep));
                }
            }
            RouterTimer::RequestRetry { destination } => {
                self.retry_request(ctx, destination, handle)
            }
            RouterTimer::RouteExpiry { destination } => {
                self.route_expired(ctx, destination, handle)
            }
            RouterTimer::ForwardDeadline { packet_id, neighbor } => {
                if self.watchdog.expire(packet_id, neighbor, handle).is_some() {
                    debug!(node = %self.address, neighbor = %neighbor, packet_id = %packet_id, "forward not observed");
                    self.observe(ctx, neighbor, ObservationCause::ForwardMissed);
                }
            }
            RouterTimer::DeferredBroadcast { message } => {
                // A failed broadcast has no neighbor to blame
                let _ = self.transmit(ctx, SendTarget::Broadcast, &message);
            }
        }
    }

    /// The link layer reported that a unicast to `next_hop` was lost
    pub fn on_send_failure(&mut self, ctx: &mut RouterContext<'_, A>, next_hop: A, frame: &[u8]) {
        let failed = match WireMessage::<A>::decode(frame) {
            Ok(WireMessage::Data(packet)) => Some(packet),
            _ => None,
        };
        self.handle_link_break(ctx, next_hop);
        if let Some(packet) = failed {
            self.salvage(ctx, packet);
        }
    }

    pub(crate) fn route_data(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        packet: DataPacket<A>,
        previous_hop: Option<A>,
    ) {
        let now = ctx.now();

        if packet.destination == self.address {
            debug!(node = %self.address, packet_id = %packet.id, hops = packet.hops, "data delivered");
            ctx.emit(RoutingEvent::DataDelivered {
                packet_id: packet.id,
                bytes: packet.size(),
                hops: packet.hops,
            });
            return;
        }

        if let Some(next_hop) = self.routes.next_hop(&packet.destination, now) {
            if self.trust.admits(&next_hop) {
                self.forward(ctx, packet, next_hop, previous_hop);
                return;
            }
            // Route predates the neighbor's blacklisting
            self.handle_link_break(ctx, next_hop);
        }

        match previous_hop {
            None => self.buffer_for_discovery(ctx, packet),
            Some(previous) => {
                debug!(node = %self.address, packet_id = %packet.id, dest = %packet.destination, "no route for transit data");
                ctx.emit(RoutingEvent::DataDropped {
                    packet_id: packet.id,
                    reason: DropReason::NoRoute,
                });
                let seq = self
                    .routes
                    .get(&packet.destination)
                    .map(|e| e.dest_seq)
                    .unwrap_or(0);
                self.send_route_error(ctx, previous, vec![(packet.destination, seq)]);
            }
        }
    }

    fn forward(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        mut packet: DataPacket<A>,
        next_hop: A,
        previous_hop: Option<A>,
    ) {
        if !packet.take_hop() {
            ctx.emit(RoutingEvent::DataDropped {
                packet_id: packet.id,
                reason: DropReason::TtlExpired,
            });
            return;
        }

        let now = ctx.now();
        let until = now + self.config.active_route_timeout;
        self.routes.refresh(&packet.destination, until, now);
        self.routes.refresh(&next_hop, until, now);
        self.routes.refresh(&packet.source(), until, now);
        if let Some(previous) = previous_hop {
            self.routes.refresh(&previous, until, now);
        }

        let packet_id = packet.id;
        let destination = packet.destination;
        match self.transmit(ctx, SendTarget::Unicast(next_hop), &WireMessage::Data(packet.clone())) {
            Ok(()) => {
                trace!(node = %self.address, packet_id = %packet_id, next_hop = %next_hop, "data forwarded");
                ctx.emit(RoutingEvent::DataForwarded { packet_id, next_hop });
                if next_hop != destination && self.watchdog.watch(packet_id, next_hop, now) {
                    let timer = ctx.schedule_after(
                        self.watchdog.timeout(),
                        RouterTimer::ForwardDeadline {
                            packet_id,
                            neighbor: next_hop,
                        },
                    );
                    self.watchdog.arm(packet_id, next_hop, timer);
                }
            }
            Err(e) => {
                debug!(node = %self.address, next_hop = %next_hop, error = %e, "forward failed");
                self.handle_link_break(ctx, next_hop);
                // The hop was not taken
                packet.ttl = packet.ttl.saturating_add(1);
                packet.hops = packet.hops.saturating_sub(1);
                if previous_hop.is_none() {
                    self.salvage(ctx, packet);
                } else {
                    ctx.emit(RoutingEvent::DataDropped {
                        packet_id,
                        reason: DropReason::LinkBroken,
                    });
                }
            }
        }
    }

    /// Re-queue a locally originated packet whose hop failed
    fn salvage(&mut self, ctx: &mut RouterContext<'_, A>, packet: DataPacket<A>) {
        if packet.source() == self.address {
            self.buffer_for_discovery(ctx, packet);
        } else {
            ctx.emit(RoutingEvent::DataDropped {
                packet_id: packet.id,
                reason: DropReason::LinkBroken,
            });
        }
    }

    fn buffer_for_discovery(&mut self, ctx: &mut RouterContext<'_, A>, packet: DataPacket<A>) {
        let destination = packet.destination;
        if !self.pending.contains(&destination) {
            self.originate(ctx, destination);
        }
        if let Some(evicted) = self.pending.buffer(packet) {
            let reason = if evicted.destination == destination && self.pending.contains(&destination) {
                DropReason::BufferFull
            } else {
                DropReason::NoRoute
            };
            ctx.emit(RoutingEvent::DataDropped {
                packet_id: evicted.id,
                reason,
            });
        }
    }

    /// Encode and send a message, reporting control overhead
    pub(crate) fn transmit(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        target: SendTarget<A>,
        message: &WireMessage<A>,
    ) -> Result<(), TransportError> {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(node = %self.address, error = %e, "failed to encode message");
                return Ok(());
            }
        };
        ctx.send(target, frame)?;
        if let Some(kind) = message.kind() {
            ctx.emit(RoutingEvent::ControlSent { kind });
        }
        Ok(())
    }

    /// Broadcast now, or after a random delay when jitter is configured
    pub(crate) fn broadcast_jittered(&mut self, ctx: &mut RouterContext<'_, A>, message: WireMessage<A>) {
        let delay = self.random_delay(self.config.broadcast_jitter);
        if delay.is_zero() {
            let _ = self.transmit(ctx, SendTarget::Broadcast, &message);
        } else {
            ctx.schedule_after(delay, RouterTimer::DeferredBroadcast { message });
        }
    }

    /// Uniform delay in `[0, bound)`; zero when the bound is zero
    pub(crate) fn random_delay(&mut self, bound: Duration) -> Duration {
        let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.random_range(0..bound_ms))
    }

    /// `base` shifted by up to a tenth either way
    fn jittered(&mut self, base: Duration) -> Duration {
        let spread = base / 10;
        base - spread + self.random_delay(spread * 2)
    }

    /// Record that a frame came from `neighbor`
    pub(crate) fn note_neighbor(&mut self, ctx: &mut RouterContext<'_, A>, neighbor: A) {
        let now = ctx.now();
        if self.liveness.heard(neighbor, now) {
            trace!(node = %self.address, neighbor = %neighbor, "neighbor heard");
        }
        self.trust.touch(neighbor, now);
    }

    /// Feed an observation to the trust engine and act on state changes
    pub(crate) fn observe(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        neighbor: A,
        cause: ObservationCause,
    ) {
        let Some(transition) = self.trust.observe(neighbor, cause, ctx.now()) else {
            return;
        };
        self.report_transition(ctx, transition);
    }

    /// Publish a trust state change; an excluded neighbor counts as a link break
    pub(crate) fn report_transition(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        transition: TrustTransition<A>,
    ) {
        let neighbor = transition.neighbor;
        info!(
            node = %self.address,
            neighbor = %neighbor,
            from = %transition.from,
            to = %transition.to,
            score = transition.score,
            "trust state changed"
        );
        ctx.emit(RoutingEvent::TrustStateChanged {
            neighbor,
            from: transition.from,
            to: transition.to,
            score: transition.score,
        });
        if !self.trust.admits(&neighbor) {
            self.handle_link_break(ctx, neighbor);
        }
    }

    /// Offer a route for `destination`, resolving ties by trust
    ///
    /// Returns true when the offer was installed.
    pub(crate) fn offer_route(
        &mut self,
        ctx: &mut RouterContext<'_, A>,
        destination: A,
        offer: RouteOffer<A>,
    ) -> bool {
        let now = ctx.now();
        let accept = match self.routes.judge_offer(&destination, &offer, now) {
            OfferVerdict::Accept => true,
            OfferVerdict::Reject => false,
            OfferVerdict::Tie => self
                .routes
                .get(&destination)
                .and_then(|e| e.next_hop.map(|hop| (hop, e.path_trust)))
                .is_some_and(|(incumbent, incumbent_path)| {
                    self.trust
                        .prefers(&offer.next_hop, offer.path_trust, &incumbent, incumbent_path)
                }),
        };
        if accept {
            self.install_route(ctx, destination, offer);
        }
        accept
    }

    fn install_route(&mut self, ctx: &mut RouterContext<'_, A>, destination: A, offer: RouteOffer<A>) {
        let now = ctx.now();
        let previous = self.routes.next_hop(&destination, now);
        if let Some(stale) = self.routes.install(destination, offer) {
            ctx.cancel(stale);
        }
        let timer = ctx.schedule_after(offer.lifetime - now, RouterTimer::RouteExpiry { destination });
        if let Some(entry) = self.routes.get_mut(&destination) {
            entry.expiry_timer = Some(timer);
        }
        if previous != Some(offer.next_hop) {
            debug!(
                node = %self.address,
                dest = %destination,
                next_hop = %offer.next_hop,
                hops = offer.hop_count,
                "route established"
            );
            ctx.emit(RoutingEvent::RouteEstablished {
                destination,
                next_hop: offer.next_hop,
                hop_count: offer.hop_count.max(1),
            });
        }
    }
}

impl<A: NodeAddress> std::fmt::Debug for AodvTrustRouter<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AodvTrustRouter")
            .field("address", &self.address)
            .field("trust_enabled", &self.trust.is_enabled())
            .field("routes", &self.routes.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
