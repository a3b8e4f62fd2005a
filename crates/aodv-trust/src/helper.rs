//! Protocol capability trait and installation helper
//!
//! [`RoutingProtocol`] is what an environment (the simulator, a test) needs
//! to drive any routing instance: configuration, random stream assignment
//! and the inbound handlers. [`AodvTrustHelper`] creates configured
//! [`AodvTrustRouter`]s and hands out deterministic random streams to a
//! whole set of instances through the trait.

use aodv_core::{NodeAddress, NodeContext, PacketId, TimerHandle};

use crate::config::AodvConfig;
use crate::error::{ConfigError, RoutingResult};
use crate::router::{AodvTrustRouter, RouterTimer};

/// Operations every routing instance offers its environment
pub trait RoutingProtocol<A: NodeAddress> {
    /// Configuration accepted by `configure`
    type Config;
    /// Timer payload the instance arms
    type Timer;

    /// Short protocol name for reports
    fn protocol_name(&self) -> &'static str;

    /// Apply a new configuration, rejecting invalid ones
    fn configure(&mut self, config: Self::Config) -> Result<(), ConfigError>;

    /// Take random streams starting at `first_stream`; returns how many were used
    fn assign_streams(&mut self, first_stream: u64) -> u64;

    /// Arm periodic timers
    fn start(&mut self, ctx: &mut dyn NodeContext<A, Self::Timer>);

    /// Route an application payload
    fn send_data(
        &mut self,
        ctx: &mut dyn NodeContext<A, Self::Timer>,
        destination: A,
        payload: Vec<u8>,
    ) -> RoutingResult<PacketId<A>>;

    /// A frame addressed to this node arrived from `from`
    fn on_receive(&mut self, ctx: &mut dyn NodeContext<A, Self::Timer>, from: A, frame: &[u8]);

    /// A frame sent by `transmitter` to someone else was overheard
    fn on_overheard(
        &mut self,
        ctx: &mut dyn NodeContext<A, Self::Timer>,
        transmitter: A,
        frame: &[u8],
    );

    /// A timer armed earlier fired
    fn on_timer(
        &mut self,
        ctx: &mut dyn NodeContext<A, Self::Timer>,
        handle: TimerHandle,
        timer: Self::Timer,
    );

    /// A unicast to `next_hop` could not be delivered
    fn on_send_failure(
        &mut self,
        ctx: &mut dyn NodeContext<A, Self::Timer>,
        next_hop: A,
        frame: &[u8],
    );
}

impl<A: NodeAddress> RoutingProtocol<A> for AodvTrustRouter<A> {
    type Config = AodvConfig;
    type Timer = RouterTimer<A>;

    fn protocol_name(&self) -> &'static str {
        if self.trust().is_enabled() {
            "trust-aodv"
        } else {
            "aodv"
        }
    }

    fn configure(&mut self, config: AodvConfig) -> Result<(), ConfigError> {
        AodvTrustRouter::configure(self, config)
    }

    fn assign_streams(&mut self, first_stream: u64) -> u64 {
        AodvTrustRouter::assign_streams(self, first_stream)
    }

    fn start(&mut self, ctx: &mut dyn NodeContext<A, RouterTimer<A>>) {
        AodvTrustRouter::start(self, ctx)
    }

    fn send_data(
        &mut self,
        ctx: &mut dyn NodeContext<A, RouterTimer<A>>,
        destination: A,
        payload: Vec<u8>,
    ) -> RoutingResult<PacketId<A>> {
        AodvTrustRouter::send_data(self, ctx, destination, payload)
    }

    fn on_receive(&mut self, ctx: &mut dyn NodeContext<A, RouterTimer<A>>, from: A, frame: &[u8]) {
        AodvTrustRouter::on_receive(self, ctx, from, frame)
    }

    fn on_overheard(
        &mut self,
        ctx: &mut dyn NodeContext<A, RouterTimer<A>>,
        transmitter: A,
        frame: &[u8],
    ) {
        AodvTrustRouter::on_overheard(self, ctx, transmitter, frame)
    }

    fn on_timer(
        &mut self,
        ctx: &mut dyn NodeContext<A, RouterTimer<A>>,
        handle: TimerHandle,
        timer: RouterTimer<A>,
    ) {
        AodvTrustRouter::on_timer(self, ctx, handle, timer)
    }

    fn on_send_failure(
        &mut self,
        ctx: &mut dyn NodeContext<A, RouterTimer<A>>,
        next_hop: A,
        frame: &[u8],
    ) {
        AodvTrustRouter::on_send_failure(self, ctx, next_hop, frame)
    }
}

/// Creates identically configured routers
#[derive(Debug, Clone, Default)]
pub struct AodvTrustHelper {
    config: AodvConfig,
}

impl AodvTrustHelper {
    /// Helper with the default (trust enabled) configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration handed to every router created from now on
    pub fn set(&mut self, config: AodvConfig) -> Result<(), ConfigError> {
        let warnings = config.validate();
        if !warnings.is_empty() {
            return Err(ConfigError::Invalid(warnings));
        }
        self.config = config;
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> &AodvConfig {
        &self.config
    }

    /// Create a router for `address`
    pub fn create<A: NodeAddress>(&self, address: A) -> AodvTrustRouter<A> {
        AodvTrustRouter::new(address, self.config.clone())
    }

    /// Give each instance its own random streams, starting at `first_stream`
    ///
    /// Returns the number of streams used in total.
    pub fn assign_streams<'a, A, P, I>(&self, nodes: I, first_stream: u64) -> u64
    where
        A: NodeAddress,
        P: RoutingProtocol<A> + ?Sized + 'a,
        I: IntoIterator<Item = &'a mut P>,
    {
        let mut stream = first_stream;
        for node in nodes {
            stream += node.assign_streams(stream);
        }
        stream - first_stream
    }
}
