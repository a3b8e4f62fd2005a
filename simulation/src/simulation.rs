//! Discrete-event simulation engine
//!
//! Implements the environment routers run in:
//! - A single event queue ordered by virtual time, ties broken by insertion
//! - Unit-disk radio: broadcasts reach every node in range, unicasts fail
//!   synchronously when the receiver is out of range
//! - Overhearing: every unicast is also heard by the sender's other neighbors
//! - Attackers intercepting frames before their router sees them

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};
use std::time::Duration;

use aodv_core::{
    Ipv4Address, NodeContext, RoutingEvent, SendTarget, TimerHandle, Timestamp, TransportError,
};
use aodv_logging::NodeContextGuard;
use aodv_trust::{AodvConfig, RouterTimer, RoutingProtocol, WireMessage};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, debug_span, info, trace};
use uuid::Uuid;

use crate::behavior::{Attacker, NodeBehavior, Verdict};
use crate::metrics::SimStats;
use crate::topology::Topology;

/// Timer payload of the routers under simulation
pub type Timer = RouterTimer<Ipv4Address>;

/// Any routing instance the simulator can drive
pub type DynRouter = dyn RoutingProtocol<Ipv4Address, Config = AodvConfig, Timer = Timer>;

/// Configuration for the simulation engine
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Time a frame spends on one hop
    pub link_delay: Duration,
    /// Mobility update period
    pub mobility_step: Duration,
    /// End of the run
    pub stop_at: Timestamp,
    /// Seed for attacker decisions
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            link_delay: Duration::from_millis(1),
            mobility_step: Duration::from_millis(100),
            stop_at: Timestamp::from_secs(20),
            seed: 1,
        }
    }
}

/// A node: address, router and optional attacker logic
pub struct SimNode {
    pub address: Ipv4Address,
    router: Box<DynRouter>,
    attacker: Option<Attacker>,
}

impl SimNode {
    pub fn new(address: Ipv4Address, router: Box<DynRouter>, behavior: NodeBehavior) -> Self {
        let attacker = behavior
            .is_malicious()
            .then(|| Attacker::new(address, behavior));
        Self {
            address,
            router,
            attacker,
        }
    }

    pub fn behavior(&self) -> NodeBehavior {
        self.attacker
            .as_ref()
            .map_or(NodeBehavior::Honest, Attacker::behavior)
    }

    pub fn router(&self) -> &DynRouter {
        self.router.as_ref()
    }

    pub fn router_mut(&mut self) -> &mut DynRouter {
        self.router.as_mut()
    }
}

/// Something that happens at a point in virtual time
#[derive(Debug)]
pub enum SimEvent {
    /// A frame arrives at `to`
    Deliver {
        from: usize,
        to: usize,
        frame: Vec<u8>,
        unicast: bool,
    },
    /// A unicast between two other nodes reaches `listener`
    Overhear {
        transmitter: usize,
        listener: usize,
        frame: Vec<u8>,
    },
    /// A router timer fires
    Timer {
        node: usize,
        handle: TimerHandle,
        timer: Timer,
    },
    /// The application on `node` sends a payload
    AppSend {
        node: usize,
        destination: Ipv4Address,
        bytes: usize,
    },
    /// Nodes move
    MobilityStep,
    /// End of the run
    Stop,
}

#[derive(Debug)]
struct Scheduled {
    at: Timestamp,
    seq: u64,
    event: SimEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Everything a handler asked the environment to do
#[derive(Default)]
struct Effects {
    sends: Vec<(SendTarget<Ipv4Address>, Vec<u8>)>,
    timers: Vec<(TimerHandle, Duration, Timer)>,
    events: Vec<RoutingEvent<Ipv4Address>>,
}

/// The environment as seen by one router during one handler call
struct NodeView<'a> {
    local: Ipv4Address,
    now: Timestamp,
    neighbors: Vec<Ipv4Address>,
    next_handle: &'a mut u64,
    armed: &'a mut HashSet<TimerHandle>,
    effects: Effects,
}

impl NodeContext<Ipv4Address, Timer> for NodeView<'_> {
    fn local_address(&self) -> Ipv4Address {
        self.local
    }

    fn neighbors(&self) -> Vec<Ipv4Address> {
        self.neighbors.clone()
    }

    fn now(&self) -> Timestamp {
        self.now
    }

    fn send(
        &mut self,
        target: SendTarget<Ipv4Address>,
        frame: Vec<u8>,
    ) -> Result<(), TransportError> {
        if let SendTarget::Unicast(to) = target
            && !self.neighbors.contains(&to)
        {
            return Err(TransportError::LinkUnavailable(to.to_string()));
        }
        self.effects.sends.push((target, frame));
        Ok(())
    }

    fn schedule_after(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        *self.next_handle += 1;
        let handle = TimerHandle(*self.next_handle);
        self.armed.insert(handle);
        self.effects.timers.push((handle, delay, timer));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.armed.remove(&handle);
    }

    fn emit(&mut self, event: RoutingEvent<Ipv4Address>) {
        self.effects.events.push(event);
    }
}

/// The simulation state
pub struct Simulator {
    config: SimConfig,
    topology: Topology,
    nodes: Vec<SimNode>,
    index: BTreeMap<Ipv4Address, usize>,
    attackers: BTreeSet<Ipv4Address>,
    queue: BinaryHeap<Reverse<Scheduled>>,
    now: Timestamp,
    next_seq: u64,
    next_handle: u64,
    armed: HashSet<TimerHandle>,
    echo_servers: BTreeMap<usize, Timestamp>,
    rng: StdRng,
    run_id: Uuid,
    started: bool,
    stopped: bool,
    /// Statistics
    pub stats: SimStats,
}

impl Simulator {
    /// Create a simulation; node `i` sits at topology position `i`
    pub fn new(config: SimConfig, topology: Topology, nodes: Vec<SimNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.address, i))
            .collect();
        let attackers = nodes
            .iter()
            .filter(|n| n.behavior().is_malicious())
            .map(|n| n.address)
            .collect();
        let rng = StdRng::seed_from_u64(config.seed);
        let mut sim = Self {
            config,
            topology,
            nodes,
            index,
            attackers,
            queue: BinaryHeap::new(),
            now: Timestamp::ZERO,
            next_seq: 0,
            next_handle: 0,
            armed: HashSet::new(),
            echo_servers: BTreeMap::new(),
            rng,
            run_id: Uuid::new_v4(),
            started: false,
            stopped: false,
            stats: SimStats::default(),
        };
        sim.schedule(sim.config.stop_at, SimEvent::Stop);
        sim
    }

    /// Current virtual time
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Identifier tagging this run's log lines
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Address of node `i`
    pub fn address(&self, node: usize) -> Option<Ipv4Address> {
        self.nodes.get(node).map(|n| n.address)
    }

    /// Whether the stop event has been processed
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Have `node` send `bytes` to `destination` at `at`
    pub fn schedule_send(&mut self, at: Timestamp, node: usize, destination: Ipv4Address, bytes: usize) {
        self.schedule(
            at,
            SimEvent::AppSend {
                node,
                destination,
                bytes,
            },
        );
    }

    /// Echo every packet delivered to `node` from `from` on
    pub fn add_echo_server(&mut self, node: usize, from: Timestamp) {
        self.echo_servers.insert(node, from);
    }

    /// Start every router and the mobility clock
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(
            run_id = %self.run_id,
            nodes = self.nodes.len(),
            attackers = self.attackers.len(),
            mobile = self.topology.is_mobile(),
            "simulation starting"
        );
        for node in 0..self.nodes.len() {
            self.dispatch(node, |router, ctx| router.start(ctx));
        }
        if self.topology.is_mobile() {
            self.schedule(self.now + self.config.mobility_step, SimEvent::MobilityStep);
        }
    }

    /// Process the next event; returns false once the run is over
    pub fn step(&mut self) -> bool {
        if !self.started {
            self.start();
        }
        if self.stopped {
            return false;
        }
        let Some(Reverse(next)) = self.queue.pop() else {
            self.stopped = true;
            return false;
        };
        self.now = next.at;
        self.handle(next.event);
        !self.stopped
    }

    /// Run to the stop time
    pub fn run(&mut self) -> &SimStats {
        while self.step() {}
        info!(
            run_id = %self.run_id,
            at = %self.now,
            control = self.stats.control_total(),
            malicious_drops = self.stats.malicious_drops,
            "simulation finished"
        );
        &self.stats
    }

    /// Run every event up to and including `until`
    pub fn run_until(&mut self, until: Timestamp) {
        if !self.started {
            self.start();
        }
        while !self.stopped
            && self
                .queue
                .peek()
                .is_some_and(|Reverse(next)| next.at <= until)
        {
            self.step();
        }
    }

    fn schedule(&mut self, at: Timestamp, event: SimEvent) {
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled {
            at,
            seq: self.next_seq,
            event,
        }));
    }

    fn handle(&mut self, event: SimEvent) {
        match event {
            SimEvent::Deliver {
                from,
                to,
                frame,
                unicast,
            } => self.deliver(from, to, frame, unicast),
            SimEvent::Overhear {
                transmitter,
                listener,
                frame,
            } => {
                if self.topology.in_range(transmitter, listener) {
                    let transmitter = self.nodes[transmitter].address;
                    self.dispatch(listener, |router, ctx| {
                        router.on_overheard(ctx, transmitter, &frame)
                    });
                }
            }
            SimEvent::Timer {
                node,
                handle,
                timer,
            } => {
                if self.armed.remove(&handle) {
                    self.dispatch(node, |router, ctx| router.on_timer(ctx, handle, timer));
                }
            }
            SimEvent::AppSend {
                node,
                destination,
                bytes,
            } => {
                let result = self.dispatch(node, |router, ctx| {
                    router.send_data(ctx, destination, vec![0; bytes])
                });
                if let Err(e) = result {
                    debug!(node = %self.nodes[node].address, dest = %destination, error = %e, "application send refused");
                }
            }
            SimEvent::MobilityStep => {
                self.topology.step(self.config.mobility_step);
                let next = self.now + self.config.mobility_step;
                if next < self.config.stop_at {
                    self.schedule(next, SimEvent::MobilityStep);
                }
            }
            SimEvent::Stop => {
                self.stopped = true;
            }
        }
    }

    fn deliver(&mut self, from: usize, to: usize, frame: Vec<u8>, unicast: bool) {
        let sender = self.nodes[from].address;
        if !self.topology.in_range(from, to) {
            if unicast {
                // Link layer feedback: the receiver moved away in flight
                self.stats.link_failures += 1;
                let receiver = self.nodes[to].address;
                trace!(node = %sender, neighbor = %receiver, "unicast lost in flight");
                self.dispatch(from, |router, ctx| {
                    router.on_send_failure(ctx, receiver, &frame)
                });
            }
            return;
        }

        if let Some(attacker) = self.nodes[to].attacker.as_mut()
            && let Ok(message) = WireMessage::<Ipv4Address>::decode(&frame)
        {
            match attacker.inspect(&message, &mut self.rng) {
                Verdict::Deliver => {}
                Verdict::Ignore => return,
                Verdict::Drop => {
                    self.stats.malicious_drops += 1;
                    trace!(node = %self.nodes[to].address, neighbor = %sender, "transit data swallowed");
                    return;
                }
                Verdict::Forge(reply) => {
                    let attacker_address = self.nodes[to].address;
                    debug!(node = %attacker_address, dest = %reply.destination, seq = reply.dest_seq, "forging route reply");
                    match WireMessage::Reply(reply).encode() {
                        Ok(forged) => {
                            self.stats.forged_replies += 1;
                            self.transmit(to, SendTarget::Unicast(sender), forged);
                        }
                        Err(e) => debug!(error = %e, "failed to encode forged reply"),
                    }
                    return;
                }
            }
        }

        self.dispatch(to, |router, ctx| router.on_receive(ctx, sender, &frame));
    }

    /// Put a frame on the air
    fn transmit(&mut self, from: usize, target: SendTarget<Ipv4Address>, frame: Vec<u8>) {
        let arrival = self.now + self.config.link_delay;
        let neighbors = self.topology.neighbors_of(from);
        match target {
            SendTarget::Broadcast => {
                for to in neighbors {
                    self.schedule(
                        arrival,
                        SimEvent::Deliver {
                            from,
                            to,
                            frame: frame.clone(),
                            unicast: false,
                        },
                    );
                }
            }
            SendTarget::Unicast(address) => {
                let Some(&to) = self.index.get(&address) else {
                    return;
                };
                for listener in neighbors.into_iter().filter(|n| *n != to) {
                    self.schedule(
                        arrival,
                        SimEvent::Overhear {
                            transmitter: from,
                            listener,
                            frame: frame.clone(),
                        },
                    );
                }
                self.schedule(
                    arrival,
                    SimEvent::Deliver {
                        from,
                        to,
                        frame,
                        unicast: true,
                    },
                );
            }
        }
    }

    /// Run a handler of `node`'s router and carry out what it asked for
    fn dispatch<R>(
        &mut self,
        node: usize,
        handler: impl FnOnce(&mut DynRouter, &mut NodeView<'_>) -> R,
    ) -> R {
        let address = self.nodes[node].address;
        let _context = NodeContextGuard::with_run_id(&address, self.run_id);
        let span = debug_span!("node", node = %address);
        let _enter = span.enter();

        let neighbors = self
            .topology
            .neighbors_of(node)
            .into_iter()
            .map(|i| self.nodes[i].address)
            .collect();
        let mut view = NodeView {
            local: address,
            now: self.now,
            neighbors,
            next_handle: &mut self.next_handle,
            armed: &mut self.armed,
            effects: Effects::default(),
        };
        let result = handler(self.nodes[node].router.as_mut(), &mut view);
        let effects = view.effects;
        self.apply(node, effects);
        result
    }

    fn apply(&mut self, node: usize, effects: Effects) {
        let address = self.nodes[node].address;
        for (handle, delay, timer) in effects.timers {
            self.schedule(
                self.now + delay,
                SimEvent::Timer {
                    node,
                    handle,
                    timer,
                },
            );
        }

        for event in &effects.events {
            let attackers = &self.attackers;
            self.stats
                .record(address, self.now, event, |a| attackers.contains(a));

            if let RoutingEvent::DataDelivered {
                packet_id, bytes, ..
            } = event
                && self
                    .echo_servers
                    .get(&node)
                    .is_some_and(|from| self.now >= *from)
            {
                self.schedule(
                    self.now,
                    SimEvent::AppSend {
                        node,
                        destination: packet_id.source,
                        bytes: *bytes,
                    },
                );
            }
        }

        for (target, frame) in effects.sends {
            self.transmit(node, target, frame);
        }
    }
}
