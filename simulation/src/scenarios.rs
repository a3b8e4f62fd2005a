//! The MANET scenario: grid start, random waypoint, CBR echo traffic
//!
//! A client on the first node sends fixed-size packets at a constant rate
//! to an echo server on the last node while a few nodes in between run
//! attacker behaviors. The same scenario runs with and without trust
//! filtering.

use std::fmt;
use std::time::Duration;

use aodv_core::{Ipv4Address, Timestamp};
use aodv_trust::{AodvConfig, AodvTrustHelper, ConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::behavior::NodeBehavior;
use crate::metrics::{FlowStats, SimStats};
use crate::simulation::{DynRouter, SimConfig, SimNode, Simulator};
use crate::topology::{GridLayout, Mobility, RandomWaypoint, Topology};

/// Largest node count addressable in 10.1.1.0/24
pub const MAX_NODES: usize = 254;

/// Errors in a scenario description
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("A scenario needs at least 2 nodes, got {0}")]
    TooFewNodes(usize),

    #[error("Too many nodes for the address plan: {0} (max {max})", max = MAX_NODES)]
    TooManyNodes(usize),

    #[error("Grayhole drop probability must lie in [0, 1], got {0}")]
    InvalidDropProbability(f64),

    #[error("Invalid routing configuration: {0}")]
    Routing(#[from] ConfigError),
}

/// Constant bit rate echo traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbrConfig {
    /// When the echo server starts answering
    pub server_start: Duration,
    /// When the client sends its first packet
    pub client_start: Duration,
    /// Gap between two client packets
    pub interval: Duration,
    /// Payload size in bytes
    pub packet_size: usize,
    /// Packets the client sends at most
    pub max_packets: u32,
}

impl Default for CbrConfig {
    fn default() -> Self {
        Self {
            server_start: Duration::from_secs(1),
            client_start: Duration::from_secs(2),
            interval: Duration::from_millis(500),
            packet_size: 1024,
            max_packets: 100,
        }
    }
}

/// Full description of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub nodes: usize,
    /// Trust filtering on every honest router
    pub use_trust: bool,
    pub total_time: Duration,
    /// Number of attackers
    pub malicious: usize,
    /// `None` makes attackers blackholes, `Some(p)` grayholes dropping with probability p
    pub grayhole_drop: Option<f64>,
    pub seed: u64,
    /// Keep nodes at their grid positions
    pub static_topology: bool,
    /// Radio range in meters
    pub radio_range: f64,
    pub link_delay: Duration,
    pub mobility_step: Duration,
    pub grid: GridLayout,
    pub waypoint: RandomWaypoint,
    pub traffic: CbrConfig,
    /// Router configuration; `enable_trust` is taken from `use_trust`
    pub aodv: AodvConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            nodes: 25,
            use_trust: true,
            total_time: Duration::from_secs(20),
            malicious: 2,
            grayhole_drop: None,
            seed: 1,
            static_topology: false,
            radio_range: 40.0,
            link_delay: Duration::from_millis(1),
            mobility_step: Duration::from_millis(100),
            grid: GridLayout::default(),
            waypoint: RandomWaypoint::default(),
            traffic: CbrConfig::default(),
            aodv: AodvConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Address of node `index`: 10.1.1.(index + 1)
    pub fn address(index: usize) -> Ipv4Address {
        let host = u8::try_from(index + 1).unwrap_or(u8::MAX);
        Ipv4Address::new(10, 1, 1, host)
    }

    /// Index of the client node
    pub fn client(&self) -> usize {
        0
    }

    /// Index of the echo server node
    pub fn server(&self) -> usize {
        self.nodes.saturating_sub(1)
    }

    /// Behavior assigned to attackers
    pub fn attacker_behavior(&self) -> NodeBehavior {
        match self.grayhole_drop {
            Some(drop_probability) => NodeBehavior::Grayhole { drop_probability },
            None => NodeBehavior::Blackhole,
        }
    }

    /// Indices of the attacker nodes
    ///
    /// Attackers are spread evenly over the nodes strictly between client
    /// and server.
    pub fn malicious_indices(&self) -> Vec<usize> {
        let candidates = self.nodes.saturating_sub(2);
        let count = self.malicious.min(candidates);
        let mut picked: Vec<usize> = (1..=count)
            .map(|k| 1 + k * candidates / (count + 1))
            .collect();
        picked.dedup();
        picked
    }

    fn check(&self) -> Result<(), ScenarioError> {
        if self.nodes < 2 {
            return Err(ScenarioError::TooFewNodes(self.nodes));
        }
        if self.nodes > MAX_NODES {
            return Err(ScenarioError::TooManyNodes(self.nodes));
        }
        if let Some(p) = self.grayhole_drop
            && !(0.0..=1.0).contains(&p)
        {
            return Err(ScenarioError::InvalidDropProbability(p));
        }
        Ok(())
    }
}

/// Banner announcing the routing mode
pub fn mode_banner(use_trust: bool) -> String {
    let (mode, filtering) = if use_trust {
        ("AODV-TRUST (SECURE)      ", "ON ")
    } else {
        ("AODV STANDARD (INSECURE) ", "OFF")
    };
    format!(
        "===============================================\n\
         >>> RUNNING MODE: {mode} <<<\n\
         >>> Malicious node filtering: {filtering}           <<<\n\
         ==============================================="
    )
}

/// Build a ready-to-run simulator for `config`
pub fn build(config: &ScenarioConfig) -> Result<Simulator, ScenarioError> {
    config.check()?;

    let mut helper = AodvTrustHelper::new();
    helper.set(config.aodv.clone().with_trust(config.use_trust))?;

    let malicious = config.malicious_indices();
    let behavior = config.attacker_behavior();
    let mut nodes: Vec<SimNode> = (0..config.nodes)
        .map(|i| {
            let address = ScenarioConfig::address(i);
            let router: Box<DynRouter> = Box::new(helper.create(address));
            let role = if malicious.contains(&i) {
                behavior
            } else {
                NodeBehavior::Honest
            };
            SimNode::new(address, router, role)
        })
        .collect();
    let streams = helper
        .assign_streams::<Ipv4Address, DynRouter, _>(nodes.iter_mut().map(SimNode::router_mut), 0);

    let positions = config.grid.positions(config.nodes);
    let topology = if config.static_topology {
        Topology::fixed(positions, config.radio_range)
    } else {
        Topology::new(
            positions,
            config.radio_range,
            Mobility::RandomWaypoint(config.waypoint.clone()),
            config.seed,
        )
    };

    let stop_at = Timestamp::ZERO + config.total_time;
    let sim_config = SimConfig {
        link_delay: config.link_delay,
        mobility_step: config.mobility_step,
        stop_at,
        seed: config.seed,
    };
    let mut sim = Simulator::new(sim_config, topology, nodes);

    let client = config.client();
    let server = config.server();
    let traffic = &config.traffic;
    sim.add_echo_server(server, Timestamp::ZERO + traffic.server_start);
    let server_address = ScenarioConfig::address(server);
    let first = Timestamp::ZERO + traffic.client_start;
    for n in 0..traffic.max_packets {
        let at = first + traffic.interval * n;
        if at >= stop_at {
            break;
        }
        sim.schedule_send(at, client, server_address, traffic.packet_size);
    }

    info!(
        nodes = config.nodes,
        trust = config.use_trust,
        attackers = ?malicious.iter().map(|&i| ScenarioConfig::address(i).to_string()).collect::<Vec<_>>(),
        behavior = %behavior,
        streams,
        "scenario built"
    );
    Ok(sim)
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub stats: SimStats,
    pub client: Ipv4Address,
    pub server: Ipv4Address,
    pub attackers: Vec<Ipv4Address>,
    pub use_trust: bool,
    pub total_time: Duration,
}

impl ScenarioOutcome {
    /// The client to server flow
    pub fn client_flow(&self) -> FlowStats {
        self.stats.flow(self.client, self.server)
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stats.flow_report(self.client, self.total_time))?;
        if !self.attackers.is_empty() {
            let attackers: Vec<String> = self.attackers.iter().map(ToString::to_string).collect();
            writeln!(f, "Attackers  : {}", attackers.join(", "))?;
        }
        write!(f, "{}", self.stats)
    }
}

/// Build and run a scenario to completion
pub fn run(config: &ScenarioConfig) -> Result<ScenarioOutcome, ScenarioError> {
    let mut sim = build(config)?;
    let stats = sim.run().clone();
    Ok(ScenarioOutcome {
        stats,
        client: ScenarioConfig::address(config.client()),
        server: ScenarioConfig::address(config.server()),
        attackers: config
            .malicious_indices()
            .into_iter()
            .map(ScenarioConfig::address)
            .collect(),
        use_trust: config.use_trust,
        total_time: config.total_time,
    })
}
