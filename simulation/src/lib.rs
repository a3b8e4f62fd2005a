//! # AODV Simulation
//!
//! A discrete-event MANET simulation for trust-augmented AODV.
//!
//! ## Overview
//!
//! Nodes start on a grid, wander under random waypoint mobility and talk
//! over a unit-disk radio. A client streams constant bit rate traffic to an
//! echo server across the network while attacker nodes try to swallow it:
//!
//! - **Blackholes** answer every route request with a forged fresh reply and
//!   drop all data they should relay
//! - **Grayholes** route honestly but drop relayed data with some probability
//!
//! Running the same scenario with and without trust filtering shows what
//! the trust layer buys.
//!
//! ## Architecture
//!
//! - **Topology** (`topology.rs`): positions, radio range, mobility
//! - **Behavior** (`behavior.rs`): attacker interception
//! - **Simulation** (`simulation.rs`): event queue and per-node environment
//! - **Metrics** (`metrics.rs`): per-flow delivery statistics
//! - **Scenarios** (`scenarios.rs`): the configurable MANET scenario
//!
//! ## Example
//!
//! ```rust,ignore
//! use aodv_simulation::*;
//!
//! let outcome = run(&ScenarioConfig {
//!     use_trust: true,
//!     static_topology: true,
//!     ..Default::default()
//! })?;
//! println!("{outcome}");
//! ```

pub mod behavior;
pub mod metrics;
pub mod scenarios;
pub mod simulation;
pub mod topology;

pub use behavior::{Attacker, NodeBehavior, Verdict};
pub use metrics::{FlowReport, FlowStats, SimStats};
pub use scenarios::{
    CbrConfig, ScenarioConfig, ScenarioError, ScenarioOutcome, build, mode_banner, run,
};
pub use simulation::{DynRouter, SimConfig, SimEvent, SimNode, Simulator};
pub use topology::{GridLayout, GridOrder, Mobility, Position, RandomWaypoint, Topology};
