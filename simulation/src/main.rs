//! Trust-AODV MANET simulation
//!
//! Runs the grid / random waypoint scenario once and prints the flow report
//! of the client.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use aodv_logging::{AodvSubscriberBuilder, ConsoleFormat, LogConfig};
use aodv_simulation::{ScenarioConfig, build, mode_banner, run};

#[derive(Parser)]
#[command(
    name = "aodv-sim",
    about = "MANET simulation of AODV with and without trust filtering",
    version
)]
struct Cli {
    /// Number of nodes
    #[arg(long)]
    nodes: Option<usize>,

    /// Enable trust filtering (`--use-trust false` for plain AODV)
    #[arg(long)]
    use_trust: Option<bool>,

    /// Simulated time in seconds
    #[arg(long)]
    total_time: Option<f64>,

    /// Number of attacker nodes
    #[arg(long)]
    malicious: Option<usize>,

    /// Make attackers grayholes dropping with this probability (default: blackholes)
    #[arg(long)]
    grayhole_drop: Option<f64>,

    /// Seed for mobility and attacker decisions
    #[arg(long)]
    seed: Option<u64>,

    /// Keep nodes at their grid positions
    #[arg(long)]
    static_topology: bool,

    /// Scenario configuration file (JSON); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines instead of human-readable text
    #[arg(long)]
    json_logs: bool,

    /// Write a debug-level JSONL trace of the run into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn scenario(&self) -> anyhow::Result<ScenarioConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => ScenarioConfig::default(),
        };
        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(use_trust) = self.use_trust {
            config.use_trust = use_trust;
        }
        if let Some(secs) = self.total_time {
            config.total_time = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid total time {secs}"))?;
        }
        if let Some(malicious) = self.malicious {
            config.malicious = malicious;
        }
        if self.grayhole_drop.is_some() {
            config.grayhole_drop = self.grayhole_drop;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.static_topology {
            config.static_topology = true;
        }
        Ok(config)
    }
}

/// Trace file stem, distinct per seed and routing mode
fn run_name(scenario: &ScenarioConfig) -> String {
    let mode = if scenario.use_trust { "trust" } else { "plain" };
    format!("aodv-sim-seed{}-{mode}", scenario.seed)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let scenario = cli.scenario()?;

    let mut log_config = LogConfig::interactive(cli.verbose);
    if cli.json_logs {
        log_config.console = ConsoleFormat::Jsonl;
    }
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_trace_file(dir, run_name(&scenario));
    }
    let _guard = AodvSubscriberBuilder::new()
        .with_config(log_config)
        .init()
        .context("installing the log subscriber")?;

    println!("{}", mode_banner(scenario.use_trust));
    if cli.verbose {
        let sim = build(&scenario)?;
        println!("Initial topology:");
        print!(
            "{}",
            sim.topology()
                .visualize(|i| ScenarioConfig::address(i).to_string())
        );
    }
    println!("Starting Simulation...");
    let outcome = run(&scenario)?;
    println!("{outcome}");

    Ok(())
}
