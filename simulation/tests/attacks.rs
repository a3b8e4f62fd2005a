//! End-to-end runs of the simulator with honest and malicious nodes

use std::time::Duration;

use aodv_core::{Ipv4Address, Timestamp};
use aodv_simulation::{
    DynRouter, NodeBehavior, Position, ScenarioConfig, SimConfig, SimNode, Simulator, Topology,
};
use aodv_trust::{AodvConfig, AodvTrustHelper};

fn addr(n: u8) -> Ipv4Address {
    Ipv4Address::new(10, 1, 1, n)
}

const RANGE: f64 = 38.0;

/// Nodes 1..=n at `positions`, with the given behaviors, CBR from the first
/// to the last node every 500 ms from t=2 s
fn simulator(
    positions: Vec<Position>,
    behaviors: &[NodeBehavior],
    use_trust: bool,
    seconds: u64,
) -> Simulator {
    aodv_logging::init_testing();
    let mut helper = AodvTrustHelper::new();
    helper.set(AodvConfig::default().with_trust(use_trust)).unwrap();

    let count = positions.len();
    let mut nodes: Vec<SimNode> = (0..count)
        .map(|i| {
            let address = addr(i as u8 + 1);
            let router: Box<DynRouter> = Box::new(helper.create(address));
            SimNode::new(address, router, behaviors[i])
        })
        .collect();
    helper
        .assign_streams::<Ipv4Address, DynRouter, _>(nodes.iter_mut().map(SimNode::router_mut), 0);

    let stop_at = Timestamp::from_secs(seconds);
    let mut sim = Simulator::new(
        SimConfig {
            stop_at,
            ..SimConfig::default()
        },
        Topology::fixed(positions, RANGE),
        nodes,
    );
    sim.add_echo_server(count - 1, Timestamp::from_secs(1));
    let server = addr(count as u8);
    let mut at = Timestamp::from_secs(2);
    while at < stop_at {
        sim.schedule_send(at, 0, server, 512);
        at += Duration::from_millis(500);
    }
    sim
}

/// Client and server joined by an honest and a malicious relay
///
/// ```text
///        A (2)
///      /       \
///  C (1)        S (4)
///      \       /
///        B (3)
/// ```
fn diamond() -> Vec<Position> {
    vec![
        Position::new(0.0, 0.0),
        Position::new(30.0, 20.0),
        Position::new(30.0, -20.0),
        Position::new(60.0, 0.0),
    ]
}

#[test]
fn test_static_chain_delivers() {
    let positions = (0..5).map(|i| Position::new(30.0 * f64::from(i), 0.0)).collect();
    let mut sim = simulator(positions, &[NodeBehavior::Honest; 5], true, 12);
    let stats = sim.run().clone();

    let flow = stats.flow(addr(1), addr(5));
    assert_eq!(flow.tx_packets, 20);
    assert!(flow.pdr() >= 90.0, "pdr {}", flow.pdr());
    assert_eq!(flow.mean_hops(), Some(4.0));
    // Echoes come back over the reverse path
    assert!(stats.flow(addr(5), addr(1)).rx_packets >= 18);
    assert_eq!(stats.malicious_drops, 0);
    assert_eq!(stats.blacklistings, 0);
}

#[test]
fn test_blackhole_defeats_plain_aodv() {
    let behaviors = [
        NodeBehavior::Honest,
        NodeBehavior::Honest,
        NodeBehavior::Blackhole,
        NodeBehavior::Honest,
    ];

    let mut plain = simulator(diamond(), &behaviors, false, 15);
    let plain_stats = plain.run().clone();
    let mut trusted = simulator(diamond(), &behaviors, true, 15);
    let trusted_stats = trusted.run().clone();

    let plain_flow = plain_stats.flow(addr(1), addr(4));
    let trusted_flow = trusted_stats.flow(addr(1), addr(4));
    assert_eq!(plain_flow.tx_packets, trusted_flow.tx_packets);
    assert!(plain_stats.forged_replies > 0);
    assert!(plain_stats.malicious_drops > 0);

    assert!(
        trusted_flow.rx_packets > plain_flow.rx_packets,
        "trusted {} vs plain {}",
        trusted_flow.rx_packets,
        plain_flow.rx_packets
    );
    assert!(trusted_stats.attackers_blacklisted > 0);
    assert_eq!(plain_stats.blacklistings, 0);
}

#[test]
fn test_default_scenario_runs_deterministically() {
    let config = ScenarioConfig {
        total_time: Duration::from_secs(8),
        ..ScenarioConfig::default()
    };
    let first = aodv_simulation::run(&config).unwrap();
    let second = aodv_simulation::run(&config).unwrap();

    let flow = first.client_flow();
    // Packets at 2.0, 2.5, ... 7.5 s
    assert_eq!(flow.tx_packets, 12);
    assert_eq!(flow, second.client_flow());
    assert_eq!(first.stats.control_sent, second.stats.control_sent);
    assert_eq!(first.attackers, vec![addr(9), addr(17)]);

    let report = first.to_string();
    assert!(report.contains("Src -> Dst : 10.1.1.1 -> 10.1.1.25"));
}
