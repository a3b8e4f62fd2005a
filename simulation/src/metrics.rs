//! Delivery statistics gathered from routing events

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use aodv_core::{ControlKind, DropReason, Ipv4Address, PacketId, RoutingEvent, Timestamp, TrustState};
use serde::{Deserialize, Serialize};

/// Per-flow counters, a flow being one (source, destination) pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// Sum of hop counts of delivered packets
    pub total_hops: u64,
    /// Sum of end-to-end delays of delivered packets
    pub total_delay: Duration,
}

impl FlowStats {
    /// Packet delivery ratio in percent
    pub fn pdr(&self) -> f64 {
        if self.tx_packets == 0 {
            0.0
        } else {
            self.rx_packets as f64 * 100.0 / self.tx_packets as f64
        }
    }

    /// Received bits per second over `total_time`, in Mbps
    pub fn throughput_mbps(&self, total_time: Duration) -> f64 {
        let secs = total_time.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.rx_bytes as f64 * 8.0 / (secs * 1_000_000.0)
        }
    }

    /// Mean end-to-end delay of delivered packets
    pub fn mean_delay(&self) -> Option<Duration> {
        u32::try_from(self.rx_packets)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.total_delay / n)
    }

    /// Mean hop count of delivered packets
    pub fn mean_hops(&self) -> Option<f64> {
        (self.rx_packets > 0).then(|| self.total_hops as f64 / self.rx_packets as f64)
    }
}

/// Statistics of a whole run
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub flows: BTreeMap<(Ipv4Address, Ipv4Address), FlowStats>,
    pub drops: BTreeMap<DropReason, u64>,
    pub control_sent: BTreeMap<ControlKind, u64>,
    /// Transit data swallowed by attackers
    pub malicious_drops: u64,
    /// Replies forged by attackers
    pub forged_replies: u64,
    pub routes_established: u64,
    pub unreachable: u64,
    /// Neighbors classified as blacklisted, counted per observer
    pub blacklistings: u64,
    /// Blacklistings whose target is an attacker
    pub attackers_blacklisted: u64,
    /// Unicasts lost because the receiver moved out of range in flight
    pub link_failures: u64,
    origin_times: HashMap<PacketId<Ipv4Address>, Timestamp>,
}

impl SimStats {
    /// Account for an event emitted by the router on `node`
    pub fn record(
        &mut self,
        node: Ipv4Address,
        now: Timestamp,
        event: &RoutingEvent<Ipv4Address>,
        is_attacker: impl Fn(&Ipv4Address) -> bool,
    ) {
        match event {
            RoutingEvent::DataOriginated {
                packet_id,
                destination,
                bytes,
            } => {
                let flow = self.flows.entry((node, *destination)).or_default();
                flow.tx_packets += 1;
                flow.tx_bytes += *bytes as u64;
                self.origin_times.insert(*packet_id, now);
            }
            RoutingEvent::DataDelivered {
                packet_id,
                bytes,
                hops,
            } => {
                let flow = self.flows.entry((packet_id.source, node)).or_default();
                flow.rx_packets += 1;
                flow.rx_bytes += *bytes as u64;
                flow.total_hops += u64::from(*hops);
                if let Some(sent) = self.origin_times.remove(packet_id) {
                    flow.total_delay += now - sent;
                }
            }
            RoutingEvent::DataDropped { reason, .. } => {
                *self.drops.entry(*reason).or_default() += 1;
            }
            RoutingEvent::ControlSent { kind } => {
                *self.control_sent.entry(*kind).or_default() += 1;
            }
            RoutingEvent::RouteEstablished { .. } => self.routes_established += 1,
            RoutingEvent::DestinationUnreachable { .. } => self.unreachable += 1,
            RoutingEvent::TrustStateChanged { neighbor, to, .. } => {
                if *to == TrustState::Blacklisted {
                    self.blacklistings += 1;
                    if is_attacker(neighbor) {
                        self.attackers_blacklisted += 1;
                    }
                }
            }
            RoutingEvent::DataForwarded { .. } | RoutingEvent::RouteInvalidated { .. } => {}
        }
    }

    /// Statistics of one flow
    pub fn flow(&self, source: Ipv4Address, destination: Ipv4Address) -> FlowStats {
        self.flows
            .get(&(source, destination))
            .cloned()
            .unwrap_or_default()
    }

    /// Total control messages sent
    pub fn control_total(&self) -> u64 {
        self.control_sent.values().sum()
    }

    /// Flow-monitor style report of the flows leaving `source`
    pub fn flow_report(&self, source: Ipv4Address, total_time: Duration) -> FlowReport<'_> {
        FlowReport {
            stats: self,
            source,
            total_time,
        }
    }
}

/// Printable per-flow report
pub struct FlowReport<'a> {
    stats: &'a SimStats,
    source: Ipv4Address,
    total_time: Duration,
}

const SEPARATOR: &str = "------------------------------------------------";

impl fmt::Display for FlowReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, ((src, dst), flow)) in self.stats.flows.iter().enumerate() {
            if *src != self.source {
                continue;
            }
            writeln!(f, "{SEPARATOR}")?;
            writeln!(f, "Flow ID    : {}", id + 1)?;
            writeln!(f, "Src -> Dst : {} -> {}", src, dst)?;
            writeln!(f, "Tx Packets : {}", flow.tx_packets)?;
            writeln!(f, "Rx Packets : {}", flow.rx_packets)?;
            writeln!(f, "PDR        : {:.2} %", flow.pdr())?;
            writeln!(
                f,
                "Throughput : {:.4} Mbps",
                flow.throughput_mbps(self.total_time)
            )?;
            if let Some(delay) = flow.mean_delay() {
                writeln!(f, "Mean delay : {:.1} ms", delay.as_secs_f64() * 1000.0)?;
            }
            writeln!(f, "{SEPARATOR}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Control messages : {}", self.control_total())?;
        for (kind, count) in &self.control_sent {
            writeln!(f, "  {:<5} {}", kind.to_string(), count)?;
        }
        writeln!(f, "Routes established : {}", self.routes_established)?;
        writeln!(f, "Unreachable        : {}", self.unreachable)?;
        for (reason, count) in &self.drops {
            writeln!(f, "Dropped ({}) : {}", reason, count)?;
        }
        writeln!(f, "Dropped by attackers : {}", self.malicious_drops)?;
        writeln!(f, "Forged replies       : {}", self.forged_replies)?;
        writeln!(
            f,
            "Blacklistings        : {} ({} of attackers)",
            self.blacklistings, self.attackers_blacklisted
        )?;
        write!(f, "Link failures        : {}", self.link_failures)
    }
}
