//! Neighbor trust model
//!
//! Every directly reachable neighbor carries a score in
//! `[min_score, max_score]`. Observations move it:
//!
//! - **POSITIVE**: a handed-over packet was overheard being forwarded, a
//!   sound reply arrived through the neighbor, or its sequence number
//!   advanced plausibly
//! - **NEGATIVE**: a forward was not overheard in time, a sequence number
//!   went backwards or jumped implausibly, or the neighbor sent malformed
//!   traffic
//!
//! Penalties are larger than rewards, so a neighbor that drops one packet
//! in five still sinks. Unobserved scores drift back toward neutral, which
//! lets a blacklisted neighbor eventually be re-probed.
//!
//! The trust state (TRUSTED / SUSPECT / BLACKLISTED) is derived from the
//! score on every query and never stored.
//!
//! [`TrustEngine::assess`] is the single place that consults the
//! `enable_trust` switch. With trust disabled every neighbor is assessed
//! TRUSTED at the constant maximum score, so admission always succeeds and
//! no tie-break ever prefers one neighbor over another.

use std::collections::BTreeMap;

use aodv_core::{NodeAddress, Timestamp, TrustState};
use tracing::debug;

use crate::config::TrustConfig;

/// Polarity of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Positive,
    Negative,
}

/// What was observed about a neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationCause {
    /// Handed-over packet overheard being forwarded
    ForwardConfirmed,
    /// Handed-over packet not forwarded before the deadline
    ForwardMissed,
    /// Well-formed reply received through the neighbor
    ValidReply,
    /// Sequence number advanced
    SequenceProgress,
    /// Sequence number went backwards
    SequenceRegression,
    /// Sequence number jumped further than believable
    ImplausibleSequence,
    /// Undecodable or self-contradictory message
    Malformed,
}

impl ObservationCause {
    /// Whether this cause rewards or penalizes the neighbor
    pub fn polarity(self) -> Observation {
        match self {
            Self::ForwardConfirmed | Self::ValidReply | Self::SequenceProgress => {
                Observation::Positive
            }
            Self::ForwardMissed
            | Self::SequenceRegression
            | Self::ImplausibleSequence
            | Self::Malformed => Observation::Negative,
        }
    }
}

/// Trust record for one neighbor
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborTrust {
    /// Current score
    pub score: f64,
    /// POSITIVE observations so far
    pub positive: u32,
    /// NEGATIVE observations so far
    pub negative: u32,
    /// Last observation or creation instant
    pub last_update: Timestamp,
}

impl NeighborTrust {
    fn new(config: &TrustConfig, now: Timestamp) -> Self {
        Self {
            score: config.neutral_score,
            positive: 0,
            negative: 0,
            last_update: now,
        }
    }

    /// State implied by the score
    pub fn state(&self, config: &TrustConfig) -> TrustState {
        classify(self.score, config)
    }
}

fn classify(score: f64, config: &TrustConfig) -> TrustState {
    if score < config.blacklist_threshold {
        TrustState::Blacklisted
    } else if score > config.trusted_threshold {
        TrustState::Trusted
    } else {
        TrustState::Suspect
    }
}

/// Per-neighbor trust scores
#[derive(Debug, Clone)]
pub struct TrustTable<A: NodeAddress> {
    neighbors: BTreeMap<A, NeighborTrust>,
    config: TrustConfig,
}

impl<A: NodeAddress> TrustTable<A> {
    /// Create an empty table
    pub fn new(config: TrustConfig) -> Self {
        Self {
            neighbors: BTreeMap::new(),
            config,
        }
    }

    /// Model parameters
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Record first contact with a neighbor; existing records are untouched
    pub fn touch(&mut self, neighbor: A, now: Timestamp) -> &NeighborTrust {
        let config = &self.config;
        self.neighbors
            .entry(neighbor)
            .or_insert_with(|| NeighborTrust::new(config, now))
    }

    /// Apply an observation, clamping the score to its bounds
    pub fn record(&mut self, neighbor: A, observation: Observation, now: Timestamp) -> f64 {
        let config = &self.config;
        let entry = self
            .neighbors
            .entry(neighbor)
            .or_insert_with(|| NeighborTrust::new(config, now));

        match observation {
            Observation::Positive => {
                entry.score += config.positive_increment;
                entry.positive = entry.positive.saturating_add(1);
            }
            Observation::Negative => {
                entry.score -= config.negative_decrement;
                entry.negative = entry.negative.saturating_add(1);
            }
        }
        entry.score = entry.score.clamp(config.min_score, config.max_score);
        entry.last_update = now;
        entry.score
    }

    /// Drift quiet neighbors toward neutral by one step
    ///
    /// Only neighbors without an observation for `decay_interval` move, and
    /// never past neutral. Returns the neighbors whose score changed.
    pub fn decay(&mut self, now: Timestamp) -> Vec<A> {
        let config = &self.config;
        let mut moved = Vec::new();
        for (neighbor, entry) in self.neighbors.iter_mut() {
            if now.saturating_since(entry.last_update) < config.decay_interval {
                continue;
            }
            let neutral = config.neutral_score;
            let next = if entry.score < neutral {
                (entry.score + config.decay_step).min(neutral)
            } else {
                (entry.score - config.decay_step).max(neutral)
            };
            if next != entry.score {
                entry.score = next;
                moved.push(*neighbor);
            }
        }
        moved
    }

    /// Record for a neighbor
    pub fn get(&self, neighbor: &A) -> Option<&NeighborTrust> {
        self.neighbors.get(neighbor)
    }

    /// Raw score; neutral for unknown neighbors
    pub fn score(&self, neighbor: &A) -> f64 {
        self.neighbors
            .get(neighbor)
            .map(|e| e.score)
            .unwrap_or(self.config.neutral_score)
    }

    /// Raw state derived from the score
    pub fn state(&self, neighbor: &A) -> TrustState {
        classify(self.score(neighbor), &self.config)
    }

    /// Iterate over all records in address order
    pub fn iter(&self) -> impl Iterator<Item = (&A, &NeighborTrust)> {
        self.neighbors.iter()
    }

    /// Get the number of known neighbors
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Check if no neighbor is known
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Trust view of a neighbor used for routing decisions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub state: TrustState,
    pub score: f64,
}

/// A neighbor crossing a state boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustTransition<A: NodeAddress> {
    pub neighbor: A,
    pub from: TrustState,
    pub to: TrustState,
    pub score: f64,
}

/// Trust table plus the enable switch
#[derive(Debug, Clone)]
pub struct TrustEngine<A: NodeAddress> {
    table: TrustTable<A>,
    enabled: bool,
}

impl<A: NodeAddress> TrustEngine<A> {
    /// Create an engine
    pub fn new(config: TrustConfig, enabled: bool) -> Self {
        Self {
            table: TrustTable::new(config),
            enabled,
        }
    }

    /// Whether assessments reflect observed behavior
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Underlying table (raw scores are kept even when disabled)
    pub fn table(&self) -> &TrustTable<A> {
        &self.table
    }

    /// Replace the model parameters, keeping observed neighbors
    pub fn reconfigure(&mut self, config: TrustConfig, enabled: bool) {
        self.table.config = config;
        self.enabled = enabled;
    }

    /// How routing decisions should see a neighbor
    pub fn assess(&self, neighbor: &A) -> Assessment {
        if !self.enabled {
            return Assessment {
                state: TrustState::Trusted,
                score: self.table.config.max_score,
            };
        }
        let score = self.table.score(neighbor);
        Assessment {
            state: classify(score, &self.table.config),
            score,
        }
    }

    /// Whether a neighbor may take part in discovery and forwarding
    pub fn admits(&self, neighbor: &A) -> bool {
        self.assess(neighbor).state != TrustState::Blacklisted
    }

    /// Whether `candidate` should replace `incumbent` as next hop on a tie
    ///
    /// Strictly higher score wins; with equal scores the higher path trust
    /// does. Equal on both keeps the incumbent.
    pub fn prefers(
        &self,
        candidate: &A,
        candidate_path: f64,
        incumbent: &A,
        incumbent_path: f64,
    ) -> bool {
        let c = self.assess(candidate).score;
        let i = self.assess(incumbent).score;
        c > i || (c == i && self.enabled && candidate_path > incumbent_path)
    }

    /// Fold a hop into an accumulated path trust (weakest link)
    pub fn combine_path(&self, accumulated: f64, neighbor: &A) -> f64 {
        accumulated.min(self.assess(neighbor).score)
    }

    /// Path trust of a path that has not accumulated any hop yet
    pub fn initial_path_trust(&self) -> f64 {
        self.table.config.max_score
    }

    /// Note first contact with a neighbor
    pub fn touch(&mut self, neighbor: A, now: Timestamp) {
        self.table.touch(neighbor, now);
    }

    /// Record an observation
    ///
    /// Returns a transition when the neighbor's assessed state changed.
    pub fn observe(
        &mut self,
        neighbor: A,
        cause: ObservationCause,
        now: Timestamp,
    ) -> Option<TrustTransition<A>> {
        let before = self.assess(&neighbor).state;
        let score = self.table.record(neighbor, cause.polarity(), now);
        debug!(
            neighbor = %neighbor,
            ?cause,
            score,
            "trust observation"
        );
        self.transition(neighbor, before)
    }

    /// Apply decay; returns the state changes it caused
    pub fn decay(&mut self, now: Timestamp) -> Vec<TrustTransition<A>> {
        let before: Vec<(A, TrustState)> = self
            .table
            .iter()
            .map(|(n, _)| (*n, self.assess(n).state))
            .collect();
        let moved = self.table.decay(now);
        before
            .into_iter()
            .filter(|(n, _)| moved.contains(n))
            .filter_map(|(n, state)| self.transition(n, state))
            .collect()
    }

    fn transition(&self, neighbor: A, before: TrustState) -> Option<TrustTransition<A>> {
        let after = self.assess(&neighbor);
        (after.state != before).then_some(TrustTransition {
            neighbor,
            from: before,
            to: after.state,
            score: after.score,
        })
    }
}
