//! Router configuration
//!
//! Protocol timers follow the usual AODV parameter set; [`TrustConfig`]
//! holds the trust model. Every value is per instance, so a trust-enabled
//! and a plain router can run side by side in one simulation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Trust model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Score given to a neighbor on first contact, and the point decay
    /// drifts back to.
    /// Default: 0.5
    pub neutral_score: f64,

    /// Lower score bound.
    /// Default: 0.0
    pub min_score: f64,

    /// Upper score bound; also the constant score reported when trust is
    /// disabled.
    /// Default: 1.0
    pub max_score: f64,

    /// Scores strictly above this are TRUSTED.
    /// Default: 0.4 (new neighbors start trusted)
    pub trusted_threshold: f64,

    /// Scores strictly below this are BLACKLISTED.
    /// Default: 0.2
    pub blacklist_threshold: f64,

    /// Added per POSITIVE observation.
    /// Default: 0.02
    pub positive_increment: f64,

    /// Removed per NEGATIVE observation; must exceed the increment.
    /// Default: 0.1
    pub negative_decrement: f64,

    /// Drift toward neutral applied per decay round.
    /// Default: 0.01
    pub decay_step: f64,

    /// Quiet time after which a neighbor's score starts decaying.
    /// Default: 1 second
    pub decay_interval: Duration,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            neutral_score: 0.5,
            min_score: 0.0,
            max_score: 1.0,
            trusted_threshold: 0.4,
            blacklist_threshold: 0.2,
            positive_increment: 0.02,
            negative_decrement: 0.1,
            decay_step: 0.01,
            decay_interval: Duration::from_secs(1),
        }
    }
}

/// Configuration for an AODV router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AodvConfig {
    /// Whether trust assessments gate admission and tie-breaks
    pub enable_trust: bool,

    /// Trust model
    pub trust: TrustConfig,

    /// Discovery retries after the first request
    pub request_retry_limit: u32,

    /// Wait before the first retry; doubled on every further retry
    pub request_backoff_base: Duration,

    /// Lifetime granted to routes on use
    pub active_route_timeout: Duration,

    /// Lifetime a destination advertises in its own replies
    pub my_route_timeout: Duration,

    /// Grace period before an INVALID entry is purged
    pub delete_period: Duration,

    /// How long a (originator, broadcast id) pair is remembered
    pub path_discovery_time: Duration,

    /// Interval between hello broadcasts
    pub hello_interval: Duration,

    /// Hellos a neighbor may miss before its link counts as broken
    pub allowed_hello_loss: u32,

    /// Whether periodic hellos are sent
    pub enable_hello: bool,

    /// Maximum hop count of a request or reply
    pub net_diameter: u8,

    /// Upper bound of the random delay applied to re-broadcasts
    pub broadcast_jitter: Duration,

    /// Interval of the maintenance sweep
    pub sweep_interval: Duration,

    /// Time a neighbor has to forward a handed-over packet
    pub forward_confirm_timeout: Duration,

    /// Packets buffered per destination while discovery runs
    pub max_buffered_packets: usize,

    /// Re-originate discovery for our own routes after a link break
    pub local_repair: bool,

    /// Largest believable jump of a destination sequence number
    pub max_sequence_jump: u32,

    /// Initial TTL of data packets
    pub data_ttl: u8,
}

impl Default for AodvConfig {
    fn default() -> Self {
        Self {
            enable_trust: true,
            trust: TrustConfig::default(),
            request_retry_limit: 2,
            request_backoff_base: Duration::from_millis(2800),
            active_route_timeout: Duration::from_secs(3),
            my_route_timeout: Duration::from_secs(6),
            delete_period: Duration::from_secs(15),
            path_discovery_time: Duration::from_millis(5600),
            hello_interval: Duration::from_secs(1),
            allowed_hello_loss: 2,
            enable_hello: true,
            net_diameter: 35,
            broadcast_jitter: Duration::from_millis(10),
            sweep_interval: Duration::from_secs(1),
            forward_confirm_timeout: Duration::from_millis(500),
            max_buffered_packets: 64,
            local_repair: true,
            max_sequence_jump: 100,
            data_ttl: 64,
        }
    }
}

impl AodvConfig {
    /// Plain AODV: identical protocol with trust filtering switched off
    pub fn standard() -> Self {
        Self {
            enable_trust: false,
            ..Default::default()
        }
    }

    /// Trust-augmented AODV (the default)
    pub fn trusted() -> Self {
        Self::default()
    }

    /// Switch trust filtering on or off
    pub fn with_trust(mut self, enabled: bool) -> Self {
        self.enable_trust = enabled;
        self
    }

    /// Set the re-broadcast jitter bound; zero disables jitter
    pub fn with_broadcast_jitter(mut self, jitter: Duration) -> Self {
        self.broadcast_jitter = jitter;
        self
    }

    /// Silence after which a neighbor's link counts as broken
    pub fn neighbor_timeout(&self) -> Duration {
        self.hello_interval * self.allowed_hello_loss.max(1)
    }

    /// Wait before retry number `retry` (0-based), doubling each time
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        self.request_backoff_base
            .checked_mul(2u32.saturating_pow(retry.min(16)))
            .unwrap_or(Duration::MAX)
    }

    /// Check the configuration for inconsistencies
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let t = &self.trust;

        if t.min_score >= t.max_score {
            warnings.push(ConfigWarning::ScoreBoundsInverted);
        }

        if !(t.min_score..=t.max_score).contains(&t.neutral_score) {
            warnings.push(ConfigWarning::NeutralOutOfBounds);
        }

        if t.blacklist_threshold >= t.trusted_threshold {
            warnings.push(ConfigWarning::ThresholdsOutOfOrder);
        }

        if t.negative_decrement <= t.positive_increment {
            warnings.push(ConfigWarning::PenaltyNotAsymmetric);
        }

        if t.positive_increment <= 0.0 || t.decay_step < 0.0 {
            warnings.push(ConfigWarning::NonPositiveIncrement);
        }

        if self.hello_interval.is_zero() || self.sweep_interval.is_zero() {
            warnings.push(ConfigWarning::ZeroInterval);
        }

        if self.request_backoff_base.is_zero() {
            warnings.push(ConfigWarning::ZeroBackoff);
        }

        if self.max_buffered_packets == 0 {
            warnings.push(ConfigWarning::EmptyBuffer);
        }

        if self.forward_confirm_timeout >= self.active_route_timeout {
            warnings.push(ConfigWarning::ConfirmOutlivesRoute);
        }

        warnings
    }

    /// Check if the configuration is valid (no warnings)
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// min_score is not below max_score
    ScoreBoundsInverted,
    /// neutral_score lies outside [min_score, max_score]
    NeutralOutOfBounds,
    /// blacklist_threshold is not below trusted_threshold
    ThresholdsOutOfOrder,
    /// negative_decrement does not exceed positive_increment
    PenaltyNotAsymmetric,
    /// positive_increment or decay_step is not positive
    NonPositiveIncrement,
    /// hello or sweep interval is zero
    ZeroInterval,
    /// request backoff is zero
    ZeroBackoff,
    /// max_buffered_packets is zero
    EmptyBuffer,
    /// forward confirmation would outlive the routes it judges
    ConfirmOutlivesRoute,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::ScoreBoundsInverted => write!(f, "min_score must be below max_score"),
            ConfigWarning::NeutralOutOfBounds => {
                write!(f, "neutral_score lies outside the score bounds")
            }
            ConfigWarning::ThresholdsOutOfOrder => {
                write!(f, "blacklist_threshold must be below trusted_threshold")
            }
            ConfigWarning::PenaltyNotAsymmetric => {
                write!(f, "negative_decrement must exceed positive_increment")
            }
            ConfigWarning::NonPositiveIncrement => {
                write!(f, "positive_increment and decay_step must be positive")
            }
            ConfigWarning::ZeroInterval => write!(f, "hello and sweep intervals must be non-zero"),
            ConfigWarning::ZeroBackoff => write!(f, "request_backoff_base must be non-zero"),
            ConfigWarning::EmptyBuffer => write!(f, "max_buffered_packets must be non-zero"),
            ConfigWarning::ConfirmOutlivesRoute => {
                write!(f, "forward_confirm_timeout exceeds active_route_timeout")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AodvConfig::default();
        assert!(config.enable_trust);
        assert_eq!(config.request_retry_limit, 2);
        assert_eq!(config.neighbor_timeout(), Duration::from_secs(2));
        assert!(config.is_valid());
    }

    #[test]
    fn test_standard_config_disables_trust_only() {
        let standard = AodvConfig::standard();
        let trusted = AodvConfig::trusted();
        assert!(!standard.enable_trust);
        assert_eq!(standard.clone().with_trust(true), trusted);
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let config = AodvConfig::default();
        assert_eq!(config.retry_backoff(0), Duration::from_millis(2800));
        assert_eq!(config.retry_backoff(1), Duration::from_millis(5600));
        assert_eq!(config.retry_backoff(2), Duration::from_millis(11200));
    }

    #[test]
    fn test_retry_backoff_saturates() {
        let config = AodvConfig {
            request_backoff_base: Duration::from_secs(u64::MAX / 4),
            ..AodvConfig::default()
        };
        assert_eq!(config.retry_backoff(0), Duration::from_secs(u64::MAX / 4));
        assert_eq!(config.retry_backoff(3), Duration::MAX);
        assert_eq!(config.retry_backoff(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_validation_catches_symmetric_penalty() {
        let mut config = AodvConfig::default();
        config.trust.negative_decrement = config.trust.positive_increment;
        assert!(config.validate().contains(&ConfigWarning::PenaltyNotAsymmetric));
    }

    #[test]
    fn test_validation_catches_threshold_order() {
        let mut config = AodvConfig::default();
        config.trust.blacklist_threshold = 0.8;
        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::ThresholdsOutOfOrder));
        assert!(!config.is_valid());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AodvConfig =
            serde_json::from_str(r#"{ "enable_trust": false, "trust": { "decay_step": 0.05 } }"#)
                .unwrap();
        assert!(!config.enable_trust);
        assert_eq!(config.trust.decay_step, 0.05);
        assert_eq!(config.trust.neutral_score, 0.5);
        assert_eq!(config.net_diameter, 35);
    }
}
