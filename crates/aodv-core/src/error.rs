//! Error types for trust-augmented AODV

use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum AodvError {
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors related to node addresses
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Invalid address format: {0}")]
    InvalidFormat(String),

    #[error("Invalid address length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Errors related to routing decisions
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No route available to destination")]
    NoRoute,

    #[error("TTL expired for packet")]
    TtlExpired,

    #[error("Destination unreachable after {0} discovery attempts")]
    Unreachable(u32),

    #[error("Neighbor {0} is not admitted for routing")]
    NotAdmitted(String),
}

/// Errors reported by the send primitive
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Link to {0} is unavailable")]
    LinkUnavailable(String),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Transmit queue full")]
    QueueFull,
}

/// Errors in encoding or decoding wire messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl From<postcard::Error> for ProtocolError {
    fn from(err: postcard::Error) -> Self {
        ProtocolError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AodvError::Routing(RoutingError::NoRoute);
        assert_eq!(
            err.to_string(),
            "Routing error: No route available to destination"
        );

        let err = AodvError::Transport(TransportError::LinkUnavailable("10.1.1.4".into()));
        assert_eq!(
            err.to_string(),
            "Transport error: Link to 10.1.1.4 is unavailable"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: AodvError = ProtocolError::Malformed("empty error list".into()).into();
        assert!(matches!(err, AodvError::Protocol(ProtocolError::Malformed(_))));
    }
}
