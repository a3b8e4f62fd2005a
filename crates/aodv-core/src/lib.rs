//! # AODV Core
//!
//! Core traits, types, and errors for trust-augmented AODV routing.
//!
//! This crate provides the abstractions that let the same routing logic run
//! inside a discrete-event simulator, a unit test, or any other environment
//! that can move frames between neighbors and fire timers.
//!
//! ## Key Traits
//!
//! - [`NodeAddress`]: Abstraction over node addressing
//! - [`NodeContext`]: Send primitive, timers, clock and neighbor set
//!
//! ## Key Types
//!
//! - [`Ipv4Address`]: IPv4 node address
//! - [`Timestamp`]: Virtual time in milliseconds
//! - [`DataPacket`]: An application packet routed hop by hop
//! - [`RoutingEvent`]: Observable effects reported by a router
//! - [`MockContext`]: In-memory context for tests

pub mod error;
pub mod event;
pub mod identity;
pub mod mock_context;
pub mod packet;
pub mod time;
pub mod traits;

// Re-export main types
pub use error::*;
pub use event::*;
pub use identity::*;
pub use mock_context::*;
pub use packet::*;
pub use time::*;
pub use traits::*;
