//! # AODV Trust
//!
//! Trust-augmented AODV routing for mobile ad-hoc networks.
//!
//! Each node runs one [`AodvTrustRouter`]. Routes are discovered on demand
//! by flooding route requests and unicasting replies back along the reverse
//! path; link breaks are reported upstream with route errors. On top of the
//! plain protocol every router keeps a score per neighbor, built from what
//! it observes directly:
//!
//! - overheard forwards of packets it handed over (POSITIVE), or their
//!   absence within a deadline (NEGATIVE)
//! - valid replies and plausible sequence progress (POSITIVE)
//! - sequence regressions, implausible jumps and malformed control traffic
//!   (NEGATIVE)
//!
//! ## Core Components
//!
//! - [`AodvTrustRouter`]: The routing instance and event dispatcher
//! - [`RoutingTable`]: Per-destination routes with the freshness rule
//! - [`TrustEngine`]: Neighbor scores, states and the enable switch
//! - [`SequenceRegistry`]: Own sequence number and request ids
//! - [`PendingRequests`] / [`SeenRequestCache`]: Discovery bookkeeping
//! - [`AodvTrustHelper`] / [`RoutingProtocol`]: Installation and the
//!   capability interface used by environments
//!
//! ## Trust in routing decisions
//!
//! 1. **ADMIT**: requests, replies and route errors from BLACKLISTED
//!    neighbors are dropped; routes through them are torn down
//! 2. **PREFER**: equally fresh, equally long routes go to the neighbor with
//!    the strictly higher score, then the higher path trust
//! 3. **AGGREGATE**: path trust is the weakest score along the path
//!
//! With `enable_trust` off every neighbor is assessed TRUSTED with the
//! maximum score, which turns the router into plain AODV: same messages,
//! first accepted reply wins.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aodv_core::{Ipv4Address, MockContext};
//! use aodv_trust::{AodvConfig, AodvTrustHelper};
//!
//! let mut helper = AodvTrustHelper::new();
//! helper.set(AodvConfig::trusted())?;
//!
//! let mut router = helper.create(Ipv4Address::new(10, 1, 1, 1));
//! let mut ctx = MockContext::new(router.address());
//! router.start(&mut ctx);
//! router.send_data(&mut ctx, Ipv4Address::new(10, 1, 1, 9), payload)?;
//! ```

pub mod config;
mod discovery;
pub mod error;
pub mod helper;
mod maintenance;
pub mod messages;
pub mod neighbors;
pub mod pending;
pub mod router;
pub mod seen;
pub mod sequence;
pub mod table;
pub mod trust;
pub mod watchdog;

// Re-export main types
pub use config::{AodvConfig, ConfigWarning, TrustConfig};
pub use error::{ConfigError, RoutingError, RoutingResult};
pub use helper::{AodvTrustHelper, RoutingProtocol};
pub use messages::{Hello, RouteError, RouteReply, RouteRequest, WireMessage};
pub use neighbors::{NeighborLiveness, SequenceChange};
pub use pending::{PendingRequest, PendingRequests};
pub use router::{AodvTrustRouter, RouterContext, RouterTimer};
pub use seen::SeenRequestCache;
pub use sequence::SequenceRegistry;
pub use table::{RouteEntry, RouteState, RoutingTable};
pub use trust::{Assessment, ObservationCause, TrustEngine, TrustTable, TrustTransition};
pub use watchdog::ForwardWatchdog;

// Re-export core types for convenience
pub use aodv_core::{DropReason, RoutingEvent, TrustState};
