//! Node address abstractions
//!
//! This module provides the [`NodeAddress`] trait so the routing logic can
//! run over any address type:
//!
//! - `Ipv4Address`: IPv4 node address, as assigned by the scenario harness
//! - test code is free to plug in anything hashable and serializable

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::AddressError;

/// Trait for node address abstraction
///
/// Routing tables, trust tables and wire messages are all keyed by this
/// type. Addresses are small, copied freely and totally ordered so that
/// tables can be iterated deterministically.
pub trait NodeAddress:
    Copy + Eq + Ord + Hash + Send + Sync + Debug + Display + Serialize + DeserializeOwned + 'static
{
    /// Get the address as bytes
    fn as_bytes(&self) -> Vec<u8>;

    /// Create an address from bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError>;

    /// Get a short display form (for logging)
    fn short_id(&self) -> String {
        format!("{}", self)
    }
}

/// IPv4 node address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ipv4Address(pub Ipv4Addr);

impl Ipv4Address {
    /// Create an address from its four octets
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(Ipv4Addr::new(a, b, c, d))
    }

    /// Address of the `index`-th host in a /24 network (host part `index + 1`)
    ///
    /// Returns `None` when the host part would overflow the subnet.
    pub fn host(network: Ipv4Addr, index: usize) -> Option<Self> {
        let host = u8::try_from(index + 1).ok().filter(|h| *h < 255)?;
        let [a, b, c, _] = network.octets();
        Some(Self::new(a, b, c, host))
    }

    /// Get the underlying std address
    pub fn ip(&self) -> Ipv4Addr {
        self.0
    }
}

impl Display for Ipv4Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ipv4Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Self)
            .map_err(|e| AddressError::InvalidFormat(format!("{}: {}", s, e)))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr)
    }
}

impl NodeAddress for Ipv4Address {
    fn as_bytes(&self) -> Vec<u8> {
        self.0.octets().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let octets: [u8; 4] = bytes.try_into().map_err(|_| AddressError::InvalidLength {
            expected: 4,
            actual: bytes.len(),
        })?;
        Ok(Self(Ipv4Addr::from(octets)))
    }

    fn short_id(&self) -> String {
        // Host part is enough to tell nodes apart inside one subnet
        self.0.octets()[3].to_string()
    }
}
