//! Canonical network prefixes
//!
//! A [`NetworkPrefix`] is an address family, a base address held as a
//! fixed-width integer, and a prefix length. The base address always has
//! every bit past the prefix length cleared, so two prefixes are equal
//! exactly when their canonical forms are.
//!
//! ```
//! use ipgeo::prefix::{parse_input, NetworkPrefix, QueryInput};
//!
//! let p: NetworkPrefix = "10.1.2.3/16".parse()?;
//! assert_eq!(p.to_string(), "10.1.0.0/16");
//!
//! assert!(matches!(parse_input("10.1.2.3")?, QueryInput::Host(_)));
//! assert!(matches!(parse_input("10.1.0.0/16")?, QueryInput::Network(_)));
//! # Ok::<(), ipgeo::GeoError>(())
//! ```

use crate::error::GeoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressFamily {
    /// IPv4 (32-bit)
    V4,
    /// IPv6 (128-bit)
    V6,
}

impl AddressFamily {
    /// Number of address bits for this family
    pub const fn width(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }

    /// Family of an address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

/// Canonical network prefix (address family, zero-padded base, length)
///
/// Field order matters: the derived ordering sorts by family, then base
/// address, then prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkPrefix {
    family: AddressFamily,
    bits: u128,
    len: u8,
}

impl NetworkPrefix {
    /// Canonicalize an address and mask length into a prefix
    ///
    /// Bits beyond `len` are cleared. Fails with [`GeoError::InvalidPrefix`]
    /// when `len` exceeds the width of the address family.
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, GeoError> {
        let family = AddressFamily::of(&addr);
        if len > family.width() {
            return Err(GeoError::InvalidPrefix(format!(
                "prefix length {} exceeds {} for {}",
                len,
                family.width(),
                addr
            )));
        }
        let bits = addr_to_bits(addr);
        Ok(Self {
            family,
            bits: bits & mask(family, len),
            len,
        })
    }

    /// Host prefix covering exactly one address (/32 or /128)
    pub fn host(addr: IpAddr) -> Self {
        let family = AddressFamily::of(&addr);
        Self {
            family,
            bits: addr_to_bits(addr),
            len: family.width(),
        }
    }

    /// Address family
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Prefix length
    pub fn len(&self) -> u8 {
        self.len
    }

    /// True for the zero-length (default route) prefix
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address as an integer in the family's natural width
    pub fn bits(&self) -> u128 {
        self.bits
    }

    /// Base address
    pub fn network(&self) -> IpAddr {
        bits_to_addr(self.family, self.bits)
    }

    /// Whether `addr` falls inside this prefix
    pub fn contains(&self, addr: IpAddr) -> bool {
        AddressFamily::of(&addr) == self.family
            && addr_to_bits(addr) & mask(self.family, self.len) == self.bits
    }

    /// True when the length fits the family and no host bits are set
    pub(crate) fn is_canonical(&self) -> bool {
        NetworkPrefix::new(self.network(), self.len).is_ok_and(|p| p == *self)
    }

    /// Bit of the base address at `depth` (0 = most significant)
    pub fn bit(&self, depth: u8) -> usize {
        address_bit(self.family, self.bits, depth)
    }
}

impl fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.len)
    }
}

impl FromStr for NetworkPrefix {
    type Err = GeoError;

    /// Parse CIDR notation, or a bare address as a host prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_input(s)? {
            QueryInput::Host(addr) => Ok(NetworkPrefix::host(addr)),
            QueryInput::Network(prefix) => Ok(prefix),
        }
    }
}

/// A parsed query: either a host address or a declared network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryInput {
    /// Bare address; resolved by longest-prefix match
    Host(IpAddr),
    /// CIDR notation; resolved by exact prefix match
    Network(NetworkPrefix),
}

/// Parse a bare address or CIDR notation
///
/// Surrounding whitespace is ignored. CIDR text with host bits set
/// (`10.0.0.5/24`) is accepted and canonicalized.
pub fn parse_input(text: &str) -> Result<QueryInput, GeoError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GeoError::InvalidAddress("empty input".to_string()));
    }

    if let Some((addr_str, len_str)) = text.split_once('/') {
        let addr = addr_str
            .parse::<IpAddr>()
            .map_err(|_| GeoError::InvalidAddress(text.to_string()))?;
        // u8::from_str tolerates a leading '+', CIDR notation does not
        if len_str.is_empty() || !len_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GeoError::InvalidPrefix(text.to_string()));
        }
        let len = len_str
            .parse::<u8>()
            .map_err(|_| GeoError::InvalidPrefix(text.to_string()))?;
        return NetworkPrefix::new(addr, len).map(QueryInput::Network);
    }

    text.parse::<IpAddr>()
        .map(QueryInput::Host)
        .map_err(|_| GeoError::InvalidAddress(text.to_string()))
}

/// Address as an integer in the family's natural width
pub(crate) fn addr_to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn bits_to_addr(family: AddressFamily, bits: u128) -> IpAddr {
    match family {
        AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(bits as u32)),
        AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(bits)),
    }
}

/// Bit of an address integer at `depth` counting from the most significant bit
pub(crate) fn address_bit(family: AddressFamily, bits: u128, depth: u8) -> usize {
    let shift = (family.width() - 1 - depth) as u32;
    ((bits >> shift) & 1) as usize
}

fn mask(family: AddressFamily, len: u8) -> u128 {
    if len == 0 {
        return 0;
    }
    let width = family.width() as u32;
    let all = if width == 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    // len >= 1, so host_bits <= 127 and the shift cannot overflow
    let host_bits = width - len as u32;
    let host_mask = if host_bits == 0 {
        0
    } else {
        (1u128 << host_bits) - 1
    };
    all & !host_mask
}
