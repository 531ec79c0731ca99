//! IPv6 prefixes in `addr/len` notation.
#![deny(missing_docs)]
use failure::Fail;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// An IPv6 network prefix.
///
/// Host bits are cleared when the prefix is created, so `fd00::1/64` and
/// `fd00::/64` are the same prefix.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Prefix {
    addr: Ipv6Addr,
    len: u8,
}

/// Prefix parse error.
#[derive(Debug, Fail)]
pub enum AddrParseError {
    /// Missing `/len`.
    #[fail(display = "Missing prefix length.")]
    MissingLength,
    /// Prefix length above 128.
    #[fail(display = "Prefix length {} out of range.", _0)]
    Length(u8),
    /// Ip address parse error.
    #[fail(display = "{}", _0)]
    Ip(std::net::AddrParseError),
    /// Length parse error.
    #[fail(display = "{}", _0)]
    Int(std::num::ParseIntError),
}

impl From<std::net::AddrParseError> for AddrParseError {
    fn from(err: std::net::AddrParseError) -> Self {
        Self::Ip(err)
    }
}

impl From<std::num::ParseIntError> for AddrParseError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::Int(err)
    }
}

fn mask(len: u8) -> u128 {
    match len {
        0 => 0,
        len => !0u128 << (128 - u32::from(len)),
    }
}

impl Prefix {
    /// Creates a prefix of `len` bits.
    pub fn new(addr: Ipv6Addr, len: u8) -> Result<Self, AddrParseError> {
        if len > 128 {
            return Err(AddrParseError::Length(len));
        }
        let bits = u128::from(addr) & mask(len);
        Ok(Self {
            addr: Ipv6Addr::from(bits),
            len,
        })
    }

    /// Prefix with host bits cleared.
    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    /// Number of prefix bits.
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Returns true for `::/0`.
    pub fn is_default(&self) -> bool {
        self.len == 0
    }

    /// Returns true if `addr` is inside the prefix.
    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        u128::from(*addr) & mask(self.len) == u128::from(self.addr)
    }
}

impl FromStr for Prefix {
    type Err = AddrParseError;

    fn from_str(prefix: &str) -> Result<Self, Self::Err> {
        let mut parts = prefix.splitn(2, '/');
        let addr = parts.next().unwrap_or_default().parse()?;
        let len = parts.next().ok_or(AddrParseError::MissingLength)?;
        Self::new(addr, u8::from_str(len)?)
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}
