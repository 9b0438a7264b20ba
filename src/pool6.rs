//! The IPv6 prefix pool (§3): an ordered set of RFC 6052 prefixes used to
//! translate between embedded v4 addresses and their v6 representation.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::Ipv6Net;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Pool6Error {
    #[error("address is not covered by any configured IPv6 prefix")]
    NotCovered,
    #[error(transparent)]
    InvalidPrefix(#[from] rfc6052::error::Error),
}

/// Wraps a set of configured IPv6 prefixes, exposing membership and RFC 6052
/// translation. Prefixes never overlap by construction of administrative
/// ADD (validated in `admin.rs`); the first covering prefix is authoritative.
#[derive(Debug, Clone)]
pub struct Pool6 {
    prefixes: Vec<Ipv6Net>,
}

impl Pool6 {
    #[must_use]
    pub fn new(prefixes: Vec<Ipv6Net>) -> Self {
        Self { prefixes }
    }

    #[must_use]
    pub fn prefixes(&self) -> &[Ipv6Net] {
        &self.prefixes
    }

    /// Does any configured prefix cover this address?
    #[must_use]
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        self.prefixes.iter().any(|net| net.contains(&addr))
    }

    /// Strips the covering prefix to recover the embedded v4 address.
    pub fn translate_v6_to_v4(&self, addr: Ipv6Addr) -> Result<Ipv4Addr, Pool6Error> {
        let prefix = self
            .prefixes
            .iter()
            .find(|net| net.contains(&addr))
            .ok_or(Pool6Error::NotCovered)?;
        Ok(rfc6052::extract_ipv4_addr(addr, prefix.prefix_len())?)
    }

    /// Embeds a v4 address into this pool's (first, and normally only)
    /// prefix.
    pub fn translate_v4_to_v6(&self, addr: Ipv4Addr) -> Result<Ipv6Addr, Pool6Error> {
        let prefix = self.prefixes.first().ok_or(Pool6Error::NotCovered)?;
        Ok(rfc6052::embed_ipv4_addr(addr, *prefix)?)
    }
}
