//! IPv4 port/ICMP-id allocator backing dynamic BIB creation (§4.6).
//!
//! For each `(address, protocol)` pair we track which identifiers are in
//! use. Allocation tries to preserve the original port's parity and range
//! class (well-known / registered / dynamic) before falling back to any
//! free identifier on the same address, then to the next pool address.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use rustc_hash::FxHashMap;

use crate::tuple::{L4Protocol, TransportAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Pool4Error {
    #[error("IPv4 pool is exhausted")]
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PortClass {
    WellKnown,
    Registered,
    Dynamic,
}

impl PortClass {
    fn of(port: u16) -> Self {
        match port {
            0..=1023 => PortClass::WellKnown,
            1024..=49151 => PortClass::Registered,
            _ => PortClass::Dynamic,
        }
    }

    fn range(self) -> std::ops::RangeInclusive<u16> {
        match self {
            PortClass::WellKnown => 0..=1023,
            PortClass::Registered => 1024..=49151,
            PortClass::Dynamic => 49152..=65535,
        }
    }
}

/// Allocated-identifier tracking for one `(address, protocol)` pair.
#[derive(Debug, Default)]
struct AddressUsage {
    used: HashSet<u16>,
}

impl AddressUsage {
    fn try_allocate_preserving_parity_and_class(&mut self, preferred: u16) -> Option<u16> {
        let class = PortClass::of(preferred);
        let parity = preferred % 2;
        class
            .range()
            .filter(|p| p % 2 == parity && !self.used.contains(p))
            .next()
            .map(|p| {
                self.used.insert(p);
                p
            })
    }

    fn try_allocate_any_free(&mut self) -> Option<u16> {
        (0..=u16::MAX)
            .find(|p| !self.used.contains(p))
            .map(|p| {
                self.used.insert(p);
                p
            })
    }

    fn release(&mut self, port: u16) {
        self.used.remove(&port);
    }
}

/// The IPv4 address pool and its per-address, per-protocol port tables.
#[derive(Debug)]
pub struct Pool4 {
    addresses: Vec<Ipv4Addr>,
    usage: FxHashMap<(Ipv4Addr, L4Protocol), AddressUsage>,
}

impl Pool4 {
    #[must_use]
    pub fn new(prefixes: &[Ipv4Net]) -> Self {
        let addresses = prefixes.iter().flat_map(Ipv4Net::hosts).collect();
        Self {
            addresses,
            usage: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn addresses(&self) -> &[Ipv4Addr] {
        &self.addresses
    }

    /// Allocates a v4 transport address for a new BIB entry, preferring to
    /// preserve `preferred_id`'s parity and range class (§4.6). Falls back
    /// to any free identifier on the same address, then to the next pool
    /// address, in pool order.
    pub fn allocate(
        &mut self,
        protocol: L4Protocol,
        preferred_id: u16,
    ) -> Result<TransportAddress, Pool4Error> {
        for &addr in &self.addresses {
            let usage = self.usage.entry((addr, protocol)).or_default();
            if let Some(id) = usage.try_allocate_preserving_parity_and_class(preferred_id) {
                return Ok(TransportAddress::v4(addr, id));
            }
        }
        for &addr in &self.addresses {
            let usage = self.usage.entry((addr, protocol)).or_default();
            if let Some(id) = usage.try_allocate_any_free() {
                return Ok(TransportAddress::v4(addr, id));
            }
        }
        Err(Pool4Error::Exhausted)
    }

    /// Marks a previously-allocated identifier as reserved, e.g. for a
    /// static BIB entry installed by an administrator.
    pub fn reserve(&mut self, protocol: L4Protocol, transport: TransportAddress) {
        let addr = match transport.addr {
            std::net::IpAddr::V4(addr) => addr,
            std::net::IpAddr::V6(_) => return,
        };
        self.usage
            .entry((addr, protocol))
            .or_default()
            .used
            .insert(transport.id);
    }

    pub fn release(&mut self, protocol: L4Protocol, transport: TransportAddress) {
        let addr = match transport.addr {
            std::net::IpAddr::V4(addr) => addr,
            std::net::IpAddr::V6(_) => return,
        };
        if let Some(usage) = self.usage.get_mut(&(addr, protocol)) {
            usage.release(transport.id);
        }
    }

    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.addresses.contains(&addr)
    }

    /// Number of distinct pool addresses with at least one allocated
    /// identifier, for the `nat64_pool4_addresses_in_use` gauge.
    #[must_use]
    pub fn addresses_in_use(&self) -> usize {
        self.addresses
            .iter()
            .filter(|addr| {
                self.usage
                    .iter()
                    .any(|((usage_addr, _), usage)| usage_addr == *addr && !usage.used.is_empty())
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Pool4 {
        Pool4::new(&["192.168.2.0/30".parse().unwrap()])
    }

    #[test]
    fn preserves_parity_and_class_when_available() {
        let mut pool = pool();
        let allocated = pool.allocate(L4Protocol::Udp, 32768).unwrap();
        assert_eq!(allocated.id % 2, 0);
        assert!(allocated.id >= 49152);
    }

    #[test]
    fn falls_back_to_any_free_id_when_class_exhausted() {
        let mut pool = pool();
        // Exhaust the entire dynamic, even-parity lane on the sole host
        // address before trying another allocation in the same class.
        for _ in 0..((65535 - 49152) / 2) {
            pool.allocate(L4Protocol::Udp, 49152).unwrap();
        }
        // Still succeeds, now via the any-free fallback (parity no longer
        // guaranteed).
        assert!(pool.allocate(L4Protocol::Udp, 49152).is_ok());
    }

    #[test]
    fn exhausted_pool_is_reported() {
        // No prefixes at all: the address list is empty, so every
        // allocation attempt is exhausted from the start.
        let mut pool = Pool4::new(&[]);
        assert_eq!(
            pool.allocate(L4Protocol::Udp, 1000),
            Err(Pool4Error::Exhausted)
        );
    }
}
