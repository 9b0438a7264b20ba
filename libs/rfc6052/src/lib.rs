//! RFC 6052 IPv4-Embedded IPv6 address translation.
//!
//! This is the algorithmic core of NAT64's address-family mapping: given a
//! well-known-length IPv6 prefix, an IPv4 address can be deterministically
//! embedded into (or extracted from) an IPv6 address.
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;

mod embed;
mod extract;
pub use embed::{embed_ipv4_addr, embed_ipv4_addr_unchecked};
pub use extract::{extract_ipv4_addr, extract_ipv4_addr_unchecked};

/// All allowed IPv6 prefix lengths according to [RFC6052 Section 2.2](https://datatracker.ietf.org/doc/html/rfc6052#section-2.2)
pub const ALLOWED_PREFIX_LENS: [u8; 6] = [32, 40, 48, 56, 64, 96];

/// `addr_4to6` from the NAT64 literature: embed a v4 address into a v6 prefix.
///
/// Thin rename of [`embed_ipv4_addr`] so callers working from RFC 6146's
/// terminology (rather than RFC 6052's) find the function they expect.
pub use embed_ipv4_addr as addr_4to6;

/// `addr_6to4` from the NAT64 literature: strip a v6 prefix to recover the
/// embedded v4 address.
pub use extract_ipv4_addr as addr_6to4;
