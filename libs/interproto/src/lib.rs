//! RFC 6145 stateless IP/ICMP header translation between IPv4 and IPv6.
//!
//! This crate only rewrites headers and checksums; it knows nothing about
//! sessions, address pools, or administrative configuration. Callers supply
//! the already-decided source/destination addresses and a [`TranslationOptions`]
//! describing the handful of behaviors RFC 6145 leaves implementation-defined.

pub mod error;
pub mod options;
pub mod protocols;

pub use error::{Error, Result};
pub use options::TranslationOptions;
pub use protocols::ip::{translate_ipv4_to_ipv6, translate_ipv6_to_ipv4};
