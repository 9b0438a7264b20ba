//! # nat64d
//!
//! A stateful NAT64 (RFC 6146) translator core: the session/BIB database,
//! the filtering and translation pipeline, and the IPv4/IPv6 address pools.
//! This crate has no opinion on how packets arrive or leave — that's the
//! caller's hook point (a TUN device, a netlink queue, a test harness).
//!
//! *Note: there is a fair chance you are looking for `src/main.rs` instead
//! of this file.*

#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod admin;
pub mod bib;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod fragment;
pub mod metrics;
pub mod packet_store;
pub mod pool4;
pub mod pool6;
pub mod session;
pub mod translate;
pub mod tuple;
