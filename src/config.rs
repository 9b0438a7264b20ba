//! Administrator-mutable runtime configuration.
//!
//! Readers take a cheap [`arc_swap::Guard`] snapshot via [`SharedConfig::load`];
//! writers install a whole new [`Config`] with [`SharedConfig::store`]. This
//! gives the "atomic pointer swap, free once quiescent" semantics the
//! session/BIB database requires without a hand-rolled RCU: `arc_swap`
//! handles the quiescence bookkeeping internally, and the hot path never
//! takes a lock to read it.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};

/// Per-protocol session idle timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "duration_secs")]
    pub udp: Duration,
    #[serde(with = "duration_secs")]
    pub icmp: Duration,
    #[serde(with = "duration_secs")]
    pub tcp_est: Duration,
    #[serde(with = "duration_secs")]
    pub tcp_trans: Duration,
    /// Window in which a stored v4 SYN waits for a matching v6 SYN (§4.5).
    #[serde(with = "duration_secs")]
    pub tcp_incoming_syn: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            udp: Duration::from_secs(5 * 60),
            icmp: Duration::from_secs(60),
            tcp_est: Duration::from_secs(2 * 60 * 60),
            tcp_trans: Duration::from_secs(4 * 60),
            tcp_incoming_syn: Duration::from_secs(6),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(de)?))
    }
}

/// Flags governing session/BIB filtering decisions (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteringFlags {
    pub address_dependent_filtering: bool,
    pub drop_icmpv6_info: bool,
    pub drop_external_tcp: bool,
}

impl Default for FilteringFlags {
    fn default() -> Self {
        Self {
            address_dependent_filtering: false,
            drop_icmpv6_info: false,
            drop_external_tcp: false,
        }
    }
}

/// Top-level administrator-mutable configuration (§3, §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub ipv6_pool: Vec<Ipv6Net>,
    pub ipv4_pool: Vec<Ipv4Net>,
    pub timeouts: Timeouts,
    pub filtering: FilteringFlags,
    pub translation: interproto::TranslationOptions,
    pub max_stored_pkts: usize,
    pub fragment_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ipv6_pool: vec!["64:ff9b::/96".parse().expect("valid default prefix")],
            ipv4_pool: vec!["192.168.2.0/24".parse().expect("valid default pool")],
            timeouts: Timeouts::default(),
            filtering: FilteringFlags::default(),
            translation: interproto::TranslationOptions::default(),
            max_stored_pkts: 1024,
            fragment_timeout: Duration::from_secs(2),
        }
    }
}

/// A process-wide, swap-and-quiesce handle to the live [`Config`].
#[derive(Debug)]
pub struct SharedConfig(ArcSwap<Config>);

impl SharedConfig {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self(ArcSwap::from_pointee(config))
    }

    /// Borrow the current configuration snapshot. Cheap; safe to call on
    /// every packet.
    #[must_use]
    pub fn load(&self) -> arc_swap::Guard<Arc<Config>> {
        self.0.load()
    }

    /// Atomically replace the configuration. Existing readers keep their
    /// already-loaded snapshot; the old `Arc` is freed once the last
    /// reference is dropped.
    pub fn store(&self, config: Config) {
        self.0.store(Arc::new(config));
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
