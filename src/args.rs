//! Commandline arguments for `nat64d`.

use std::net::SocketAddr;
use std::time::Duration;

use ipnet::{Ipv4Net, Ipv6Net};

#[derive(clap::Parser)]
#[clap(author, version, about = "A stateful NAT64 (RFC 6146) translator", long_about = None)]
pub struct Args {
    /// IPv4 prefixes to draw the translation pool from
    #[clap(long = "pool-prefix", required = true)]
    pub pool_prefixes: Vec<Ipv4Net>,

    /// RFC 6052 IPv6 prefix embedded IPv4 addresses are carried under
    #[clap(long = "via", default_value_t = "64:ff9b::/96".parse().unwrap())]
    pub ipv6_prefix: Ipv6Net,

    /// UDP session idle timeout, in seconds
    #[clap(long, default_value = "300")]
    pub udp_timeout_secs: u64,

    /// ICMP informational session idle timeout, in seconds
    #[clap(long, default_value = "60")]
    pub icmp_timeout_secs: u64,

    /// TCP established session idle timeout, in seconds
    #[clap(long, default_value = "7200")]
    pub tcp_established_timeout_secs: u64,

    /// TCP transitory (handshake/closing) session idle timeout, in seconds
    #[clap(long, default_value = "240")]
    pub tcp_transitory_timeout_secs: u64,

    /// Enable address-dependent filtering (§4.3) for UDP/ICMP sessions
    #[clap(long)]
    pub address_dependent_filtering: bool,

    /// Expose Prometheus metrics on this address (serving the endpoint is
    /// left to the embedding process; this only controls gauge sampling)
    #[clap(long = "prometheus")]
    pub prom_bind_addr: Option<SocketAddr>,

    /// Enable verbose logging
    #[clap(short, long)]
    pub verbose: bool,
}

impl Args {
    #[must_use]
    pub fn timeouts(&self) -> crate::config::Timeouts {
        crate::config::Timeouts {
            udp: Duration::from_secs(self.udp_timeout_secs),
            icmp: Duration::from_secs(self.icmp_timeout_secs),
            tcp_est: Duration::from_secs(self.tcp_established_timeout_secs),
            tcp_trans: Duration::from_secs(self.tcp_transitory_timeout_secs),
            ..crate::config::Timeouts::default()
        }
    }
}
