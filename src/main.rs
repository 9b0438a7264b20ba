//! Entrypoint for `nat64d`.
//!
//! This binary wires up the translator core (database, pools, pipeline)
//! from CLI arguments and logs a startup summary. It does not itself own a
//! packet source: feeding packets through [`nat64d::translate::Pipeline`]
//! and carrying them to/from a TUN device, netlink queue, or test harness
//! is left to whatever embeds this crate.

mod args;
mod logging;

use std::sync::Mutex;

use clap::Parser;

use nat64d::config::{Config, FilteringFlags, SharedConfig};
use nat64d::db::Nat64Db;
use nat64d::packet_store::PacketStore;
use nat64d::pool4::Pool4;
use nat64d::pool6::Pool6;

fn main() {
    let args = args::Args::parse();
    logging::enable_logger(args.verbose);

    let config = Config {
        ipv6_pool: vec![args.ipv6_prefix],
        ipv4_pool: args.pool_prefixes.clone(),
        timeouts: args.timeouts(),
        filtering: FilteringFlags {
            address_dependent_filtering: args.address_dependent_filtering,
            ..FilteringFlags::default()
        },
        ..Config::default()
    };

    log::info!(
        "translating {} <-> {:?} across {} pool prefix(es)",
        config.ipv6_pool[0],
        config.ipv4_pool,
        config.ipv4_pool.len()
    );

    let _db = Nat64Db::new();
    let _pool4 = Mutex::new(Pool4::new(&config.ipv4_pool));
    let _pool6 = Pool6::new(config.ipv6_pool.clone());
    let _packet_store = PacketStore::new(config.max_stored_pkts);
    let _shared_config = SharedConfig::new(config);

    if let Some(bind_addr) = args.prom_bind_addr {
        log::info!("metrics gauges will track live state for {bind_addr}, but serving /metrics is not wired up by this binary");
    }

    log::warn!("no packet source attached; nat64d is idle. Feed packets through nat64d::translate::Pipeline from an embedding process.");
}
