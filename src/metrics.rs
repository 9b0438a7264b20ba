//! Thin wrapper over [`nat64_metrics`]: translates this crate's own types
//! (`L4Protocol`, `L3`, the session/BIB tables) into the label values the
//! exported gauges and counters expect. Serving the `/metrics` endpoint
//! itself is left to whatever process embeds this crate, same as the
//! packet injection hook point (see `main.rs`).

use nat64_metrics::metrics::label_values::{
    PROTOCOL_ICMP, PROTOCOL_ICMPV6, PROTOCOL_IPV4, PROTOCOL_IPV6, PROTOCOL_TCP, PROTOCOL_UDP,
    STATUS_DROPPED, STATUS_TRANSLATED,
};
use nat64_metrics::metrics::{BIB_ENTRIES, EXPIRED_ENTRIES, ICMP_COUNTER, PACKET_COUNTER, POOL4_ADDRESSES_IN_USE, SESSION_ENTRIES};

use crate::db::Nat64Db;
use crate::pool4::Pool4;
use crate::tuple::{L3, L4Protocol};

fn l4_label(protocol: L4Protocol) -> &'static str {
    match protocol {
        L4Protocol::Tcp => PROTOCOL_TCP,
        L4Protocol::Udp => PROTOCOL_UDP,
        L4Protocol::Icmp => PROTOCOL_ICMP,
    }
}

fn l3_label(l3: L3) -> &'static str {
    match l3 {
        L3::V4 => PROTOCOL_IPV4,
        L3::V6 => PROTOCOL_IPV6,
    }
}

/// Records one packet having been forwarded, for the ingress family `l3`.
pub fn record_forwarded(l3: L3) {
    PACKET_COUNTER.with_label_values(&[l3_label(l3), STATUS_TRANSLATED]).inc();
}

/// Records one packet having been dropped, for the ingress family `l3`.
pub fn record_dropped(l3: L3) {
    PACKET_COUNTER.with_label_values(&[l3_label(l3), STATUS_DROPPED]).inc();
}

/// Records one received ICMP/ICMPv6 informational or error packet.
pub fn record_icmp(l3: L3, icmp_type: u8, icmp_code: u8) {
    let protocol = match l3 {
        L3::V4 => PROTOCOL_ICMP,
        L3::V6 => PROTOCOL_ICMPV6,
    };
    ICMP_COUNTER
        .with_label_values(&[protocol, &icmp_type.to_string(), &icmp_code.to_string()])
        .inc();
}

/// Records one session/BIB entry removed by the expirer.
pub fn record_expired(protocol: L4Protocol, reason: &str) {
    EXPIRED_ENTRIES.with_label_values(&[l4_label(protocol), reason]).inc();
}

/// Re-samples the gauges that reflect live table state: BIB/session counts
/// per transport protocol, and IPv4 pool utilization. Cheap enough to call
/// on every expirer tick (§4.4's background walk).
pub fn sync_gauges(db: &Nat64Db, pool4: &Pool4) {
    for protocol in [L4Protocol::Tcp, L4Protocol::Udp, L4Protocol::Icmp] {
        let label = l4_label(protocol);
        BIB_ENTRIES.with_label_values(&[label]).set(db.bib_count(protocol) as i64);
        SESSION_ENTRIES.with_label_values(&[label]).set(db.session_count(protocol) as i64);
    }
    POOL4_ADDRESSES_IN_USE.set(pool4.addresses_in_use() as i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool4::Pool4;

    #[test]
    fn sync_gauges_reflects_empty_tables() {
        let db = Nat64Db::new();
        let pool4 = Pool4::new(&["192.168.2.0/29".parse().unwrap()]);
        sync_gauges(&db, &pool4);
        assert_eq!(BIB_ENTRIES.with_label_values(&[PROTOCOL_UDP]).get(), 0);
        assert_eq!(POOL4_ADDRESSES_IN_USE.get(), 0);
    }

    #[test]
    fn record_forwarded_increments_the_packet_counter() {
        let before = PACKET_COUNTER.with_label_values(&[PROTOCOL_IPV6, STATUS_TRANSLATED]).get();
        record_forwarded(L3::V6);
        assert_eq!(PACKET_COUNTER.with_label_values(&[PROTOCOL_IPV6, STATUS_TRANSLATED]).get(), before + 1);
    }
}
