use lazy_static::lazy_static;

pub mod label_values {
    /// IPv4 protocol
    pub const PROTOCOL_IPV4: &str = "ipv4";
    /// IPv6 protocol
    pub const PROTOCOL_IPV6: &str = "ipv6";
    /// ICMP protocol
    pub const PROTOCOL_ICMP: &str = "icmp";
    /// ICMPv6 protocol
    pub const PROTOCOL_ICMPV6: &str = "icmpv6";
    /// TCP protocol
    pub const PROTOCOL_TCP: &str = "tcp";
    /// UDP protocol
    pub const PROTOCOL_UDP: &str = "udp";

    /// Dropped status
    pub const STATUS_DROPPED: &str = "dropped";
    /// Translated status
    pub const STATUS_TRANSLATED: &str = "translated";
}

lazy_static! {
    /// Counter for the number of packets processed, by protocol and outcome.
    pub static ref PACKET_COUNTER: prometheus::IntCounterVec = prometheus::register_int_counter_vec!(
        "nat64_packets",
        "Number of packets processed",
        &["protocol", "status"]
    ).unwrap();

    /// Counter for the number of different types of ICMP packets received.
    pub static ref ICMP_COUNTER: prometheus::IntCounterVec = prometheus::register_int_counter_vec!(
        "nat64_icmp_packets_recv",
        "Number of ICMP packets received",
        &["protocol", "icmp_type", "icmp_code"]
    ).unwrap();

    /// Current number of live BIB entries, by transport protocol.
    pub static ref BIB_ENTRIES: prometheus::IntGaugeVec = prometheus::register_int_gauge_vec!(
        "nat64_bib_entries",
        "Number of entries currently held in the binding information base",
        &["protocol"]
    ).unwrap();

    /// Current number of live session table entries, by transport protocol.
    pub static ref SESSION_ENTRIES: prometheus::IntGaugeVec = prometheus::register_int_gauge_vec!(
        "nat64_session_entries",
        "Number of entries currently held in the session table",
        &["protocol"]
    ).unwrap();

    /// Number of transport addresses currently allocated out of the IPv4 pool.
    pub static ref POOL4_ADDRESSES_IN_USE: prometheus::IntGauge = prometheus::register_int_gauge!(
        "nat64_pool4_addresses_in_use",
        "Number of IPv4 pool addresses with at least one allocated port"
    ).unwrap();

    /// Counter for entries evicted by the session/BIB expirer, by reason.
    pub static ref EXPIRED_ENTRIES: prometheus::IntCounterVec = prometheus::register_int_counter_vec!(
        "nat64_expired_entries",
        "Number of session/BIB entries removed by the expirer",
        &["protocol", "reason"]
    ).unwrap();
}
