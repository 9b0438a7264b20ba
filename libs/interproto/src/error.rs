//! Error types for this library

/// All possible errors thrown by `interproto` functions
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("Packet too short. Expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },
    #[error("Unsupported ICMP type: {0}")]
    UnsupportedIcmpType(u8),
    #[error("Unsupported ICMPv6 type: {0}")]
    UnsupportedIcmpv6Type(u8),
    /// The hop limit / TTL reached zero during translation. The caller is
    /// expected to emit a Time Exceeded ICMP error instead of forwarding.
    #[error("TTL/hop limit expired during translation")]
    TtlExpired,
    /// An ICMP error packet's inner payload was itself an ICMP error. RFC
    /// 6145 §4.2/§5.2 forbid recursing past one level; the caller already
    /// should have dropped this at tuple extraction, so reaching this deep
    /// is a defensive backstop, not the primary enforcement point.
    #[error("recursive ICMP-in-ICMP translation is not supported")]
    NestedIcmpError,
}

/// Result type for `interproto`
pub type Result<T> = std::result::Result<T, Error>;
