//! RFC 6145 §4.2/§5.2 ICMP <-> ICMPv6 type/code mapping tables.
//!
//! These hold only the simple type/code substitution; messages whose
//! payload also needs rewriting (Time Exceeded's embedded header, Packet
//! Too Big's MTU field) are handled by the caller in `mod.rs`.

use pnet_packet::icmp::{IcmpCode, IcmpType};
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Type};

use crate::error::{Error, Result};

/// Maps an ICMPv4 type/code pair to its ICMPv6 equivalent.
pub fn translate_type_and_code_4_to_6(
    icmp_type: IcmpType,
    icmp_code: IcmpCode,
) -> Result<(Icmpv6Type, Icmpv6Code)> {
    match icmp_type {
        // Echo Request -> Echo Request
        IcmpType(8) => Ok((Icmpv6Type(128), Icmpv6Code(0))),

        // Echo Reply -> Echo Reply
        IcmpType(0) => Ok((Icmpv6Type(129), Icmpv6Code(0))),

        // Destination Unreachable -> Destination Unreachable / Packet Too Big
        IcmpType(3) => Ok(match icmp_code {
            IcmpCode(0) => (Icmpv6Type(1), Icmpv6Code(0)), // net unreachable -> no route to destination
            IcmpCode(1) => (Icmpv6Type(1), Icmpv6Code(3)), // host unreachable -> address unreachable
            IcmpCode(2) => (Icmpv6Type(1), Icmpv6Code(0)), // protocol unreachable -> no route to destination
            IcmpCode(3) => (Icmpv6Type(1), Icmpv6Code(4)), // port unreachable -> port unreachable
            IcmpCode(4) => (Icmpv6Type(2), Icmpv6Code(0)), // fragmentation needed, DF set -> packet too big
            IcmpCode(5) => (Icmpv6Type(1), Icmpv6Code(5)), // source route failed -> source addr failed policy
            IcmpCode(6) => (Icmpv6Type(1), Icmpv6Code(0)), // net unknown -> no route to destination
            IcmpCode(7) => (Icmpv6Type(1), Icmpv6Code(3)), // host unknown -> address unreachable
            IcmpCode(8) => (Icmpv6Type(1), Icmpv6Code(0)), // source host isolated -> no route to destination
            IcmpCode(9) | IcmpCode(10) => (Icmpv6Type(1), Icmpv6Code(1)), // admin prohibited -> communication prohibited
            IcmpCode(11) => (Icmpv6Type(1), Icmpv6Code(0)), // net unreachable for ToS -> no route to destination
            IcmpCode(12) => (Icmpv6Type(1), Icmpv6Code(3)), // host unreachable for ToS -> address unreachable
            IcmpCode(13) | IcmpCode(14) | IcmpCode(15) => (Icmpv6Type(1), Icmpv6Code(1)),
            _ => (Icmpv6Type(1), Icmpv6Code(0)),
        }),

        // Time Exceeded -> Time Exceeded, code preserved
        IcmpType(11) => Ok((Icmpv6Type(3), Icmpv6Code(icmp_code.0))),

        other => Err(Error::UnsupportedIcmpType(other.0)),
    }
}

/// Maps an ICMPv6 type/code pair to its ICMPv4 equivalent.
pub fn translate_type_and_code_6_to_4(
    icmp_type: Icmpv6Type,
    icmp_code: Icmpv6Code,
) -> Result<(IcmpType, IcmpCode)> {
    match icmp_type {
        // Echo Request -> Echo Request
        Icmpv6Type(128) => Ok((IcmpType(8), IcmpCode(0))),

        // Echo Reply -> Echo Reply
        Icmpv6Type(129) => Ok((IcmpType(0), IcmpCode(0))),

        // Destination Unreachable -> Destination Unreachable
        Icmpv6Type(1) => Ok(match icmp_code {
            Icmpv6Code(0) => (IcmpType(3), IcmpCode(0)), // no route to destination -> net unreachable
            Icmpv6Code(1) => (IcmpType(3), IcmpCode(13)), // comm administratively prohibited
            Icmpv6Code(3) => (IcmpType(3), IcmpCode(1)), // address unreachable -> host unreachable
            Icmpv6Code(4) => (IcmpType(3), IcmpCode(3)), // port unreachable -> port unreachable
            Icmpv6Code(5) => (IcmpType(3), IcmpCode(5)), // source addr failed policy -> source route failed
            _ => (IcmpType(3), IcmpCode(0)),
        }),

        // Packet Too Big -> Destination Unreachable, fragmentation needed
        Icmpv6Type(2) => Ok((IcmpType(3), IcmpCode(4))),

        // Time Exceeded -> Time Exceeded, code preserved
        Icmpv6Type(3) => Ok((IcmpType(11), IcmpCode(icmp_code.0))),

        other => Err(Error::UnsupportedIcmpv6Type(other.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_round_trips() {
        let (t, c) = translate_type_and_code_4_to_6(IcmpType(8), IcmpCode(0)).unwrap();
        assert_eq!((t, c), (Icmpv6Type(128), Icmpv6Code(0)));
        let (t, c) = translate_type_and_code_6_to_4(Icmpv6Type(128), Icmpv6Code(0)).unwrap();
        assert_eq!((t, c), (IcmpType(8), IcmpCode(0)));
    }

    #[test]
    fn fragmentation_needed_becomes_packet_too_big() {
        let (t, c) = translate_type_and_code_4_to_6(IcmpType(3), IcmpCode(4)).unwrap();
        assert_eq!((t, c), (Icmpv6Type(2), Icmpv6Code(0)));
    }

    #[test]
    fn packet_too_big_becomes_fragmentation_needed() {
        let (t, c) = translate_type_and_code_6_to_4(Icmpv6Type(2), Icmpv6Code(0)).unwrap();
        assert_eq!((t, c), (IcmpType(3), IcmpCode(4)));
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(matches!(
            translate_type_and_code_4_to_6(IcmpType(42), IcmpCode(0)),
            Err(Error::UnsupportedIcmpType(42))
        ));
    }
}
