//! ICMP <-> ICMPv6 translation (RFC 6145 §4.2/§5.2).

mod type_code;

use std::net::{Ipv4Addr, Ipv6Addr};

use pnet_packet::{
    icmp::{self, IcmpPacket, IcmpTypes, MutableIcmpPacket},
    icmpv6::{self, Icmpv6Packet, Icmpv6Types, MutableIcmpv6Packet},
    Packet,
};

use crate::error::{Error, Result};
use crate::options::TranslationOptions;
use crate::protocols::ip::{translate_ipv4_to_ipv6_at_depth, translate_ipv6_to_ipv4_at_depth};

/// Translate an ICMP packet to ICMPv6. Best-effort: there is no 1:1 mapping
/// for every type/code pair (RFC 6145 §4.2).
pub fn translate_icmp_to_icmpv6(
    icmp_packet: &[u8],
    new_source: Ipv6Addr,
    new_destination: Ipv6Addr,
    options: &TranslationOptions,
) -> Result<Vec<u8>> {
    translate_icmp_to_icmpv6_at_depth(icmp_packet, new_source, new_destination, options, 0)
}

pub(crate) fn translate_icmp_to_icmpv6_at_depth(
    icmp_packet: &[u8],
    new_source: Ipv6Addr,
    new_destination: Ipv6Addr,
    options: &TranslationOptions,
    depth: u8,
) -> Result<Vec<u8>> {
    let icmp_packet = IcmpPacket::new(icmp_packet).ok_or(Error::PacketTooShort {
        expected: IcmpPacket::minimum_packet_size(),
        actual: icmp_packet.len(),
    })?;

    let (icmpv6_type, icmpv6_code) = type_code::translate_type_and_code_4_to_6(
        icmp_packet.get_icmp_type(),
        icmp_packet.get_icmp_code(),
    )?;

    let payload = match icmpv6_type {
        Icmpv6Types::TimeExceeded | Icmpv6Types::DestinationUnreachable => {
            if depth >= 1 {
                return Err(Error::NestedIcmpError);
            }
            // Time Exceeded and the non-Packet-Too-Big Destination
            // Unreachable codes all carry 4 bytes of unused space, then
            // the offending IPv4 header and leading payload octets.
            let mut output = vec![0u8; 4];
            output.copy_from_slice(&icmp_packet.payload()[..4]);
            output.extend_from_slice(&translate_ipv4_to_ipv6_at_depth(
                &icmp_packet.payload()[4..],
                new_source,
                new_destination,
                options,
                depth + 1,
            )?);
            output
        }
        Icmpv6Types::PacketTooBig => {
            if depth >= 1 {
                return Err(Error::NestedIcmpError);
            }
            // v4 layout: 2 bytes unused, 2 byte next-hop MTU, then the
            // offending header. v6 Packet Too Big wants a 4 byte MTU field
            // in its place; RFC 6145 §4.2 has the translator widen it
            // and account for the 20-byte header size difference.
            let v4_payload = icmp_packet.payload();
            let reported_mtu = u16::from_be_bytes([v4_payload[2], v4_payload[3]]) as u32;
            let mtu = if reported_mtu == 0 {
                options.plateau_below(u32::MAX)
            } else {
                reported_mtu + 20
            };
            let mut output = mtu.to_be_bytes().to_vec();
            output.extend_from_slice(&translate_ipv4_to_ipv6_at_depth(
                &v4_payload[4..],
                new_source,
                new_destination,
                options,
                depth + 1,
            )?);
            output
        }
        _ => icmp_packet.payload().to_vec(),
    };

    let mut output_buffer = vec![0u8; Icmpv6Packet::minimum_packet_size() + payload.len()];
    let mut icmpv6_packet = MutableIcmpv6Packet::new(&mut output_buffer)
        .expect("output_buffer sized for the ICMPv6 header plus payload");

    icmpv6_packet.set_icmpv6_type(icmpv6_type);
    icmpv6_packet.set_icmpv6_code(icmpv6_code);
    icmpv6_packet.set_checksum(0);
    icmpv6_packet.set_payload(&payload);
    icmpv6_packet.set_checksum(icmpv6::checksum(
        &icmpv6_packet.to_immutable(),
        &new_source,
        &new_destination,
    ));

    Ok(output_buffer)
}

/// Translate an ICMPv6 packet to ICMP. Best-effort: there is no 1:1 mapping
/// for every type/code pair (RFC 6145 §5.2).
pub fn translate_icmpv6_to_icmp(
    icmpv6_packet: &[u8],
    new_source: Ipv4Addr,
    new_destination: Ipv4Addr,
    options: &TranslationOptions,
) -> Result<Vec<u8>> {
    translate_icmpv6_to_icmp_at_depth(icmpv6_packet, new_source, new_destination, options, 0)
}

pub(crate) fn translate_icmpv6_to_icmp_at_depth(
    icmpv6_packet: &[u8],
    new_source: Ipv4Addr,
    new_destination: Ipv4Addr,
    options: &TranslationOptions,
    depth: u8,
) -> Result<Vec<u8>> {
    let icmpv6_packet = Icmpv6Packet::new(icmpv6_packet).ok_or(Error::PacketTooShort {
        expected: Icmpv6Packet::minimum_packet_size(),
        actual: icmpv6_packet.len(),
    })?;

    let (icmp_type, icmp_code) = type_code::translate_type_and_code_6_to_4(
        icmpv6_packet.get_icmpv6_type(),
        icmpv6_packet.get_icmpv6_code(),
    )?;

    let payload = match icmp_type {
        IcmpTypes::TimeExceeded | IcmpTypes::DestinationUnreachable if icmp_code.0 != 4 => {
            if depth >= 1 {
                return Err(Error::NestedIcmpError);
            }
            // Time Exceeded and the non-fragmentation-needed Destination
            // Unreachable codes all carry 4 bytes of unused space, then
            // the offending IPv6 header and leading payload octets.
            let mut output = vec![0u8; 4];
            output.copy_from_slice(&icmpv6_packet.payload()[..4]);
            output.extend_from_slice(&translate_ipv6_to_ipv4_at_depth(
                &icmpv6_packet.payload()[4..],
                new_source,
                new_destination,
                options,
                depth + 1,
            )?);
            output
        }
        IcmpTypes::DestinationUnreachable if icmp_code.0 == 4 => {
            if depth >= 1 {
                return Err(Error::NestedIcmpError);
            }
            // v6 Packet Too Big carries a 4 byte MTU field; v4
            // Fragmentation Needed wants 2 bytes unused then a 2 byte
            // next-hop MTU, reduced by the 20-byte header size difference.
            let v6_payload = icmpv6_packet.payload();
            let mtu = u32::from_be_bytes([
                v6_payload[0],
                v6_payload[1],
                v6_payload[2],
                v6_payload[3],
            ]);
            let v4_mtu = mtu.saturating_sub(20).min(u16::MAX as u32) as u16;
            let mut output = vec![0, 0];
            output.extend_from_slice(&v4_mtu.to_be_bytes());
            output.extend_from_slice(&translate_ipv6_to_ipv4_at_depth(
                &v6_payload[4..],
                new_source,
                new_destination,
                options,
                depth + 1,
            )?);
            output
        }
        _ => icmpv6_packet.payload().to_vec(),
    };

    let mut output_buffer = vec![0u8; IcmpPacket::minimum_packet_size() + payload.len()];
    let mut icmp_packet = MutableIcmpPacket::new(&mut output_buffer)
        .expect("output_buffer sized for the ICMP header plus payload");

    icmp_packet.set_icmp_type(icmp_type);
    icmp_packet.set_icmp_code(icmp_code);
    icmp_packet.set_checksum(0);
    icmp_packet.set_payload(&payload);
    icmp_packet.set_checksum(icmp::checksum(&icmp_packet.to_immutable()));

    Ok(output_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_icmp(icmp_type: u8, icmp_code: u8, payload: &[u8]) -> Vec<u8> {
        let mut buffer = vec![0u8; IcmpPacket::minimum_packet_size() + payload.len()];
        let mut packet = MutableIcmpPacket::new(&mut buffer).unwrap();
        packet.set_icmp_type(pnet_packet::icmp::IcmpType(icmp_type));
        packet.set_icmp_code(pnet_packet::icmp::IcmpCode(icmp_code));
        packet.set_payload(payload);
        buffer
    }

    #[test]
    fn echo_request_translates() {
        let options = TranslationOptions::default();
        let packet = build_icmp(8, 0, b"ping");
        let translated = translate_icmp_to_icmpv6(
            &packet,
            "2001:db8::1".parse().unwrap(),
            "2001:db8::2".parse().unwrap(),
            &options,
        )
        .unwrap();
        let parsed = Icmpv6Packet::new(&translated).unwrap();
        assert_eq!(parsed.get_icmpv6_type(), Icmpv6Types::EchoRequest);
    }

    #[test]
    fn host_unreachable_translates_its_embedded_packet() {
        use pnet_packet::ipv4::{Ipv4Packet, MutableIpv4Packet};
        use pnet_packet::ipv6::Ipv6Packet;
        use pnet_packet::udp::MutableUdpPacket;

        let mut inner_buffer = vec![0u8; Ipv4Packet::minimum_packet_size() + 8];
        {
            let mut inner = MutableIpv4Packet::new(&mut inner_buffer).unwrap();
            inner.set_version(4);
            inner.set_header_length(5);
            inner.set_ttl(64);
            inner.set_next_level_protocol(pnet_packet::ip::IpNextHeaderProtocols::Udp);
            inner.set_source("198.51.100.1".parse().unwrap());
            inner.set_destination("192.0.2.1".parse().unwrap());
            inner.set_total_length(inner_buffer.len() as u16);
            let mut udp = MutableUdpPacket::new(inner.payload_mut()).unwrap();
            udp.set_source(1234);
            udp.set_destination(53);
            udp.set_length(8);
        }

        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(&inner_buffer);
        let packet = build_icmp(3, 1, &payload); // code 1: host unreachable

        let options = TranslationOptions::default();
        let translated = translate_icmp_to_icmpv6(
            &packet,
            "2001:db8::1".parse().unwrap(),
            "2001:db8::2".parse().unwrap(),
            &options,
        )
        .unwrap();

        let parsed = Icmpv6Packet::new(&translated).unwrap();
        assert_eq!(parsed.get_icmpv6_type(), Icmpv6Types::DestinationUnreachable);
        // The embedded packet must come back out as IPv6, not a verbatim
        // copy of the original IPv4 bytes.
        let embedded = Ipv6Packet::new(&parsed.payload()[4..]).unwrap();
        assert_eq!(embedded.get_next_header(), pnet_packet::ip::IpNextHeaderProtocols::Udp);
        assert_eq!(embedded.get_source(), "2001:db8::1".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn unsupported_type_is_an_error() {
        let options = TranslationOptions::default();
        let packet = build_icmp(41, 0, b"");
        assert!(matches!(
            translate_icmp_to_icmpv6(
                &packet,
                "2001:db8::1".parse().unwrap(),
                "2001:db8::2".parse().unwrap(),
                &options
            ),
            Err(Error::UnsupportedIcmpType(41))
        ));
    }
}
