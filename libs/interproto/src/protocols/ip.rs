//! Translation functions that can convert packets between IPv4 and IPv6.

use std::net::{Ipv4Addr, Ipv6Addr};

use pnet_packet::{
    ip::IpNextHeaderProtocols,
    ipv4::{self, Ipv4Packet, MutableIpv4Packet},
    ipv6::{Ipv6Packet, MutableIpv6Packet},
    Packet,
};

use super::{
    icmp::{translate_icmp_to_icmpv6_at_depth, translate_icmpv6_to_icmp_at_depth},
    tcp::{recalculate_tcp_checksum_ipv4, recalculate_tcp_checksum_ipv6},
    udp::{recalculate_udp_checksum_ipv4, recalculate_udp_checksum_ipv6},
};
use crate::error::{Error, Result};
use crate::options::TranslationOptions;

/// Translates an IPv4 packet into an IPv6 packet, recursing into the
/// payload as needed.
pub fn translate_ipv4_to_ipv6(
    ipv4_packet: &[u8],
    new_source: Ipv6Addr,
    new_destination: Ipv6Addr,
    options: &TranslationOptions,
) -> Result<Vec<u8>> {
    translate_ipv4_to_ipv6_at_depth(ipv4_packet, new_source, new_destination, options, 0)
}

pub(crate) fn translate_ipv4_to_ipv6_at_depth(
    ipv4_packet: &[u8],
    new_source: Ipv6Addr,
    new_destination: Ipv6Addr,
    options: &TranslationOptions,
    depth: u8,
) -> Result<Vec<u8>> {
    let ipv4_packet = Ipv4Packet::new(ipv4_packet).ok_or(Error::PacketTooShort {
        expected: Ipv4Packet::minimum_packet_size(),
        actual: ipv4_packet.len(),
    })?;

    if ipv4_packet.get_ttl() == 0 {
        return Err(Error::TtlExpired);
    }

    let new_payload = match ipv4_packet.get_next_level_protocol() {
        IpNextHeaderProtocols::Icmp => translate_icmp_to_icmpv6_at_depth(
            ipv4_packet.payload(),
            new_source,
            new_destination,
            options,
            depth,
        )?,
        IpNextHeaderProtocols::Tcp => {
            recalculate_tcp_checksum_ipv6(ipv4_packet.payload(), new_source, new_destination)?
        }
        IpNextHeaderProtocols::Udp => {
            recalculate_udp_checksum_ipv6(ipv4_packet.payload(), new_source, new_destination)?
        }
        protocol => {
            log::warn!("unsupported next level protocol: {:?}", protocol);
            ipv4_packet.payload().to_vec()
        }
    };

    let mut output_buffer = vec![0u8; Ipv6Packet::minimum_packet_size() + new_payload.len()];
    let mut ipv6_packet = MutableIpv6Packet::new(&mut output_buffer)
        .expect("output_buffer sized for the IPv6 header plus payload");

    ipv6_packet.set_version(6);
    ipv6_packet.set_next_header(match ipv4_packet.get_next_level_protocol() {
        IpNextHeaderProtocols::Icmp => IpNextHeaderProtocols::Icmpv6,
        proto => proto,
    });
    ipv6_packet.set_hop_limit(ipv4_packet.get_ttl() - 1);
    ipv6_packet.set_traffic_class(if options.reset_traffic_class {
        0
    } else {
        ipv4_packet.get_dscp() << 2 | ipv4_packet.get_ecn()
    });
    ipv6_packet.set_source(new_source);
    ipv6_packet.set_destination(new_destination);
    ipv6_packet.set_payload_length(
        new_payload
            .len()
            .try_into()
            .map_err(|_| Error::PacketTooShort {
                expected: 0,
                actual: new_payload.len(),
            })?,
    );
    ipv6_packet.set_payload(&new_payload);

    Ok(output_buffer)
}

/// Translates an IPv6 packet into an IPv4 packet, recursing into the
/// payload as needed.
pub fn translate_ipv6_to_ipv4(
    ipv6_packet: &[u8],
    new_source: Ipv4Addr,
    new_destination: Ipv4Addr,
    options: &TranslationOptions,
) -> Result<Vec<u8>> {
    translate_ipv6_to_ipv4_at_depth(ipv6_packet, new_source, new_destination, options, 0)
}

pub(crate) fn translate_ipv6_to_ipv4_at_depth(
    ipv6_packet: &[u8],
    new_source: Ipv4Addr,
    new_destination: Ipv4Addr,
    options: &TranslationOptions,
    depth: u8,
) -> Result<Vec<u8>> {
    let ipv6_packet = Ipv6Packet::new(ipv6_packet).ok_or(Error::PacketTooShort {
        expected: Ipv6Packet::minimum_packet_size(),
        actual: ipv6_packet.len(),
    })?;

    if ipv6_packet.get_hop_limit() == 0 {
        return Err(Error::TtlExpired);
    }

    let new_payload = match ipv6_packet.get_next_header() {
        IpNextHeaderProtocols::Icmpv6 => translate_icmpv6_to_icmp_at_depth(
            ipv6_packet.payload(),
            new_source,
            new_destination,
            options,
            depth,
        )?,
        IpNextHeaderProtocols::Tcp => {
            recalculate_tcp_checksum_ipv4(ipv6_packet.payload(), new_source, new_destination)?
        }
        IpNextHeaderProtocols::Udp => {
            recalculate_udp_checksum_ipv4(ipv6_packet.payload(), new_source, new_destination)?
        }
        protocol => {
            log::warn!("unsupported next header: {:?}", protocol);
            ipv6_packet.payload().to_vec()
        }
    };

    let mut output_buffer = vec![0u8; Ipv4Packet::minimum_packet_size() + new_payload.len()];
    let mut ipv4_packet = MutableIpv4Packet::new(&mut output_buffer)
        .expect("output_buffer sized for the IPv4 header plus payload");

    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length(5);
    ipv4_packet.set_ttl(ipv6_packet.get_hop_limit() - 1);
    if options.reset_tos {
        ipv4_packet.set_dscp(options.new_tos >> 2);
        ipv4_packet.set_ecn(options.new_tos & 0x3);
    } else {
        let traffic_class = ipv6_packet.get_traffic_class();
        ipv4_packet.set_dscp(traffic_class >> 2);
        ipv4_packet.set_ecn(traffic_class & 0x3);
    }
    ipv4_packet.set_flags(if options.df_always_on { 0x2 } else { 0 });
    ipv4_packet.set_next_level_protocol(match ipv6_packet.get_next_header() {
        IpNextHeaderProtocols::Icmpv6 => IpNextHeaderProtocols::Icmp,
        proto => proto,
    });
    ipv4_packet.set_source(new_source);
    ipv4_packet.set_destination(new_destination);
    ipv4_packet.set_total_length(
        (Ipv4Packet::minimum_packet_size() + new_payload.len())
            .try_into()
            .map_err(|_| Error::PacketTooShort {
                expected: 0,
                actual: new_payload.len(),
            })?,
    );
    ipv4_packet.set_payload(&new_payload);
    ipv4_packet.set_checksum(ipv4::checksum(&ipv4_packet.to_immutable()));

    Ok(output_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ipv4_udp() -> Vec<u8> {
        let udp_len = 8;
        let mut buffer = vec![0u8; Ipv4Packet::minimum_packet_size() + udp_len];
        let mut packet = MutableIpv4Packet::new(&mut buffer).unwrap();
        packet.set_version(4);
        packet.set_header_length(5);
        packet.set_ttl(64);
        packet.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        packet.set_total_length(buffer.len() as u16);
        packet.set_source("192.0.2.1".parse().unwrap());
        packet.set_destination("192.0.2.2".parse().unwrap());
        buffer
    }

    #[test]
    fn translates_header_fields_and_decrements_ttl() {
        let options = TranslationOptions::default();
        let input = build_ipv4_udp();
        let output = translate_ipv4_to_ipv6(
            &input,
            "64:ff9b::c000:201".parse().unwrap(),
            "64:ff9b::c000:202".parse().unwrap(),
            &options,
        )
        .unwrap();
        let packet = Ipv6Packet::new(&output).unwrap();
        assert_eq!(packet.get_hop_limit(), 63);
        assert_eq!(packet.get_next_header(), IpNextHeaderProtocols::Udp);
    }

    #[test]
    fn zero_ttl_is_rejected_before_translation() {
        let options = TranslationOptions::default();
        let mut input = build_ipv4_udp();
        let mut packet = MutableIpv4Packet::new(&mut input).unwrap();
        packet.set_ttl(0);
        assert!(matches!(
            translate_ipv4_to_ipv6(
                &input,
                "64:ff9b::c000:201".parse().unwrap(),
                "64:ff9b::c000:202".parse().unwrap(),
                &options
            ),
            Err(Error::TtlExpired)
        ));
    }
}
