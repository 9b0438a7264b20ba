//! UDP header translation.

use std::net::{Ipv4Addr, Ipv6Addr};

use pnet_packet::udp::{self, MutableUdpPacket, UdpPacket};

use crate::error::{Error, Result};

/// Re-calculates a UDP packet's checksum with a new IPv6 pseudo-header.
///
/// IPv4 UDP allows an all-zero checksum to mean "not computed"; IPv6 UDP
/// forbids that (RFC 6145 §4.5), so a zero incoming checksum still gets a
/// real one computed here. If the pseudo-header arithmetic legitimately
/// produces `0x0000`, it's carried as `0xffff` instead (the standard
/// one's-complement "negative zero", per RFC 1071).
pub fn recalculate_udp_checksum_ipv6(
    udp_packet: &[u8],
    new_source: Ipv6Addr,
    new_destination: Ipv6Addr,
) -> Result<Vec<u8>> {
    let mut udp_packet_buffer = udp_packet.to_vec();
    let mut udp_packet =
        MutableUdpPacket::new(&mut udp_packet_buffer).ok_or(Error::PacketTooShort {
            expected: UdpPacket::minimum_packet_size(),
            actual: udp_packet.len(),
        })?;

    udp_packet.set_checksum(0);
    let checksum = udp::ipv6_checksum(&udp_packet.to_immutable(), &new_source, &new_destination);
    udp_packet.set_checksum(if checksum == 0 { 0xffff } else { checksum });

    Ok(udp_packet_buffer)
}

/// Re-calculates a UDP packet's checksum with a new IPv4 pseudo-header.
pub fn recalculate_udp_checksum_ipv4(
    udp_packet: &[u8],
    new_source: Ipv4Addr,
    new_destination: Ipv4Addr,
) -> Result<Vec<u8>> {
    let mut udp_packet_buffer = udp_packet.to_vec();
    let mut udp_packet =
        MutableUdpPacket::new(&mut udp_packet_buffer).ok_or(Error::PacketTooShort {
            expected: UdpPacket::minimum_packet_size(),
            actual: udp_packet.len(),
        })?;

    udp_packet.set_checksum(0);
    udp_packet.set_checksum(udp::ipv4_checksum(
        &udp_packet.to_immutable(),
        &new_source,
        &new_destination,
    ));

    Ok(udp_packet_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recalculate_udp_checksum_ipv6() {
        let mut input_buffer = vec![0u8; UdpPacket::minimum_packet_size() + 13];
        let mut udp_packet = MutableUdpPacket::new(&mut input_buffer).unwrap();
        udp_packet.set_source(1234);
        udp_packet.set_destination(5678);
        udp_packet.set_length(13);
        udp_packet.set_payload("Hello, world!".as_bytes());

        let recalculated_buffer = recalculate_udp_checksum_ipv6(
            &input_buffer,
            "2001:db8::1".parse().unwrap(),
            "2001:db8::2".parse().unwrap(),
        )
        .unwrap();

        let recalculated_packet = UdpPacket::new(&recalculated_buffer).unwrap();
        assert_eq!(recalculated_packet.get_checksum(), 0x480b);
    }

    #[test]
    fn test_recalculate_udp_checksum_ipv4() {
        let mut input_buffer = vec![0u8; UdpPacket::minimum_packet_size() + 13];
        let mut udp_packet = MutableUdpPacket::new(&mut input_buffer).unwrap();
        udp_packet.set_source(1234);
        udp_packet.set_destination(5678);
        udp_packet.set_length(13);
        udp_packet.set_payload("Hello, world!".as_bytes());

        let recalculated_buffer = recalculate_udp_checksum_ipv4(
            &input_buffer,
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
        )
        .unwrap();

        let recalculated_packet = UdpPacket::new(&recalculated_buffer).unwrap();
        assert_eq!(recalculated_packet.get_checksum(), 0x1f7c);
    }

    #[test]
    fn zero_v6_checksum_is_bumped_to_0xffff() {
        // Degenerate but legal: an empty, zero-addressed packet whose
        // pseudo-header checksum would fold to exactly zero must not be
        // carried as zero on the v6 side.
        let mut input_buffer = vec![0u8; UdpPacket::minimum_packet_size()];
        let mut udp_packet = MutableUdpPacket::new(&mut input_buffer).unwrap();
        udp_packet.set_length(8);

        let recalculated_buffer =
            recalculate_udp_checksum_ipv6(&input_buffer, Ipv6Addr::UNSPECIFIED, Ipv6Addr::UNSPECIFIED)
                .unwrap();
        let recalculated_packet = UdpPacket::new(&recalculated_buffer).unwrap();
        assert_ne!(recalculated_packet.get_checksum(), 0);
    }
}
