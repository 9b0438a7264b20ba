//! TCP header translation: the header is copied verbatim, only the
//! checksum (which covers the pseudo-header) needs recomputing.

use std::net::{Ipv4Addr, Ipv6Addr};

use pnet_packet::tcp::{self, MutableTcpPacket, TcpPacket};

use crate::error::{Error, Result};

/// Re-calculates a TCP packet's checksum with a new IPv6 pseudo-header.
pub fn recalculate_tcp_checksum_ipv6(
    tcp_packet: &[u8],
    new_source: Ipv6Addr,
    new_destination: Ipv6Addr,
) -> Result<Vec<u8>> {
    let mut tcp_packet_buffer = tcp_packet.to_vec();
    let mut tcp_packet =
        MutableTcpPacket::new(&mut tcp_packet_buffer).ok_or(Error::PacketTooShort {
            expected: TcpPacket::minimum_packet_size(),
            actual: tcp_packet.len(),
        })?;

    tcp_packet.set_checksum(0);
    tcp_packet.set_checksum(tcp::ipv6_checksum(
        &tcp_packet.to_immutable(),
        &new_source,
        &new_destination,
    ));

    Ok(tcp_packet_buffer)
}

/// Re-calculates a TCP packet's checksum with a new IPv4 pseudo-header.
pub fn recalculate_tcp_checksum_ipv4(
    tcp_packet: &[u8],
    new_source: Ipv4Addr,
    new_destination: Ipv4Addr,
) -> Result<Vec<u8>> {
    let mut tcp_packet_buffer = tcp_packet.to_vec();
    let mut tcp_packet =
        MutableTcpPacket::new(&mut tcp_packet_buffer).ok_or(Error::PacketTooShort {
            expected: TcpPacket::minimum_packet_size(),
            actual: tcp_packet.len(),
        })?;

    tcp_packet.set_checksum(0);
    tcp_packet.set_checksum(tcp::ipv4_checksum(
        &tcp_packet.to_immutable(),
        &new_source,
        &new_destination,
    ));

    Ok(tcp_packet_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_recalculate_ipv6() {
        let mut input_buffer = vec![0u8; TcpPacket::minimum_packet_size() + 13];
        let mut input_packet = MutableTcpPacket::new(&mut input_buffer).unwrap();
        input_packet.set_source(1234);
        input_packet.set_destination(5678);
        input_packet.set_payload("Hello, world!".as_bytes());

        let recalculated_buffer = recalculate_tcp_checksum_ipv6(
            &input_buffer,
            "2001:db8::1".parse().unwrap(),
            "2001:db8::2".parse().unwrap(),
        )
        .unwrap();

        let recalculated_packet = TcpPacket::new(&recalculated_buffer).unwrap();
        assert_eq!(recalculated_packet.get_checksum(), 0x4817);
    }

    #[test]
    fn test_checksum_recalculate_ipv4() {
        let mut input_buffer = vec![0u8; TcpPacket::minimum_packet_size() + 13];
        let mut input_packet = MutableTcpPacket::new(&mut input_buffer).unwrap();
        input_packet.set_source(1234);
        input_packet.set_destination(5678);
        input_packet.set_payload("Hello, world!".as_bytes());

        let recalculated_buffer = recalculate_tcp_checksum_ipv4(
            &input_buffer,
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
        )
        .unwrap();

        let recalculated_packet = TcpPacket::new(&recalculated_buffer).unwrap();
        assert_eq!(recalculated_packet.get_checksum(), 0x1f88);
    }

    #[test]
    fn rejects_undersized_packets() {
        let short = vec![0u8; 4];
        assert!(matches!(
            recalculate_tcp_checksum_ipv4(
                &short,
                "192.0.2.1".parse().unwrap(),
                "192.0.2.2".parse().unwrap()
            ),
            Err(Error::PacketTooShort { .. })
        ));
    }
}
