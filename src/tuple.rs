//! Step 1 of the pipeline: extract the flow identity from a raw packet (§4.1).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pnet_packet::{
    icmp::{IcmpPacket, IcmpTypes},
    icmpv6::{Icmpv6Packet, Icmpv6Types},
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    Packet,
};

/// Transport-layer protocols this core maintains state for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum L4Protocol {
    Tcp,
    Udp,
    /// ICMP informational exchange (echo request/reply); ICMP *errors*
    /// never get their own tuple — they borrow the tuple of the packet
    /// they're reporting on, with addresses swapped.
    Icmp,
}

/// An IP address plus a 16-bit L4 identifier (port, or ICMP id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransportAddress {
    pub addr: IpAddr,
    pub id: u16,
}

impl TransportAddress {
    #[must_use]
    pub fn new(addr: IpAddr, id: u16) -> Self {
        Self { addr, id }
    }

    #[must_use]
    pub fn v4(addr: Ipv4Addr, id: u16) -> Self {
        Self::new(IpAddr::V4(addr), id)
    }

    #[must_use]
    pub fn v6(addr: Ipv6Addr, id: u16) -> Self {
        Self::new(IpAddr::V6(addr), id)
    }
}

/// Address family the tuple was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L3 {
    V4,
    V6,
}

/// `{src-transport-address, dst-transport-address, L3, L4}` (§3). For ICMP,
/// `src.id == dst.id` always holds (the "3-tuple" invariant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub src: TransportAddress,
    pub dst: TransportAddress,
    pub l3: L3,
    pub l4: L4Protocol,
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum TupleError {
    #[error("packet truncated before reaching the L4 header")]
    Truncated,
    #[error("an ICMP error cannot wrap another ICMP error")]
    NestedIcmpError,
    #[error("unsupported inner protocol: {0}")]
    UnsupportedProtocol(u8),
}

/// Walks IPv6 extension headers until it reaches an upper-layer protocol
/// pnet_packet doesn't already special-case for us, returning that
/// protocol and the byte offset of its header.
fn skip_ipv6_extension_headers(
    mut next_header: IpNextHeaderProtocol,
    mut rest: &[u8],
) -> Result<(IpNextHeaderProtocol, &[u8]), TupleError> {
    loop {
        match next_header {
            IpNextHeaderProtocols::Tcp
            | IpNextHeaderProtocols::Udp
            | IpNextHeaderProtocols::Icmpv6 => return Ok((next_header, rest)),
            // Hop-by-Hop, Routing, Destination Options: next header + ext
            // len (in 8-octet units, minus the first 8) + inline data.
            IpNextHeaderProtocols::Hopopt
            | IpNextHeaderProtocols::Ipv6Route
            | IpNextHeaderProtocols::Ipv6Opts => {
                if rest.len() < 2 {
                    return Err(TupleError::Truncated);
                }
                let header_len = (rest[1] as usize + 1) * 8;
                if rest.len() < header_len {
                    return Err(TupleError::Truncated);
                }
                next_header = IpNextHeaderProtocol::new(rest[0]);
                rest = &rest[header_len..];
            }
            // Fragment header: fixed 8 bytes.
            IpNextHeaderProtocols::Ipv6Frag => {
                if rest.len() < 8 {
                    return Err(TupleError::Truncated);
                }
                next_header = IpNextHeaderProtocol::new(rest[0]);
                rest = &rest[8..];
            }
            other => return Err(TupleError::UnsupportedProtocol(other.0)),
        }
    }
}

fn icmp_is_informational(icmp_type: u8) -> bool {
    matches!(icmp_type, 0 | 8)
}

fn icmpv6_is_informational(icmpv6_type: u8) -> bool {
    matches!(icmpv6_type, 128 | 129)
}

/// Extracts the incoming tuple from a parsed IPv4 packet.
pub fn extract_ipv4(packet: &Ipv4Packet) -> Result<Tuple, TupleError> {
    let src_addr = packet.get_source();
    let dst_addr = packet.get_destination();
    let payload = packet.payload();

    match packet.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v4(src_addr, tcp.get_source()),
                dst: TransportAddress::v4(dst_addr, tcp.get_destination()),
                l3: L3::V4,
                l4: L4Protocol::Tcp,
            })
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v4(src_addr, udp.get_source()),
                dst: TransportAddress::v4(dst_addr, udp.get_destination()),
                l3: L3::V4,
                l4: L4Protocol::Udp,
            })
        }
        IpNextHeaderProtocols::Icmp => {
            let icmp = IcmpPacket::new(payload).ok_or(TupleError::Truncated)?;
            if icmp_is_informational(icmp.get_icmp_type().0) {
                let id = u16::from_be_bytes([icmp.payload()[0], icmp.payload()[1]]);
                Ok(Tuple {
                    src: TransportAddress::v4(src_addr, id),
                    dst: TransportAddress::v4(dst_addr, id),
                    l3: L3::V4,
                    l4: L4Protocol::Icmp,
                })
            } else {
                extract_ipv4_icmp_error(icmp.payload())
            }
        }
        other => Err(TupleError::UnsupportedProtocol(other.0)),
    }
}

/// An ICMP error's inner packet describes the flow that triggered it; the
/// outer tuple is that inner flow with source and destination swapped.
fn extract_ipv4_icmp_error(inner_bytes: &[u8]) -> Result<Tuple, TupleError> {
    let inner = Ipv4Packet::new(inner_bytes).ok_or(TupleError::Truncated)?;
    let inner_payload = inner.payload();
    match inner.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(inner_payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v4(inner.get_destination(), tcp.get_destination()),
                dst: TransportAddress::v4(inner.get_source(), tcp.get_source()),
                l3: L3::V4,
                l4: L4Protocol::Tcp,
            })
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(inner_payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v4(inner.get_destination(), udp.get_destination()),
                dst: TransportAddress::v4(inner.get_source(), udp.get_source()),
                l3: L3::V4,
                l4: L4Protocol::Udp,
            })
        }
        IpNextHeaderProtocols::Icmp => {
            if inner_payload.len() < 2 {
                return Err(TupleError::Truncated);
            }
            if !icmp_is_informational(inner_payload[0]) {
                return Err(TupleError::NestedIcmpError);
            }
            let id = u16::from_be_bytes([inner_payload[4], inner_payload[5]]);
            Ok(Tuple {
                src: TransportAddress::v4(inner.get_destination(), id),
                dst: TransportAddress::v4(inner.get_source(), id),
                l3: L3::V4,
                l4: L4Protocol::Icmp,
            })
        }
        other => Err(TupleError::UnsupportedProtocol(other.0)),
    }
}

/// Extracts the incoming tuple from a parsed IPv6 packet.
pub fn extract_ipv6(packet: &Ipv6Packet) -> Result<Tuple, TupleError> {
    let src_addr = packet.get_source();
    let dst_addr = packet.get_destination();
    let (protocol, payload) =
        skip_ipv6_extension_headers(packet.get_next_header(), packet.payload())?;

    match protocol {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v6(src_addr, tcp.get_source()),
                dst: TransportAddress::v6(dst_addr, tcp.get_destination()),
                l3: L3::V6,
                l4: L4Protocol::Tcp,
            })
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v6(src_addr, udp.get_source()),
                dst: TransportAddress::v6(dst_addr, udp.get_destination()),
                l3: L3::V6,
                l4: L4Protocol::Udp,
            })
        }
        IpNextHeaderProtocols::Icmpv6 => {
            let icmp = Icmpv6Packet::new(payload).ok_or(TupleError::Truncated)?;
            if icmpv6_is_informational(icmp.get_icmpv6_type().0) {
                let id = u16::from_be_bytes([icmp.payload()[0], icmp.payload()[1]]);
                Ok(Tuple {
                    src: TransportAddress::v6(src_addr, id),
                    dst: TransportAddress::v6(dst_addr, id),
                    l3: L3::V6,
                    l4: L4Protocol::Icmp,
                })
            } else {
                extract_ipv6_icmp_error(icmp.payload())
            }
        }
        other => Err(TupleError::UnsupportedProtocol(other.0)),
    }
}

fn extract_ipv6_icmp_error(inner_bytes: &[u8]) -> Result<Tuple, TupleError> {
    let inner = Ipv6Packet::new(inner_bytes).ok_or(TupleError::Truncated)?;
    let (protocol, inner_payload) =
        skip_ipv6_extension_headers(inner.get_next_header(), inner.payload())?;
    match protocol {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(inner_payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v6(inner.get_destination(), tcp.get_destination()),
                dst: TransportAddress::v6(inner.get_source(), tcp.get_source()),
                l3: L3::V6,
                l4: L4Protocol::Tcp,
            })
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(inner_payload).ok_or(TupleError::Truncated)?;
            Ok(Tuple {
                src: TransportAddress::v6(inner.get_destination(), udp.get_destination()),
                dst: TransportAddress::v6(inner.get_source(), udp.get_source()),
                l3: L3::V6,
                l4: L4Protocol::Udp,
            })
        }
        IpNextHeaderProtocols::Icmpv6 => {
            if inner_payload.len() < 2 {
                return Err(TupleError::Truncated);
            }
            if !icmpv6_is_informational(inner_payload[0]) {
                return Err(TupleError::NestedIcmpError);
            }
            let id = u16::from_be_bytes([inner_payload[4], inner_payload[5]]);
            Ok(Tuple {
                src: TransportAddress::v6(inner.get_destination(), id),
                dst: TransportAddress::v6(inner.get_source(), id),
                l3: L3::V6,
                l4: L4Protocol::Icmp,
            })
        }
        other => Err(TupleError::UnsupportedProtocol(other.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packet::ipv4::MutableIpv4Packet;
    use pnet_packet::ipv6::MutableIpv6Packet;
    use pnet_packet::udp::MutableUdpPacket;

    #[test]
    fn extracts_ipv4_udp_tuple() {
        let mut buffer = vec![0u8; Ipv4Packet::minimum_packet_size() + UdpPacket::minimum_packet_size()];
        let mut packet = MutableIpv4Packet::new(&mut buffer).unwrap();
        packet.set_version(4);
        packet.set_header_length(5);
        packet.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        packet.set_source("192.0.2.1".parse().unwrap());
        packet.set_destination("192.0.2.2".parse().unwrap());
        packet.set_total_length(buffer.len() as u16);
        {
            let mut udp = MutableUdpPacket::new(packet.payload_mut()).unwrap();
            udp.set_source(1000);
            udp.set_destination(2000);
        }

        let packet = Ipv4Packet::new(&buffer).unwrap();
        let tuple = extract_ipv4(&packet).unwrap();
        assert_eq!(tuple.src, TransportAddress::v4("192.0.2.1".parse().unwrap(), 1000));
        assert_eq!(tuple.dst, TransportAddress::v4("192.0.2.2".parse().unwrap(), 2000));
        assert_eq!(tuple.l4, L4Protocol::Udp);
    }

    #[test]
    fn extracts_ipv6_udp_tuple_with_no_extension_headers() {
        let mut buffer = vec![0u8; Ipv6Packet::minimum_packet_size() + UdpPacket::minimum_packet_size()];
        let mut packet = MutableIpv6Packet::new(&mut buffer).unwrap();
        packet.set_version(6);
        packet.set_next_header(IpNextHeaderProtocols::Udp);
        packet.set_source("2001:db8::1".parse().unwrap());
        packet.set_destination("2001:db8::2".parse().unwrap());
        packet.set_payload_length(UdpPacket::minimum_packet_size() as u16);
        {
            let mut udp = MutableUdpPacket::new(packet.payload_mut()).unwrap();
            udp.set_source(1000);
            udp.set_destination(2000);
        }

        let packet = Ipv6Packet::new(&buffer).unwrap();
        let tuple = extract_ipv6(&packet).unwrap();
        assert_eq!(tuple.l3, L3::V6);
        assert_eq!(tuple.l4, L4Protocol::Udp);
    }

    #[test]
    fn icmp_error_wrapping_icmp_error_is_rejected() {
        // Inner ICMP error (type 3, Destination Unreachable) embedded in an
        // outer Time Exceeded: nesting is forbidden.
        let mut inner_icmp_payload = vec![0u8; 8];
        inner_icmp_payload[0] = 3; // Destination Unreachable

        let mut inner_ip_buffer = vec![0u8; Ipv4Packet::minimum_packet_size() + 8];
        let mut inner_ip = MutableIpv4Packet::new(&mut inner_ip_buffer).unwrap();
        inner_ip.set_version(4);
        inner_ip.set_header_length(5);
        inner_ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        inner_ip.set_total_length(inner_ip_buffer.len() as u16);
        inner_ip.set_payload(&inner_icmp_payload);

        assert_eq!(
            extract_ipv4_icmp_error(&inner_ip_buffer),
            Err(TupleError::NestedIcmpError)
        );
    }
}
