//! Pipeline orchestration: steps 1-5 of §2's packet flow, tying together
//! tuple extraction, filtering, address computation, header translation,
//! and fragmentation.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::Instant;

use pnet_packet::icmp::{IcmpPacket, IcmpTypes, MutableIcmpPacket};
use pnet_packet::icmpv6::MutableIcmpv6Packet;
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{Ipv4Packet, MutableIpv4Packet};
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::tcp::{MutableTcpPacket, TcpPacket};
use pnet_packet::udp::MutableUdpPacket;
use pnet_packet::Packet;

use crate::config::SharedConfig;
use crate::db::Nat64Db;
use crate::error::Verdict;
use crate::filter::{filter_and_update, FilterContext, FilterOutcome, TcpFlags};
use crate::fragment::{fragment_ipv6, FragmentOutcome};
use crate::metrics;
use crate::packet_store::PacketStore;
use crate::pool4::Pool4;
use crate::pool6::Pool6;
use crate::tuple::{extract_ipv4, extract_ipv6, L3, L4Protocol};

/// What the caller should do with the result of running a packet through
/// the pipeline.
pub enum Outcome {
    /// Forward these packets (more than one only on v4->v6 fragmentation).
    Forward(Vec<Vec<u8>>),
    Verdict(Verdict),
}

pub struct Pipeline<'a> {
    pub db: &'a Nat64Db,
    pub pool4: &'a Mutex<Pool4>,
    pub pool6: &'a Pool6,
    pub packet_store: &'a PacketStore,
    pub config: &'a SharedConfig,
}

impl<'a> Pipeline<'a> {
    fn ctx(&self) -> FilterContext<'a> {
        FilterContext {
            db: self.db,
            pool4: self.pool4,
            pool6: self.pool6,
            packet_store: self.packet_store,
        }
    }

    /// Processes one ingress IPv6 packet (v6->v4 direction).
    pub fn process_ipv6(&self, packet: &[u8], now: Instant) -> Outcome {
        let Some(ip) = Ipv6Packet::new(packet) else {
            metrics::record_dropped(L3::V6);
            return Outcome::Verdict(Verdict::Drop);
        };
        let Ok(tuple) = extract_ipv6(&ip) else {
            metrics::record_dropped(L3::V6);
            return Outcome::Verdict(Verdict::Drop);
        };

        let config = self.config.load();
        let tcp_flags = (tuple.l4 == L4Protocol::Tcp).then(|| tcp_flags_best_effort(ip.payload()));

        let outcome = filter_and_update(&self.ctx(), &config, &tuple, tcp_flags, packet, now);
        let translated_local = match outcome {
            FilterOutcome::Drop => {
                metrics::record_dropped(L3::V6);
                return Outcome::Verdict(Verdict::Drop);
            }
            FilterOutcome::Stolen => return Outcome::Verdict(Verdict::Stolen),
            FilterOutcome::Forward { translated_local } => translated_local,
        };

        let IpAddr::V4(new_source) = translated_local.addr else {
            log::error!("BUG: v6->v4 filter produced a non-v4 local address");
            metrics::record_dropped(L3::V6);
            return Outcome::Verdict(Verdict::Drop);
        };
        let IpAddr::V6(dst_v6) = tuple.dst.addr else {
            metrics::record_dropped(L3::V6);
            return Outcome::Verdict(Verdict::Drop);
        };
        let Ok(new_destination) = self.pool6.translate_v6_to_v4(dst_v6) else {
            metrics::record_dropped(L3::V6);
            return Outcome::Verdict(Verdict::Drop);
        };

        match interproto::translate_ipv6_to_ipv4(packet, new_source, new_destination, &config.translation) {
            Ok(translated) => {
                let translated = patch_v4_local_id(translated, tuple.l4, translated_local.id);
                metrics::record_forwarded(L3::V6);
                Outcome::Forward(vec![translated])
            }
            Err(interproto::Error::TtlExpired) => {
                log::debug!("dropping v6->v4 packet: hop limit expired");
                metrics::record_dropped(L3::V6);
                Outcome::Verdict(Verdict::Drop)
            }
            Err(err) => {
                log::warn!("v6->v4 translation failed: {err}");
                metrics::record_dropped(L3::V6);
                Outcome::Verdict(Verdict::Drop)
            }
        }
    }

    /// Processes one ingress IPv4 packet (v4->v6 direction).
    pub fn process_ipv4(&self, packet: &[u8], now: Instant) -> Outcome {
        let Some(ip) = Ipv4Packet::new(packet) else {
            metrics::record_dropped(L3::V4);
            return Outcome::Verdict(Verdict::Drop);
        };
        let Ok(tuple) = extract_ipv4(&ip) else {
            metrics::record_dropped(L3::V4);
            return Outcome::Verdict(Verdict::Drop);
        };

        let config = self.config.load();
        let tcp_flags = (tuple.l4 == L4Protocol::Tcp).then(|| tcp_flags_best_effort(ip.payload()));

        let outcome = filter_and_update(&self.ctx(), &config, &tuple, tcp_flags, packet, now);
        let translated_local = match outcome {
            FilterOutcome::Drop => {
                metrics::record_dropped(L3::V4);
                return Outcome::Verdict(Verdict::Drop);
            }
            FilterOutcome::Stolen => return Outcome::Verdict(Verdict::Stolen),
            FilterOutcome::Forward { translated_local } => translated_local,
        };

        let IpAddr::V6(new_destination) = translated_local.addr else {
            log::error!("BUG: v4->v6 filter produced a non-v6 local address");
            metrics::record_dropped(L3::V4);
            return Outcome::Verdict(Verdict::Drop);
        };
        let IpAddr::V4(src_v4) = tuple.src.addr else {
            metrics::record_dropped(L3::V4);
            return Outcome::Verdict(Verdict::Drop);
        };
        let Ok(new_source) = self.pool6.translate_v4_to_v6(src_v4) else {
            metrics::record_dropped(L3::V4);
            return Outcome::Verdict(Verdict::Drop);
        };

        let translated = match interproto::translate_ipv4_to_ipv6(packet, new_source, new_destination, &config.translation) {
            Ok(translated) => patch_v6_local_id(translated, tuple.l4, translated_local.id),
            Err(interproto::Error::TtlExpired) => {
                log::debug!("dropping v4->v6 packet: TTL expired");
                metrics::record_dropped(L3::V4);
                return Outcome::Verdict(Verdict::Drop);
            }
            Err(err) => {
                log::warn!("v4->v6 translation failed: {err}");
                metrics::record_dropped(L3::V4);
                return Outcome::Verdict(Verdict::Drop);
            }
        };

        let df = ip.get_flags() & 0x2 != 0;
        let fragment_id = u32::from(ip.get_identification());
        match fragment_ipv6(&translated, config.translation.min_ipv6_mtu as usize, df, fragment_id) {
            Ok(FragmentOutcome::Whole(packet)) => {
                metrics::record_forwarded(L3::V4);
                Outcome::Forward(vec![packet])
            }
            Ok(FragmentOutcome::Fragments(fragments)) => {
                metrics::record_forwarded(L3::V4);
                Outcome::Forward(fragments)
            }
            Ok(FragmentOutcome::NeedsIcmpFragmentationNeeded { next_hop_mtu }) => {
                let icmp = build_fragmentation_needed(packet, &ip, next_hop_mtu);
                metrics::record_forwarded(L3::V4);
                Outcome::Forward(vec![icmp])
            }
            Err(err) => {
                log::warn!("fragmentation failed: {err}");
                metrics::record_dropped(L3::V4);
                Outcome::Verdict(Verdict::Drop)
            }
        }
    }
}

/// Reads SYN/FIN/RST off a TCP header found at the start of `payload`,
/// without walking extension headers — sufficient for the common case of
/// no IPv6 extension headers between the IP header and TCP.
fn tcp_flags_best_effort(payload: &[u8]) -> TcpFlags {
    let Some(tcp) = TcpPacket::new(payload) else {
        return TcpFlags::default();
    };
    let flags = tcp.get_flags();
    TcpFlags {
        syn: flags & pnet_packet::tcp::TcpFlags::SYN != 0,
        fin: flags & pnet_packet::tcp::TcpFlags::FIN != 0,
        rst: flags & pnet_packet::tcp::TcpFlags::RST != 0,
    }
}

/// Builds an ICMPv4 "Fragmentation Needed" (Destination Unreachable, code
/// 4) error back to the original v4 sender, carrying the offending packet's
/// header plus 8 bytes as its inner payload (§4.8).
fn build_fragmentation_needed(original_packet: &[u8], original: &Ipv4Packet, next_hop_mtu: u16) -> Vec<u8> {
    let header_len = (original.get_header_length() as usize) * 4;
    let inner_len = (header_len + 8).min(original_packet.len());
    let inner = &original_packet[..inner_len];

    let icmp_payload_len = 4 + inner.len();
    let mut icmp_buffer = vec![0u8; IcmpPacket::minimum_packet_size() + icmp_payload_len];
    {
        let mut icmp = MutableIcmpPacket::new(&mut icmp_buffer).expect("buffer sized for ICMP header + payload");
        icmp.set_icmp_type(IcmpTypes::DestinationUnreachable);
        icmp.set_icmp_code(pnet_packet::icmp::IcmpCode(4));
        let payload = icmp.payload_mut();
        payload[2..4].copy_from_slice(&next_hop_mtu.to_be_bytes());
        payload[4..].copy_from_slice(inner);
        icmp.set_checksum(pnet_packet::icmp::checksum(&icmp.to_immutable()));
    }

    let total_len = Ipv4Packet::minimum_packet_size() + icmp_buffer.len();
    let mut buffer = vec![0u8; total_len];
    let mut v4 = MutableIpv4Packet::new(&mut buffer).expect("buffer sized for v4 header + ICMP");
    v4.set_version(4);
    v4.set_header_length(5);
    v4.set_ttl(64);
    v4.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
    v4.set_source(original.get_destination());
    v4.set_destination(original.get_source());
    v4.set_total_length(total_len as u16);
    v4.set_payload(&icmp_buffer);
    v4.set_checksum(pnet_packet::ipv4::checksum(&v4.to_immutable()));

    buffer
}

/// `interproto` only ever rewrites addresses and recomputes checksums — the
/// BIB-assigned port (or ICMP query id) still has to be patched in by hand
/// afterwards, since RFC 6146's "transport address" is address-plus-port.
/// Left unpatched for ICMP *errors*, whose embedded flow lives at a nested
/// offset this doesn't walk into.
fn patch_v4_local_id(mut packet: Vec<u8>, protocol: L4Protocol, new_id: u16) -> Vec<u8> {
    let header_len = Ipv4Packet::minimum_packet_size();
    if packet.len() < header_len {
        return packet;
    }
    let Some((source, destination, next_proto)) =
        Ipv4Packet::new(&packet).map(|v4| (v4.get_source(), v4.get_destination(), v4.get_next_level_protocol()))
    else {
        return packet;
    };
    // An ICMP error carrying this flow inside it translates to an outer
    // ICMP packet, not TCP/UDP — only patch when the outer header still
    // matches what the tuple says it should be.
    match (protocol, next_proto) {
        (L4Protocol::Tcp, IpNextHeaderProtocols::Tcp) => {
            if let Some(mut tcp) = MutableTcpPacket::new(&mut packet[header_len..]) {
                tcp.set_source(new_id);
            }
            if let Ok(recalced) = interproto::protocols::tcp::recalculate_tcp_checksum_ipv4(&packet[header_len..], source, destination) {
                packet[header_len..].copy_from_slice(&recalced);
            }
        }
        (L4Protocol::Udp, IpNextHeaderProtocols::Udp) => {
            if let Some(mut udp) = MutableUdpPacket::new(&mut packet[header_len..]) {
                udp.set_source(new_id);
            }
            if let Ok(recalced) = interproto::protocols::udp::recalculate_udp_checksum_ipv4(&packet[header_len..], source, destination) {
                packet[header_len..].copy_from_slice(&recalced);
            }
        }
        (L4Protocol::Icmp, IpNextHeaderProtocols::Icmp) => {
            let segment = &mut packet[header_len..];
            if segment.len() >= 6 && matches!(segment[0], 0 | 8) {
                segment[4..6].copy_from_slice(&new_id.to_be_bytes());
                if let Some(mut icmp) = MutableIcmpPacket::new(segment) {
                    icmp.set_checksum(0);
                    let checksum = pnet_packet::icmp::checksum(&icmp.to_immutable());
                    icmp.set_checksum(checksum);
                }
            }
        }
        _ => {}
    }
    packet
}

/// Mirror of [`patch_v4_local_id`] for the v4->v6 direction, patching the
/// *destination* port/id (the v6 side is always the session's local side
/// on this path).
fn patch_v6_local_id(mut packet: Vec<u8>, protocol: L4Protocol, new_id: u16) -> Vec<u8> {
    let header_len = Ipv6Packet::minimum_packet_size();
    if packet.len() < header_len {
        return packet;
    }
    let Some((source, destination, next_proto)) =
        Ipv6Packet::new(&packet).map(|v6| (v6.get_source(), v6.get_destination(), v6.get_next_header()))
    else {
        return packet;
    };
    match (protocol, next_proto) {
        (L4Protocol::Tcp, IpNextHeaderProtocols::Tcp) => {
            if let Some(mut tcp) = MutableTcpPacket::new(&mut packet[header_len..]) {
                tcp.set_destination(new_id);
            }
            if let Ok(recalced) = interproto::protocols::tcp::recalculate_tcp_checksum_ipv6(&packet[header_len..], source, destination) {
                packet[header_len..].copy_from_slice(&recalced);
            }
        }
        (L4Protocol::Udp, IpNextHeaderProtocols::Udp) => {
            if let Some(mut udp) = MutableUdpPacket::new(&mut packet[header_len..]) {
                udp.set_destination(new_id);
            }
            if let Ok(recalced) = interproto::protocols::udp::recalculate_udp_checksum_ipv6(&packet[header_len..], source, destination) {
                packet[header_len..].copy_from_slice(&recalced);
            }
        }
        (L4Protocol::Icmp, IpNextHeaderProtocols::Icmpv6) => {
            let segment = &mut packet[header_len..];
            if segment.len() >= 6 && matches!(segment[0], 128 | 129) {
                segment[4..6].copy_from_slice(&new_id.to_be_bytes());
                if let Some(mut icmpv6) = MutableIcmpv6Packet::new(segment) {
                    icmpv6.set_checksum(0);
                    let checksum = pnet_packet::icmpv6::checksum(&icmpv6.to_immutable(), &source, &destination);
                    icmpv6.set_checksum(checksum);
                }
            }
        }
        _ => {}
    }
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tuple::TransportAddress;
    use pnet_packet::ipv4::MutableIpv4Packet;
    use pnet_packet::ipv6::MutableIpv6Packet;
    use pnet_packet::udp::MutableUdpPacket;

    fn pipeline_pieces() -> (Nat64Db, Mutex<Pool4>, Pool6, PacketStore, SharedConfig) {
        (
            Nat64Db::new(),
            Mutex::new(Pool4::new(&["192.168.2.0/29".parse().unwrap()])),
            Pool6::new(vec!["64:ff9b::/96".parse().unwrap()]),
            PacketStore::new(8),
            SharedConfig::default(),
        )
    }

    #[test]
    fn new_v6_udp_flow_translates_to_v4() {
        let (db, pool4, pool6, store, config) = pipeline_pieces();
        let pipeline = Pipeline { db: &db, pool4: &pool4, pool6: &pool6, packet_store: &store, config: &config };

        let mut buffer = vec![0u8; Ipv6Packet::minimum_packet_size() + 8 + 2];
        let mut packet = MutableIpv6Packet::new(&mut buffer).unwrap();
        packet.set_version(6);
        packet.set_next_header(IpNextHeaderProtocols::Udp);
        packet.set_hop_limit(64);
        packet.set_payload_length(10);
        packet.set_source("2001:db8::1".parse().unwrap());
        packet.set_destination("64:ff9b::c000:201".parse().unwrap());
        {
            let mut udp = MutableUdpPacket::new(packet.payload_mut()).unwrap();
            udp.set_source(1000);
            udp.set_destination(32768);
            udp.set_length(10);
            udp.set_payload(b"hi");
        }

        match pipeline.process_ipv6(&buffer, Instant::now()) {
            Outcome::Forward(packets) => {
                assert_eq!(packets.len(), 1);
                let out = Ipv4Packet::new(&packets[0]).unwrap();
                assert_eq!(out.get_destination(), Ipv4Addr::new(192, 0, 2, 1));
            }
            Outcome::Verdict(v) => panic!("expected forward, got {v:?}"),
        }
    }
}
