//! Post-translation fragmentation, v4→v6 only (§4.8).
//!
//! `pnet_packet` has no Fragment-extension-header builder, so the 8-byte
//! header is assembled by hand the same way `interproto`'s `ip.rs` hand-sets
//! fields pnet doesn't model for us.

use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv6::{Ipv6Packet, MutableIpv6Packet};
use pnet_packet::Packet;

const FRAGMENT_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("packet too short to contain an IPv6 header")]
    TooShort,
    #[error("min_ipv6_mtu is too small to carry even one 8-byte fragment")]
    MtuTooSmall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Within MTU; forward as-is.
    Whole(Vec<u8>),
    /// Split into fragments each within `min_ipv6_mtu`, in order, the last
    /// carrying M=0.
    Fragments(Vec<Vec<u8>>),
    /// The original v4 packet had DF=1; caller must drop and emit an
    /// ICMPv4 Fragmentation Needed with this next-hop MTU.
    NeedsIcmpFragmentationNeeded { next_hop_mtu: u16 },
}

fn build_fragment_header(next_header: u8, offset_in_units_of_8: u16, more_fragments: bool, id: u32) -> [u8; FRAGMENT_HEADER_LEN] {
    let mut header = [0u8; FRAGMENT_HEADER_LEN];
    header[0] = next_header;
    header[1] = 0;
    let offset_and_flags = (offset_in_units_of_8 << 3) | u16::from(more_fragments);
    header[2..4].copy_from_slice(&offset_and_flags.to_be_bytes());
    header[4..8].copy_from_slice(&id.to_be_bytes());
    header
}

/// Fragments `packet` (a complete IPv6 datagram) to fit within
/// `min_ipv6_mtu`, or reports that the original packet's DF bit forbids it.
pub fn fragment_ipv6(
    packet: &[u8],
    min_ipv6_mtu: usize,
    df: bool,
    fragment_id: u32,
) -> Result<FragmentOutcome, FragmentError> {
    if packet.len() <= min_ipv6_mtu {
        return Ok(FragmentOutcome::Whole(packet.to_vec()));
    }
    if df {
        return Ok(FragmentOutcome::NeedsIcmpFragmentationNeeded {
            next_hop_mtu: (min_ipv6_mtu - 20) as u16,
        });
    }

    let ipv6 = Ipv6Packet::new(packet).ok_or(FragmentError::TooShort)?;
    let header_len = Ipv6Packet::minimum_packet_size();
    let next_header = ipv6.get_next_header();
    let payload = ipv6.payload();
    let header_bytes = packet[..header_len].to_vec();

    let max_chunk = ((min_ipv6_mtu - header_len - FRAGMENT_HEADER_LEN) / 8) * 8;
    if max_chunk == 0 {
        return Err(FragmentError::MtuTooSmall);
    }

    let mut fragments = Vec::new();
    let mut offset = 0usize;
    while offset < payload.len() {
        let chunk_len = max_chunk.min(payload.len() - offset);
        let is_last = offset + chunk_len >= payload.len();

        let mut buffer = vec![0u8; header_len + FRAGMENT_HEADER_LEN + chunk_len];
        buffer[..header_len].copy_from_slice(&header_bytes);
        {
            let mut v6 = MutableIpv6Packet::new(&mut buffer).expect("buffer sized for the v6 header");
            v6.set_next_header(IpNextHeaderProtocols::Ipv6Frag);
            v6.set_payload_length((FRAGMENT_HEADER_LEN + chunk_len) as u16);
        }
        let frag_header = build_fragment_header(next_header.0, (offset / 8) as u16, !is_last, fragment_id);
        buffer[header_len..header_len + FRAGMENT_HEADER_LEN].copy_from_slice(&frag_header);
        buffer[header_len + FRAGMENT_HEADER_LEN..].copy_from_slice(&payload[offset..offset + chunk_len]);

        fragments.push(buffer);
        offset += chunk_len;
    }

    Ok(FragmentOutcome::Fragments(fragments))
}
