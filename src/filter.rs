//! Filtering & session/BIB update (§4.3, RFC 6146 §3.5).
//!
//! This is step 2 of the pipeline: given the incoming tuple, decide whether
//! the flow is allowed, and bring the BIB/session tables up to date for it.
//! Address-family translation and header rewriting happen later
//! (`translate.rs`); this module only ever touches `db.rs`, `pool4.rs` and
//! `packet_store.rs`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::bib::BibEntry;
use crate::config::{Config, FilteringFlags};
use crate::db::Nat64Db;
use crate::packet_store::PacketStore;
use crate::pool4::Pool4Error;
use crate::pool6::Pool6;
use crate::session::{ExpirerClass, Pair, TcpEvent, TcpState};
use crate::tuple::{L3, L4Protocol, Tuple, TransportAddress};

/// TCP flags relevant to the state machine, extracted by the caller from
/// the parsed TCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    /// `Rst`/`Data` are direction-independent; SYN/FIN are not (the state
    /// machine distinguishes `V4Syn` from `V6Syn`), so the caller resolves
    /// those itself from `self.syn`/`self.fin` plus ingress direction.
    fn event(self) -> Option<TcpEvent> {
        if self.rst {
            Some(TcpEvent::Rst)
        } else if self.syn || self.fin {
            None
        } else {
            Some(TcpEvent::Data)
        }
    }
}

/// Outcome of filtering, distinct from [`crate::error::Verdict`] because
/// some outcomes (`Stolen`) carry data the caller must act on.
pub enum FilterOutcome {
    /// Proceed to translation; `translated_local` is the resolved address
    /// on the egress side (v4 if ingress was v6, and vice versa).
    Forward { translated_local: TransportAddress },
    Drop,
    /// The packet was handed to the packet store; caller must not use it
    /// again.
    Stolen,
}

/// Shared tables the filter needs read/write access to. Grouped so
/// `filter_and_update`'s signature doesn't grow every time a new table is
/// added.
pub struct FilterContext<'a> {
    pub db: &'a Nat64Db,
    pub pool4: &'a std::sync::Mutex<crate::pool4::Pool4>,
    pub pool6: &'a Pool6,
    pub packet_store: &'a PacketStore,
}

/// Runs §4.3's filtering/state-update logic for one ingress packet.
///
/// `tcp_flags` is `None` for UDP/ICMP; `raw_packet` is only consulted (and
/// only cloned) on the TCP Simultaneous-Open storage path.
pub fn filter_and_update(
    ctx: &FilterContext,
    config: &Config,
    tuple: &Tuple,
    tcp_flags: Option<TcpFlags>,
    raw_packet: &[u8],
    now: Instant,
) -> FilterOutcome {
    match tuple.l4 {
        L4Protocol::Udp => filter_udp(ctx, &config.filtering, tuple, ExpirerClass::Udp, now),
        L4Protocol::Icmp => filter_icmp(ctx, config, tuple, now),
        L4Protocol::Tcp => filter_tcp(ctx, config, tuple, tcp_flags.unwrap_or_default(), raw_packet, now),
    }
}

fn v6_to_v4_direction(tuple: &Tuple) -> bool {
    matches!(tuple.l3, L3::V6)
}

/// UDP and ICMP-informational share this shape (§4.3): the only difference
/// is which expirer class and which config flag ("drop inbound informational")
/// applies, both supplied by the caller.
fn filter_udp(
    ctx: &FilterContext,
    flags: &FilteringFlags,
    tuple: &Tuple,
    expirer: ExpirerClass,
    now: Instant,
) -> FilterOutcome {
    if v6_to_v4_direction(tuple) {
        let bib = get_or_create_bib(ctx, tuple.src, tuple.l4);
        let Ok(bib) = bib else {
            return FilterOutcome::Drop;
        };
        let v6_pair = Pair::new(tuple.src, tuple.dst);
        let v4_pair = Pair::new(bib.v4, remote_under(tuple.dst, ctx.pool6));
        touch_or_create(ctx, v6_pair, v4_pair, tuple.l4, bib.clone(), expirer, now);
        FilterOutcome::Forward { translated_local: bib.v4 }
    } else {
        let Some(bib) = ctx.db.get_bib_by_v4(tuple.dst, tuple.l4) else {
            return FilterOutcome::Drop;
        };
        if flags.address_dependent_filtering && !allow(ctx, tuple) {
            return FilterOutcome::Drop;
        }
        let v4_pair = Pair::new(tuple.dst, tuple.src);
        touch_inbound(ctx, v4_pair, tuple.l4, expirer, now);
        FilterOutcome::Forward { translated_local: bib.v6 }
    }
}

fn filter_icmp(ctx: &FilterContext, config: &Config, tuple: &Tuple, now: Instant) -> FilterOutcome {
    if v6_to_v4_direction(tuple) && config.filtering.drop_icmpv6_info {
        return FilterOutcome::Drop;
    }
    filter_udp(ctx, &config.filtering, tuple, ExpirerClass::Icmp, now)
}

fn filter_tcp(
    ctx: &FilterContext,
    config: &Config,
    tuple: &Tuple,
    flags: TcpFlags,
    raw_packet: &[u8],
    now: Instant,
) -> FilterOutcome {
    let v6_direction = v6_to_v4_direction(tuple);

    if v6_direction {
        let v6_pair = Pair::new(tuple.src, tuple.dst);
        if let Some((v4_pair, state)) = ctx.db.get_session_by_v6(v6_pair, L4Protocol::Tcp) {
            let event = flags.event().unwrap_or(if flags.fin { TcpEvent::V6Fin } else { TcpEvent::V6Syn });
            advance(ctx, v6_pair, state, event, now);
            return FilterOutcome::Forward { translated_local: v4_pair.local };
        }

        // No session: either a fresh v6 SYN, or a v6 SYN racing a stored v4
        // SYN (Simultaneous Open).
        if !flags.syn {
            return FilterOutcome::Drop;
        }
        let Ok(bib) = get_or_create_bib(ctx, tuple.src, L4Protocol::Tcp) else {
            return FilterOutcome::Drop;
        };
        let v4_remote = remote_under(tuple.dst, ctx.pool6);
        let v4_pair = Pair::new(bib.v4, v4_remote);

        if let Some(stored) = ctx.packet_store.take_matching(v4_pair) {
            log::debug!("discarding stored v4 SYN: matching v6 SYN arrived");
            drop(stored);
            ctx.db.add_session(
                v6_pair,
                v4_pair,
                L4Protocol::Tcp,
                bib,
                ExpirerClass::TcpEst,
                now,
            );
            ctx.db.touch(v6_pair, L4Protocol::Tcp, now, Some(TcpState::Established), Some(ExpirerClass::TcpEst));
        } else {
            ctx.db.add_session(
                v6_pair,
                v4_pair,
                L4Protocol::Tcp,
                bib,
                ExpirerClass::TcpTrans,
                now,
            );
            ctx.db.touch(v6_pair, L4Protocol::Tcp, now, Some(TcpState::V6Init), None);
        }
        FilterOutcome::Forward { translated_local: bib.v4 }
    } else {
        let v4_pair = Pair::new(tuple.dst, tuple.src);
        if let Some((v6_pair, state)) = ctx.db.get_session_by_v4(v4_pair, L4Protocol::Tcp) {
            let event = flags.event().unwrap_or(if flags.fin { TcpEvent::V4Fin } else { TcpEvent::V4Syn });
            advance(ctx, v6_pair, state, event, now);
            let v6_local = ctx.db.get_session_by_v6(v6_pair, L4Protocol::Tcp).map(|(p, _)| p.local);
            return match v6_local {
                Some(local) => FilterOutcome::Forward { translated_local: local },
                None => FilterOutcome::Drop,
            };
        }

        if !flags.syn || config.filtering.drop_external_tcp {
            return FilterOutcome::Drop;
        }
        if ctx.packet_store.try_store(v4_pair, raw_packet.to_vec(), now) {
            FilterOutcome::Stolen
        } else {
            FilterOutcome::Drop
        }
    }
}

fn advance(ctx: &FilterContext, v6_pair: Pair, state: TcpState, event: TcpEvent, now: Instant) {
    let (next, expirer) = state.transition(event);
    ctx.db.touch(v6_pair, L4Protocol::Tcp, now, Some(next), Some(expirer));
}

/// Looks up or creates the BIB entry for an outbound (v6→v4) flow.
fn get_or_create_bib(
    ctx: &FilterContext,
    v6_local: TransportAddress,
    protocol: L4Protocol,
) -> Result<Arc<BibEntry>, Pool4Error> {
    if let Some(existing) = ctx.db.get_bib_by_v6(v6_local, protocol) {
        return Ok(existing);
    }
    let v4 = ctx.pool4.lock().unwrap().allocate(protocol, v6_local.id)?;
    Ok(ctx.db.add_bib(BibEntry::new(v6_local, v4, protocol, false)))
}

/// Computes the v4-side remote transport address a v6-side remote maps to:
/// the pool6-embedded v4 form of its address, same port/id.
fn remote_under(v6_remote: TransportAddress, pool6: &Pool6) -> TransportAddress {
    let IpAddr::V6(addr) = v6_remote.addr else {
        return v6_remote;
    };
    match pool6.translate_v6_to_v4(addr) {
        Ok(v4_addr) => TransportAddress::v4(v4_addr, v6_remote.id),
        Err(_) => v6_remote,
    }
}

fn touch_or_create(
    ctx: &FilterContext,
    v6_pair: Pair,
    v4_pair: Pair,
    protocol: L4Protocol,
    bib: Arc<BibEntry>,
    expirer: ExpirerClass,
    now: Instant,
) {
    if ctx.db.get_session_by_v6(v6_pair, protocol).is_some() {
        ctx.db.touch(v6_pair, protocol, now, None, Some(expirer));
    } else {
        ctx.db.add_session(v6_pair, v4_pair, protocol, bib, expirer, now);
    }
}

fn touch_inbound(ctx: &FilterContext, v4_pair: Pair, protocol: L4Protocol, expirer: ExpirerClass, now: Instant) {
    if let Some((v6_pair, _)) = ctx.db.get_session_by_v4(v4_pair, protocol) {
        ctx.db.touch(v6_pair, protocol, now, None, Some(expirer));
    }
}

/// `allow(v4-tuple)` (§4.4): true iff a session exists whose `(local,
/// remote.address)` matches, ignoring the remote port.
fn allow(ctx: &FilterContext, tuple: &Tuple) -> bool {
    let v4_pair = Pair::new(tuple.dst, tuple.src);
    ctx.db.get_session_by_v4(v4_pair, tuple.l4).is_some()
}
