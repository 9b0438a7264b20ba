//! The live session/BIB database (§3, §4.4).
//!
//! Sessions are stored once, keyed by their v6-side pair, and indexed a
//! second time by their v4-side pair so a lookup from either family is a
//! single tree descent. BIB entries follow the same shape. Expiration uses
//! one FIFO per [`ExpirerClass`]: entries are appended on creation and on
//! every touch without removing the old occurrence, and the walk at pop
//! time discards any occurrence whose recorded timestamp no longer matches
//! the live entry's `update_time` (it's been superseded by a later touch).
//! Because touches only move a session later in wall-clock time, the FIFO
//! stays sorted and the walk can stop at the first still-fresh entry.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::bib::BibEntry;
use crate::session::{ExpirerClass, ExpiryAction, Pair, SessionEntry, TcpState};
use crate::tuple::{L4Protocol, TransportAddress};

/// The expirer never sleeps less than this between walks, regardless of how
/// soon the next entry is due, so a burst of touches can't turn the
/// background walk into a busy loop.
pub const MIN_TIMER_SLEEP: Duration = Duration::from_millis(250);

type BibKey = (TransportAddress, L4Protocol);
type SessionKey = (Pair, L4Protocol);

struct FifoEntry {
    key: SessionKey,
    recorded_at: Instant,
}

#[derive(Default)]
struct Inner {
    bib_by_v6: BTreeMap<BibKey, Arc<BibEntry>>,
    bib_by_v4: BTreeMap<BibKey, BibKey>,
    sessions_by_v6: BTreeMap<SessionKey, SessionEntry>,
    sessions_by_v4: BTreeMap<SessionKey, SessionKey>,
    fifos: FxHashMap<ExpirerClass, VecDeque<FifoEntry>>,
}

/// Something the caller must do as a result of an expiration walk: the
/// database only decides *what* happens, the caller (translate.rs/main
/// loop) owns sending probes and generating ICMP errors.
#[derive(Debug)]
pub enum ExpiredEvent {
    SendProbe(SessionKey),
    EmitIcmpError(SessionKey),
}

/// Mutex-guarded because the pipeline runs packets from multiple worker
/// threads/tasks against one shared table.
#[derive(Default)]
pub struct Nat64Db {
    inner: Mutex<Inner>,
}

impl Nat64Db {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_bib_by_v6(&self, v6: TransportAddress, protocol: L4Protocol) -> Option<Arc<BibEntry>> {
        self.inner.lock().unwrap().bib_by_v6.get(&(v6, protocol)).cloned()
    }

    #[must_use]
    pub fn get_bib_by_v4(&self, v4: TransportAddress, protocol: L4Protocol) -> Option<Arc<BibEntry>> {
        let inner = self.inner.lock().unwrap();
        let v6_key = inner.bib_by_v4.get(&(v4, protocol))?;
        inner.bib_by_v6.get(v6_key).cloned()
    }

    /// Installs a new BIB entry. Fails if either side's key is already
    /// occupied — the caller (pool4/pool6 allocation) is responsible for
    /// never offering a colliding identifier.
    pub fn add_bib(&self, entry: BibEntry) -> Arc<BibEntry> {
        let v6_key = (entry.v6, entry.protocol);
        let v4_key = (entry.v4, entry.protocol);
        let entry = Arc::new(entry);
        let mut inner = self.inner.lock().unwrap();
        inner.bib_by_v6.insert(v6_key, entry.clone());
        inner.bib_by_v4.insert(v4_key, v6_key);
        entry
    }

    /// Removes a BIB entry and every session still referencing it. Used for
    /// administrative DELETE and for pool/prefix removal.
    pub fn delete_bib(&self, v6: TransportAddress, protocol: L4Protocol) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.bib_by_v6.remove(&(v6, protocol)) else {
            return false;
        };
        inner.bib_by_v4.remove(&(entry.v4, protocol));
        let stale_sessions: Vec<SessionKey> = inner
            .sessions_by_v6
            .iter()
            .filter(|(_, session)| Arc::ptr_eq(&session.bib, &entry))
            .map(|(key, _)| *key)
            .collect();
        for key in stale_sessions {
            remove_session_locked(&mut inner, key);
        }
        true
    }

    /// Removes every BIB entry (and its sessions) bound to `addr`. Used when
    /// an administrator shrinks the IPv4 pool out from under live traffic.
    pub fn delete_by_v4_addr(&self, addr: std::net::Ipv4Addr) {
        let keys: Vec<BibKey> = {
            let inner = self.inner.lock().unwrap();
            inner
                .bib_by_v6
                .keys()
                .filter(|(transport, _)| transport.addr == std::net::IpAddr::V4(addr))
                .copied()
                .collect()
        };
        for (v6, protocol) in keys {
            self.delete_bib(v6, protocol);
        }
    }

    /// Removes every BIB entry (and its sessions) whose v6 address falls
    /// under `prefix`. Used when an administrator removes an IPv6 prefix.
    pub fn delete_by_v6_prefix(&self, prefix: ipnet::Ipv6Net) {
        let keys: Vec<BibKey> = {
            let inner = self.inner.lock().unwrap();
            inner
                .bib_by_v6
                .keys()
                .filter(|(transport, _)| match transport.addr {
                    std::net::IpAddr::V6(addr) => prefix.contains(&addr),
                    std::net::IpAddr::V4(_) => false,
                })
                .copied()
                .collect()
        };
        for (v6, protocol) in keys {
            self.delete_bib(v6, protocol);
        }
    }

    /// Clears every session and dynamic BIB entry. Static BIB entries
    /// survive a flush — only an explicit `delete_bib` removes one.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions_by_v6.clear();
        inner.sessions_by_v4.clear();
        inner.fifos.clear();
        inner.bib_by_v6.retain(|_, entry| entry.is_static);
        let live_v6_keys: BTreeMap<BibKey, ()> = inner.bib_by_v6.keys().map(|k| (*k, ())).collect();
        inner.bib_by_v4.retain(|_, v6_key| live_v6_keys.contains_key(v6_key));
    }

    /// Number of live BIB entries for `protocol`, for the
    /// `nat64_bib_entries` gauge.
    #[must_use]
    pub fn bib_count(&self, protocol: L4Protocol) -> usize {
        self.inner.lock().unwrap().bib_by_v6.keys().filter(|(_, p)| *p == protocol).count()
    }

    /// Number of live session entries for `protocol`, for the
    /// `nat64_session_entries` gauge.
    #[must_use]
    pub fn session_count(&self, protocol: L4Protocol) -> usize {
        self.inner.lock().unwrap().sessions_by_v6.keys().filter(|(_, p)| *p == protocol).count()
    }

    #[must_use]
    pub fn get_session_by_v6(&self, pair: Pair, protocol: L4Protocol) -> Option<(Pair, TcpState)> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions_by_v6
            .get(&(pair, protocol))
            .map(|s| (s.v4_pair, s.tcp_state))
    }

    #[must_use]
    pub fn get_session_by_v4(&self, pair: Pair, protocol: L4Protocol) -> Option<(Pair, TcpState)> {
        let inner = self.inner.lock().unwrap();
        let v6_key = inner.sessions_by_v4.get(&(pair, protocol))?;
        inner
            .sessions_by_v6
            .get(v6_key)
            .map(|s| (s.v6_pair, s.tcp_state))
    }

    /// Creates a session bound to `bib`, files it under its initial
    /// expirer class, and pushes the first FIFO entry.
    pub fn add_session(
        &self,
        v6_pair: Pair,
        v4_pair: Pair,
        protocol: L4Protocol,
        bib: Arc<BibEntry>,
        expirer: ExpirerClass,
        now: Instant,
    ) {
        let session = SessionEntry::new(v6_pair, v4_pair, protocol, bib, expirer, now);
        let v6_key = (v6_pair, protocol);
        let v4_key = (v4_pair, protocol);

        let mut inner = self.inner.lock().unwrap();
        inner.sessions_by_v6.insert(v6_key, session);
        inner.sessions_by_v4.insert(v4_key, v6_key);
        inner
            .fifos
            .entry(expirer)
            .or_default()
            .push_back(FifoEntry { key: v6_key, recorded_at: now });
    }

    /// Refreshes a session's `update_time`, optionally moving it to a new
    /// TCP state/expirer class, and re-files it at the back of that class's
    /// FIFO (§4.3).
    pub fn touch(
        &self,
        v6_pair: Pair,
        protocol: L4Protocol,
        now: Instant,
        new_state: Option<TcpState>,
        new_expirer: Option<ExpirerClass>,
    ) {
        let v6_key = (v6_pair, protocol);
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.sessions_by_v6.get_mut(&v6_key) else {
            return;
        };
        session.touch(now);
        if let Some(state) = new_state {
            session.tcp_state = state;
        }
        let expirer = new_expirer.unwrap_or(session.expirer);
        session.expirer = expirer;
        inner
            .fifos
            .entry(expirer)
            .or_default()
            .push_back(FifoEntry { key: v6_key, recorded_at: now });
    }

    pub fn remove_session(&self, v6_pair: Pair, protocol: L4Protocol) {
        let mut inner = self.inner.lock().unwrap();
        remove_session_locked(&mut inner, (v6_pair, protocol));
    }

    /// Walks every class's FIFO, reporting sessions whose timeout has
    /// elapsed and applying each one's [`crate::session::ExpiryAction`].
    /// Entries that are stale (removed, or superseded by a later touch)
    /// are discarded without action. The walk for each class stops as soon
    /// as it finds an entry that hasn't expired yet, since later entries in
    /// that class are no older.
    pub fn expire_due(&self, now: Instant, timeout_for: impl Fn(ExpirerClass) -> Duration) -> Vec<ExpiredEvent> {
        let mut events = Vec::new();
        let mut inner = self.inner.lock().unwrap();

        let classes: Vec<ExpirerClass> = inner.fifos.keys().copied().collect();
        for class in classes {
            let timeout = timeout_for(class);
            loop {
                let Some(fifo) = inner.fifos.get_mut(&class) else { break };
                let Some(front) = fifo.front() else { break };

                let is_live = inner
                    .sessions_by_v6
                    .get(&front.key)
                    .is_some_and(|s| s.update_time == front.recorded_at);
                if !is_live {
                    inner.fifos.get_mut(&class).unwrap().pop_front();
                    continue;
                }

                if now.duration_since(front.recorded_at) < timeout {
                    break;
                }

                let key = front.key;
                inner.fifos.get_mut(&class).unwrap().pop_front();

                let state = inner.sessions_by_v6.get(&key).unwrap().tcp_state;
                match state.on_expiry() {
                    ExpiryAction::ProbeAndKeep => {
                        events.push(ExpiredEvent::SendProbe(key));
                        if let Some(session) = inner.sessions_by_v6.get_mut(&key) {
                            session.tcp_state = TcpState::Trans;
                            session.expirer = ExpirerClass::TcpTrans;
                            session.touch(now);
                        }
                        inner
                            .fifos
                            .entry(ExpirerClass::TcpTrans)
                            .or_default()
                            .push_back(FifoEntry { key, recorded_at: now });
                    }
                    ExpiryAction::EmitIcmpErrorAndRemove => {
                        events.push(ExpiredEvent::EmitIcmpError(key));
                        remove_session_locked(&mut inner, key);
                    }
                    ExpiryAction::Remove => {
                        remove_session_locked(&mut inner, key);
                    }
                }
            }
        }
        events
    }
}

fn remove_session_locked(inner: &mut Inner, key: SessionKey) {
    if let Some(session) = inner.sessions_by_v6.remove(&key) {
        inner.sessions_by_v4.remove(&(session.v4_pair, session.protocol));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn transport_v6(port: u16) -> TransportAddress {
        TransportAddress::v6("2001:db8::1".parse().unwrap(), port)
    }

    fn transport_v4(port: u16) -> TransportAddress {
        TransportAddress::v4(Ipv4Addr::new(192, 0, 2, 1), port)
    }

    #[test]
    fn flush_keeps_static_bib_entries_but_drops_dynamic_ones_and_sessions() {
        let db = Nat64Db::new();
        let static_bib = db.add_bib(BibEntry::new(
            transport_v6(1000),
            transport_v4(2000),
            L4Protocol::Udp,
            true,
        ));
        db.add_bib(BibEntry::new(
            transport_v6(1001),
            transport_v4(2001),
            L4Protocol::Udp,
            false,
        ));
        let v6_pair = Pair::new(transport_v6(1000), transport_v6(9999));
        let v4_pair = Pair::new(transport_v4(2000), transport_v4(8888));
        db.add_session(v6_pair, v4_pair, L4Protocol::Udp, static_bib, ExpirerClass::Udp, Instant::now());

        db.flush();

        assert!(db.get_bib_by_v6(transport_v6(1000), L4Protocol::Udp).is_some());
        assert!(db.get_bib_by_v6(transport_v6(1001), L4Protocol::Udp).is_none());
        assert!(db.get_session_by_v6(v6_pair, L4Protocol::Udp).is_none());
    }

    #[test]
    fn bib_is_reachable_from_both_families() {
        let db = Nat64Db::new();
        let entry = BibEntry::new(transport_v6(1000), transport_v4(2000), L4Protocol::Udp, false);
        db.add_bib(entry);

        assert!(db.get_bib_by_v6(transport_v6(1000), L4Protocol::Udp).is_some());
        assert!(db.get_bib_by_v4(transport_v4(2000), L4Protocol::Udp).is_some());
    }

    #[test]
    fn deleting_a_bib_drops_its_sessions() {
        let db = Nat64Db::new();
        let bib = db.add_bib(BibEntry::new(
            transport_v6(1000),
            transport_v4(2000),
            L4Protocol::Udp,
            false,
        ));

        let v6_pair = Pair::new(transport_v6(1000), transport_v6(9999));
        let v4_pair = Pair::new(transport_v4(2000), transport_v4(8888));
        db.add_session(
            v6_pair,
            v4_pair,
            L4Protocol::Udp,
            bib,
            ExpirerClass::Udp,
            Instant::now(),
        );
        assert!(db.get_session_by_v6(v6_pair, L4Protocol::Udp).is_some());

        assert!(db.delete_bib(transport_v6(1000), L4Protocol::Udp));
        assert!(db.get_session_by_v6(v6_pair, L4Protocol::Udp).is_none());
    }

    #[test]
    fn stale_fifo_entries_are_skipped_after_a_touch() {
        let db = Nat64Db::new();
        let bib = db.add_bib(BibEntry::new(
            transport_v6(1000),
            transport_v4(2000),
            L4Protocol::Udp,
            false,
        ));
        let v6_pair = Pair::new(transport_v6(1000), transport_v6(9999));
        let v4_pair = Pair::new(transport_v4(2000), transport_v4(8888));
        let t0 = Instant::now();
        db.add_session(v6_pair, v4_pair, L4Protocol::Udp, bib, ExpirerClass::Udp, t0);

        let t1 = t0 + Duration::from_secs(1);
        db.touch(v6_pair, L4Protocol::Udp, t1, None, None);

        // The stale FIFO entry from creation should not cause an expiry
        // that the fresh entry's timestamp wouldn't also trigger.
        let events = db.expire_due(t1 + Duration::from_millis(1), |_| Duration::from_secs(10));
        assert!(events.is_empty());
    }

    #[test]
    fn established_tcp_session_is_probed_and_refiled_under_tcp_trans() {
        let db = Nat64Db::new();
        let bib = db.add_bib(BibEntry::new(
            transport_v6(1000),
            transport_v4(2000),
            L4Protocol::Tcp,
            false,
        ));
        let v6_pair = Pair::new(transport_v6(1000), transport_v6(9999));
        let v4_pair = Pair::new(transport_v4(2000), transport_v4(8888));
        let t0 = Instant::now();
        db.add_session(v6_pair, v4_pair, L4Protocol::Tcp, bib, ExpirerClass::TcpEst, t0);
        db.touch(v6_pair, L4Protocol::Tcp, t0, Some(TcpState::Established), Some(ExpirerClass::TcpEst));

        let t1 = t0 + Duration::from_secs(7200);
        let events = db.expire_due(t1, |class| match class {
            ExpirerClass::TcpEst => Duration::from_secs(7200),
            ExpirerClass::TcpTrans => Duration::from_secs(240),
            _ => Duration::from_secs(300),
        });
        assert!(matches!(events.as_slice(), [ExpiredEvent::SendProbe(k)] if *k == (v6_pair, L4Protocol::Tcp)));

        // The session survives, has moved to Trans, and is due again under
        // the (shorter) TcpTrans timeout rather than being stuck forever.
        let (_, state) = db.get_session_by_v6(v6_pair, L4Protocol::Tcp).unwrap();
        assert_eq!(state, TcpState::Trans);

        // Trans's own on_expiry is a plain Remove; reaching this point at
        // all confirms the session was reachable via the TcpTrans FIFO,
        // which the probe-and-refile above is responsible for.
        let t2 = t1 + Duration::from_secs(241);
        let events = db.expire_due(t2, |class| match class {
            ExpirerClass::TcpEst => Duration::from_secs(7200),
            ExpirerClass::TcpTrans => Duration::from_secs(240),
            _ => Duration::from_secs(300),
        });
        assert!(events.is_empty());
        assert!(db.get_session_by_v6(v6_pair, L4Protocol::Tcp).is_none());
    }
}
