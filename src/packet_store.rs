//! TCP Simultaneous Open packet store (§4.5).
//!
//! An inbound v4 SYN with no matching session is neither forwarded nor
//! dropped outright — RFC 6146 gives the v6 side a window to open the same
//! flow first. We hold the raw packet, keyed by the v4-pair it would bind
//! to, and either release it (discarded) when a matching v6 SYN shows up,
//! or turn it into an ICMP error once the window lapses.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::session::Pair;

/// How long a stored SYN waits for its v6-side counterpart.
pub const SIMULTANEOUS_OPEN_WINDOW: Duration = Duration::from_secs(6);

pub struct StoredPacket {
    /// The v4-pair this packet would bind to once a BIB/session exists:
    /// `local` is the packet's v4 destination (the pool address/port it
    /// targeted), `remote` is its v4 source.
    pub v4_pair: Pair,
    pub packet: Vec<u8>,
    pub stored_at: Instant,
}

/// A `Mutex`-guarded FIFO, matching the teacher's preference for
/// `std::sync::Mutex` over a hand-rolled lock-free structure.
pub struct PacketStore {
    entries: Mutex<VecDeque<StoredPacket>>,
    max_pkts: usize,
}

impl PacketStore {
    #[must_use]
    pub fn new(max_pkts: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_pkts,
        }
    }

    /// Stores `packet` under `v4_pair`. Returns `false` (packet not stored,
    /// caller should drop it) if the store is already at `max_pkts`.
    pub fn try_store(&self, v4_pair: Pair, packet: Vec<u8>, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_pkts {
            log::debug!("packet store full ({} entries), dropping new SYN", self.max_pkts);
            return false;
        }
        entries.push_back(StoredPacket {
            v4_pair,
            packet,
            stored_at: now,
        });
        true
    }

    /// Removes and returns the stored packet matching `v4_pair`, if any —
    /// called when a v6 SYN resolves to the same prospective flow.
    pub fn take_matching(&self, v4_pair: Pair) -> Option<StoredPacket> {
        let mut entries = self.entries.lock().unwrap();
        let index = entries.iter().position(|e| e.v4_pair == v4_pair)?;
        entries.remove(index)
    }

    /// Removes and returns every entry that has waited past
    /// [`SIMULTANEOUS_OPEN_WINDOW`], for ICMP error generation.
    pub fn expire_due(&self, now: Instant) -> Vec<StoredPacket> {
        let mut entries = self.entries.lock().unwrap();
        let (keep, gone): (VecDeque<StoredPacket>, Vec<StoredPacket>) =
            std::mem::take(&mut *entries)
                .into_iter()
                .partition(|entry| now.duration_since(entry.stored_at) < SIMULTANEOUS_OPEN_WINDOW);
        *entries = keep;
        gone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::TransportAddress;
    use std::net::Ipv4Addr;

    fn pair() -> Pair {
        Pair::new(
            TransportAddress::v4(Ipv4Addr::new(192, 168, 2, 1), 1000),
            TransportAddress::v4(Ipv4Addr::new(198, 51, 100, 5), 2000),
        )
    }

    #[test]
    fn stores_and_matches_by_v4_pair() {
        let store = PacketStore::new(4);
        assert!(store.try_store(pair(), vec![1, 2, 3], Instant::now()));
        let found = store.take_matching(pair()).unwrap();
        assert_eq!(found.packet, vec![1, 2, 3]);
        assert!(store.take_matching(pair()).is_none());
    }

    #[test]
    fn rejects_new_entries_once_full() {
        let store = PacketStore::new(1);
        assert!(store.try_store(pair(), vec![], Instant::now()));
        assert!(!store.try_store(pair(), vec![], Instant::now()));
    }

    #[test]
    fn expires_entries_past_the_window() {
        let store = PacketStore::new(4);
        let t0 = Instant::now();
        store.try_store(pair(), vec![9], t0);
        let expired = store.expire_due(t0 + SIMULTANEOUS_OPEN_WINDOW);
        assert_eq!(expired.len(), 1);
        assert!(store.take_matching(pair()).is_none());
    }
}
