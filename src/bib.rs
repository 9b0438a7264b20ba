//! Binding Information Base entries (§3).

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tuple::{L4Protocol, TransportAddress};

/// `{v6-transport-address, v4-transport-address, L4 protocol, is_static,
/// session_count}` (§3). Uniquely identified by `(v6, protocol)` and by
/// `(v4, protocol)`.
///
/// Sessions hold a strong `Arc` reference to their parent BIB; the BIB
/// itself holds only a count, never back-pointers to its sessions (§9) —
/// enumerating a BIB's sessions means walking the session table's index,
/// not a BIB-local list.
#[derive(Debug)]
pub struct BibEntry {
    pub v6: TransportAddress,
    pub v4: TransportAddress,
    pub protocol: L4Protocol,
    pub is_static: bool,
    session_count: AtomicUsize,
}

impl BibEntry {
    #[must_use]
    pub fn new(
        v6: TransportAddress,
        v4: TransportAddress,
        protocol: L4Protocol,
        is_static: bool,
    ) -> Self {
        Self {
            v6,
            v4,
            protocol,
            is_static,
            session_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.session_count.load(Ordering::Acquire)
    }

    pub(crate) fn incref(&self) {
        self.session_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the session count and reports whether the entry is now
    /// eligible for removal (refcount zero and not a static reservation).
    pub(crate) fn decref(&self) -> bool {
        let previous = self.session_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "BIB session count underflow");
        previous <= 1 && !self.is_static
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_entry_is_removable_once_refcount_hits_zero() {
        let entry = BibEntry::new(
            TransportAddress::v6("2001:db8::1".parse().unwrap(), 1000),
            TransportAddress::v4("192.0.2.1".parse().unwrap(), 2000),
            L4Protocol::Udp,
            false,
        );
        entry.incref();
        entry.incref();
        assert!(!entry.decref());
        assert!(entry.decref());
    }

    #[test]
    fn static_entry_never_reports_removable() {
        let entry = BibEntry::new(
            TransportAddress::v6("2001:db8::1".parse().unwrap(), 1000),
            TransportAddress::v4("192.0.2.1".parse().unwrap(), 2000),
            L4Protocol::Udp,
            true,
        );
        entry.incref();
        assert!(!entry.decref());
    }
}
