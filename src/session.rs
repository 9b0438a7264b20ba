//! Session table entries and the TCP state machine (§3, §4.3).

use std::sync::Arc;
use std::time::Instant;

use crate::bib::BibEntry;
use crate::tuple::{L4Protocol, TransportAddress};

/// `{local, remote}` transport addresses. `local` is always the pool-side
/// address (the BIB's v6 or v4 address, depending on which pair this is);
/// `remote` is the peer the flow is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub local: TransportAddress,
    pub remote: TransportAddress,
}

impl Pair {
    #[must_use]
    pub fn new(local: TransportAddress, remote: TransportAddress) -> Self {
        Self { local, remote }
    }
}

/// Per-session TCP state (§3). Terminal state is `Closed`, at which point
/// the session is removed from both index trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    V4Init,
    V6Init,
    Established,
    V4FinRcv,
    V6FinRcv,
    V4FinV6FinRcv,
    Trans,
}

/// Which expiration FIFO a session belongs to. Distinct from `TcpState`
/// because `Trans` and `Established` share a timer class with other states
/// and the expirer only needs to know which configured timeout applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpirerClass {
    Udp,
    Icmp,
    TcpEst,
    TcpTrans,
    TcpSyn,
}

/// An ingress event driving the TCP state machine (§4.3's transition table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpEvent {
    V4Syn,
    V6Syn,
    V4Fin,
    V6Fin,
    Rst,
    Data,
}

impl TcpState {
    /// Applies one transition of §4.3's table. Returns the next state and
    /// the expirer class the session should be filed under afterward.
    /// `None` next-state is not representable here; `Closed` is itself a
    /// valid, terminal next state meaning "remove this session".
    #[must_use]
    pub fn transition(self, event: TcpEvent) -> (TcpState, ExpirerClass) {
        use TcpEvent::{Data, Rst, V4Fin, V4Syn, V6Fin, V6Syn};
        use TcpState::{
            Closed, Established, Trans, V4FinRcv, V4FinV6FinRcv, V4Init, V6FinRcv, V6Init,
        };

        if let Rst = event {
            return (Trans, ExpirerClass::TcpTrans);
        }

        match (self, event) {
            (Closed, V6Syn) => (V6Init, ExpirerClass::TcpTrans),
            (Closed, V4Syn) => (V4Init, ExpirerClass::TcpSyn),
            (V6Init, V4Syn) => (Established, ExpirerClass::TcpEst),
            (V4Init, V6Syn) => (Established, ExpirerClass::TcpEst),
            (Established, V4Fin) => (V4FinRcv, ExpirerClass::TcpEst),
            (Established, V6Fin) => (V6FinRcv, ExpirerClass::TcpEst),
            (V4FinRcv, V6Fin) => (V4FinV6FinRcv, ExpirerClass::TcpTrans),
            (V6FinRcv, V4Fin) => (V4FinV6FinRcv, ExpirerClass::TcpTrans),
            (Trans, Data) => (Established, ExpirerClass::TcpEst),
            (other, _) => (
                other,
                match other {
                    Established => ExpirerClass::TcpEst,
                    V4Init => ExpirerClass::TcpSyn,
                    _ => ExpirerClass::TcpTrans,
                },
            ),
        }
    }

    /// What happens when this state's timer fires (§4.4's expiry table).
    #[must_use]
    pub fn on_expiry(self) -> ExpiryAction {
        match self {
            TcpState::Established => ExpiryAction::ProbeAndKeep,
            TcpState::V4Init => ExpiryAction::EmitIcmpErrorAndRemove,
            _ => ExpiryAction::Remove,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    /// Emit a TCP probe segment, move the session to `Trans`, and keep it.
    ProbeAndKeep,
    /// Generate an ICMP error from the stored packet, then remove.
    EmitIcmpErrorAndRemove,
    Remove,
}

/// `{v6-pair, v4-pair, L4 protocol, TCP-state, update_time, parent BIB,
/// expirer}` (§3).
///
/// Invariant A: `local` on both pairs equals the parent BIB's transport
/// address for that family. Invariant B/C (tree membership, FIFO
/// ordering) are properties of the owning [`crate::db::Nat64Db`], not of
/// this struct in isolation.
#[derive(Debug)]
pub struct SessionEntry {
    pub v6_pair: Pair,
    pub v4_pair: Pair,
    pub protocol: L4Protocol,
    pub tcp_state: TcpState,
    pub update_time: Instant,
    pub bib: Arc<BibEntry>,
    pub expirer: ExpirerClass,
}

impl SessionEntry {
    #[must_use]
    pub fn new(
        v6_pair: Pair,
        v4_pair: Pair,
        protocol: L4Protocol,
        bib: Arc<BibEntry>,
        expirer: ExpirerClass,
        now: Instant,
    ) -> Self {
        bib.incref();
        Self {
            v6_pair,
            v4_pair,
            protocol,
            tcp_state: TcpState::Closed,
            update_time: now,
            bib,
            expirer,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        debug_assert!(now >= self.update_time, "update_time must be monotonic");
        self.update_time = now;
    }
}

impl Drop for SessionEntry {
    fn drop(&mut self) {
        self.bib.decref();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simultaneous_open_reaches_established() {
        let (state, class) = TcpState::Closed.transition(TcpEvent::V6Syn);
        assert_eq!(state, TcpState::V6Init);
        assert_eq!(class, ExpirerClass::TcpTrans);

        let (state, class) = state.transition(TcpEvent::V4Syn);
        assert_eq!(state, TcpState::Established);
        assert_eq!(class, ExpirerClass::TcpEst);
    }

    #[test]
    fn both_fins_reach_the_combined_fin_state() {
        let state = TcpState::Established;
        let (state, _) = state.transition(TcpEvent::V4Fin);
        assert_eq!(state, TcpState::V4FinRcv);
        let (state, _) = state.transition(TcpEvent::V6Fin);
        assert_eq!(state, TcpState::V4FinV6FinRcv);
    }

    #[test]
    fn rst_always_moves_to_trans() {
        let (state, class) = TcpState::Established.transition(TcpEvent::Rst);
        assert_eq!(state, TcpState::Trans);
        assert_eq!(class, ExpirerClass::TcpTrans);
    }

    #[test]
    fn established_expiry_probes_and_keeps() {
        assert_eq!(TcpState::Established.on_expiry(), ExpiryAction::ProbeAndKeep);
        assert_eq!(
            TcpState::V4Init.on_expiry(),
            ExpiryAction::EmitIcmpErrorAndRemove
        );
        assert_eq!(TcpState::Trans.on_expiry(), ExpiryAction::Remove);
    }
}
