use crate::room::{SessionEvent, SessionEventKind};
use tokio::sync::mpsc;
use wavelink_core::{IceCandidate, MemberId};

/// Link state of a media connection as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    /// The connection will not recover on its own.
    pub fn is_fatal(self) -> bool {
        matches!(self, LinkState::Failed)
    }
}

/// Where a media connection reports what happens to it.
///
/// Every event is stamped with the member id and the session epoch, so an
/// event from a torn-down connection can never touch a newer session that
/// reuses the same id.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    member: MemberId,
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl TransportEventSink {
    pub fn new(member: MemberId, epoch: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { member, epoch, tx }
    }

    pub fn member(&self) -> &MemberId {
        &self.member
    }

    pub fn link_state(&self, state: LinkState) {
        self.emit(SessionEventKind::Link(state));
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(SessionEventKind::LocalCandidate(candidate));
    }

    pub(crate) fn negotiation_failed(&self, reason: String) {
        self.emit(SessionEventKind::NegotiationFailed(reason));
    }

    fn emit(&self, kind: SessionEventKind) {
        // The router is gone only during shutdown; nothing left to tell.
        let _ = self.tx.send(SessionEvent {
            member: self.member.clone(),
            epoch: self.epoch,
            kind,
        });
    }
}
