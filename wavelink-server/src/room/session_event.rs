use crate::transport::LinkState;
use wavelink_core::{IceCandidate, MemberId};

/// Report from a live session (or its media connection) back to the router.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub member: MemberId,
    /// Generation of the session that produced the event.
    pub epoch: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    Link(LinkState),

    /// Locally gathered candidate to trickle to the peer.
    LocalCandidate(IceCandidate),

    /// The session already closed itself; the registry must forget it.
    NegotiationFailed(String),
}
