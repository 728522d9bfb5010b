use crate::model::MemberId;

pub type Result<T> = std::result::Result<T, SignalError>;

/// Faults raised by a room transport. They travel as `RoomEvent`s instead of
/// aborting the read loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to start bridge process: {0}")]
    Spawn(String),

    #[error("bridge process exited (code: {code:?})")]
    ProcessExited { code: Option<i32> },

    #[error("malformed line from bridge: {reason}")]
    MalformedLine { line: String, reason: String },

    #[error("bridge i/o error: {0}")]
    Io(String),

    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// The transport cannot deliver anything after this fault.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Spawn(_) | TransportError::ProcessExited { .. } | TransportError::Closed
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// Everything that can go wrong while routing one room event.
///
/// None of these stop the router; they are reported where they happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("transport fault: {0}")]
    TransportFault(#[from] TransportError),

    #[error("malformed payload from {member}: {reason}")]
    MalformedPayload { member: MemberId, reason: String },

    #[error("negotiation with {member} failed: {reason}")]
    NegotiationFailure { member: MemberId, reason: String },

    #[error("ICE candidate from {member} rejected: {reason}")]
    CandidateRejected { member: MemberId, reason: String },

    #[error("no live session for {0}")]
    UnknownTarget(MemberId),

    #[error("session for {0} is closed")]
    SessionClosed(MemberId),
}

impl SignalError {
    /// Races with member departure. Not worth more than a debug line.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SignalError::UnknownTarget(_) | SignalError::SessionClosed(_)
        )
    }

    pub fn member(&self) -> Option<&MemberId> {
        match self {
            SignalError::TransportFault(_) => None,
            SignalError::MalformedPayload { member, .. }
            | SignalError::NegotiationFailure { member, .. }
            | SignalError::CandidateRejected { member, .. }
            | SignalError::UnknownTarget(member)
            | SignalError::SessionClosed(member) => Some(member),
        }
    }
}
