use crate::error::TransportError;
use crate::model::member::MemberId;
use serde_json::Value;

/// Events produced by a room transport, consumed exactly once by the router.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Free-form text from the transport. Logged, never acted on.
    Literal(String),

    /// This process joined the room under the given id.
    SelfJoined(MemberId),

    MemberJoined { member: MemberId, metadata: Value },

    MemberLeft { member: MemberId, metadata: Value },

    /// Signaling document sent to us by `sender`. The payload is kept untyped
    /// until the router parses it, so a malformed document only costs that
    /// one message.
    Message { sender: MemberId, payload: Value },

    TransportFault(TransportError),
}

impl RoomEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::Literal(_) => "literal",
            RoomEvent::SelfJoined(_) => "joined",
            RoomEvent::MemberJoined { .. } => "member-joined",
            RoomEvent::MemberLeft { .. } => "member-left",
            RoomEvent::Message { .. } => "message",
            RoomEvent::TransportFault(_) => "transport-error",
        }
    }

    /// Member the event is about, if any.
    pub fn member(&self) -> Option<&MemberId> {
        match self {
            RoomEvent::SelfJoined(id) => Some(id),
            RoomEvent::MemberJoined { member, .. } | RoomEvent::MemberLeft { member, .. } => {
                Some(member)
            }
            RoomEvent::Message { sender, .. } => Some(sender),
            RoomEvent::Literal(_) | RoomEvent::TransportFault(_) => None,
        }
    }
}
