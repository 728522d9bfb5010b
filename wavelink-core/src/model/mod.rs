mod member;
mod room_event;
mod signaling;

pub use member::MemberId;
pub use room_event::RoomEvent;
pub use signaling::{
    IceCandidate, IceServerConfig, OutboundSignal, SdpKind, SessionDescription, SignalPayload,
};
