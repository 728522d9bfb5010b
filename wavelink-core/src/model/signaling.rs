use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
    /// Anything a newer client may send; never acted on.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Trickle ICE candidate in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }

    /// Browsers signal the end of gathering with an empty candidate line.
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// Inbound signaling document.
///
/// Only `sdp` and `candidate` are recognized; every other field is ignored so
/// that newer peers can add fields without breaking us. The candidate is kept
/// raw because a bad candidate must be rejected on its own, without
/// discarding the rest of the message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SignalPayload {
    #[serde(default)]
    pub sdp: Option<SessionDescription>,
    #[serde(default)]
    pub candidate: Option<Value>,
}

impl SignalPayload {
    /// Parses a message payload. A JSON string is accepted once as an
    /// encoded document, since some clients publish pre-serialized text.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        match value {
            Value::Object(_) => Self::deserialize(value),
            Value::String(text) => {
                let inner: Value = serde_json::from_str(text)?;
                match inner {
                    Value::Object(_) => Self::deserialize(&inner),
                    other => Err(serde_json::Error::custom(format!(
                        "expected an encoded JSON object, found {}",
                        value_kind(&other)
                    ))),
                }
            }
            other => Err(serde_json::Error::custom(format!(
                "expected a JSON object, found {}",
                value_kind(other)
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sdp.is_none() && self.candidate.is_none()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Signaling document we send to a single peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundSignal {
    Sdp(SessionDescription),
    Candidate(IceCandidate),
}

impl OutboundSignal {
    pub fn answer(sdp: impl Into<String>) -> Self {
        OutboundSignal::Sdp(SessionDescription::answer(sdp))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundSignal::Sdp(_) => "sdp",
            OutboundSignal::Candidate(_) => "candidate",
        }
    }
}
