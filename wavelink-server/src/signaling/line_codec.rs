use serde_json::{Map, Value};
use wavelink_core::{MemberId, RoomEvent, TransportError};

/// Top-level keys a bridge line may carry, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKey {
    Literal,
    Join,
    MemberJoin,
    MemberLeave,
    Data,
}

impl EventKey {
    pub const ALL: [EventKey; 5] = [
        EventKey::Literal,
        EventKey::Join,
        EventKey::MemberJoin,
        EventKey::MemberLeave,
        EventKey::Data,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKey::Literal => "literal",
            EventKey::Join => "join",
            EventKey::MemberJoin => "member_join",
            EventKey::MemberLeave => "member_leave",
            EventKey::Data => "data",
        }
    }
}

/// Decodes one line of bridge output.
///
/// A line carrying several recognized keys yields one event per key, in
/// `EventKey::ALL` order. Lines that are not JSON objects, and keys whose
/// value lacks a member id, become `TransportFault` events.
pub fn decode_line(line: &str) -> Vec<RoomEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let fields = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return vec![malformed(line, "expected a JSON object".to_owned())],
        Err(e) => return vec![malformed(line, e.to_string())],
    };

    EventKey::ALL
        .iter()
        .filter_map(|&key| {
            let value = fields.get(key.as_str())?;
            Some(decode_entry(key, value).unwrap_or_else(|reason| malformed(line, reason)))
        })
        .collect()
}

fn decode_entry(key: EventKey, value: &Value) -> Result<RoomEvent, String> {
    match key {
        EventKey::Literal => Ok(RoomEvent::Literal(match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })),
        EventKey::Join => value
            .as_str()
            .map(|id| RoomEvent::SelfJoined(MemberId::from(id)))
            .ok_or_else(|| "`join` must carry our member id".to_owned()),
        EventKey::MemberJoin => Ok(RoomEvent::MemberJoined {
            member: member_id(value, key)?,
            metadata: value.clone(),
        }),
        EventKey::MemberLeave => Ok(RoomEvent::MemberLeft {
            member: member_id(value, key)?,
            metadata: value.clone(),
        }),
        EventKey::Data => {
            let Value::Object(fields) = value else {
                return Err("`data` must be an object".to_owned());
            };
            let sender = fields
                .get("member")
                .ok_or_else(|| "`data` has no sending member".to_owned())
                .and_then(|member| member_id(member, key))?;
            Ok(RoomEvent::Message {
                sender,
                payload: Value::Object(without_member(fields)),
            })
        }
    }
}

fn member_id(value: &Value, key: EventKey) -> Result<MemberId, String> {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(MemberId::from)
        .ok_or_else(|| format!("`{}` member has no string id", key.as_str()))
}

fn without_member(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(name, _)| name.as_str() != "member")
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn malformed(line: &str, reason: String) -> RoomEvent {
    RoomEvent::TransportFault(TransportError::MalformedLine {
        line: line.to_owned(),
        reason,
    })
}
