use crate::signaling::RoomOutput;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use wavelink_core::{MemberId, OutboundSignal};

pub const TARGET_ID_FIELD: &str = "targetId";

/// Addresses outbound signaling to a single member and hands it to the room.
#[derive(Clone)]
pub struct OutboundPublisher {
    output: Arc<dyn RoomOutput>,
}

impl OutboundPublisher {
    pub fn new(output: Arc<dyn RoomOutput>) -> Self {
        Self { output }
    }

    /// Fire-and-forget. Failures are logged, never returned.
    pub async fn publish(&self, target: &MemberId, signal: OutboundSignal) {
        let document = match targeted_document(target, &signal) {
            Ok(doc) => doc,
            Err(e) => {
                error!("Failed to serialize {} signal for {}: {}", signal.kind(), target, e);
                return;
            }
        };

        debug!("Publishing {} signal to {}", signal.kind(), target);
        if let Err(e) = self.output.send(document).await {
            error!("Failed to publish {} signal to {}: {}", signal.kind(), target, e);
        }
    }
}

/// `signal` serialized and merged with `{"targetId": target}`.
pub fn targeted_document(target: &MemberId, signal: &OutboundSignal) -> serde_json::Result<Value> {
    let mut document = serde_json::to_value(signal)?;
    if let Value::Object(fields) = &mut document {
        fields.insert(
            TARGET_ID_FIELD.to_owned(),
            Value::String(target.as_str().to_owned()),
        );
    }
    Ok(document)
}
