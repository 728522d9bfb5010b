use async_trait::async_trait;
use serde_json::Value;
use wavelink_core::TransportError;

/// Outbound half of a room transport.
///
/// Implementations hand the document to the room and return; they do not
/// wait for delivery.
#[async_trait]
pub trait RoomOutput: Send + Sync {
    /// Publish one JSON document to the room.
    async fn send(&self, document: Value) -> Result<(), TransportError>;
}
