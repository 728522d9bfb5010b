use crate::transport::TransportEventSink;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use wavelink_core::{IceCandidate, MemberId, SessionDescription};

/// Factory for media connections. One connection per peer session.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Allocate a connection for `member`. Link state changes and locally
    /// gathered ICE candidates are reported through `events`.
    async fn create_connection(
        &self,
        member: &MemberId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn MediaConnection>>;
}

/// Opaque connection handle owned by exactly one peer session.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Returns the SDP of a fresh answer. Does not apply it.
    async fn create_answer(&self) -> Result<String>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Current local description, including any candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Must tolerate being called on an already closed connection.
    async fn close(&self) -> Result<()>;
}
