use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use wavelink_core::{IceCandidate, MemberId, SdpKind, SessionDescription};
use wavelink_server::{LinkState, MediaConnection, MediaEngine, TransportEventSink};

/// Failure injection and timing for mock connections.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub fail_create: bool,
    pub fail_remote_description: bool,
    /// Candidate string the connection refuses to add.
    pub reject_candidate: Option<String>,
    /// Delay inside `create_answer`, to leave room for a concurrent close.
    pub answer_delay: Option<Duration>,
    /// Delay inside `close`, as a slow media stack would take.
    pub close_delay: Option<Duration>,
}

/// MediaEngine that hands out recordable connections.
#[derive(Clone, Default)]
pub struct MockMediaEngine {
    behavior: MockBehavior,
    connections: Arc<Mutex<Vec<Arc<MockConnection>>>>,
}

impl MockMediaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub async fn created(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Most recent connection created for `member`.
    pub async fn connection(&self, member: &MemberId) -> Option<Arc<MockConnection>> {
        self.connections
            .lock()
            .await
            .iter()
            .rev()
            .find(|c| &c.member == member)
            .cloned()
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_connection(
        &self,
        member: &MemberId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn MediaConnection>> {
        if self.behavior.fail_create {
            bail!("mock engine refused to create a connection");
        }

        let connection = Arc::new(MockConnection {
            member: member.clone(),
            behavior: self.behavior.clone(),
            events,
            remote: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            answers: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        self.connections.lock().await.push(Arc::clone(&connection));
        Ok(connection)
    }
}

pub struct MockConnection {
    pub member: MemberId,
    behavior: MockBehavior,
    events: TransportEventSink,
    remote: Mutex<Vec<SessionDescription>>,
    local: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    answers: AtomicUsize,
    closes: AtomicUsize,
}

impl MockConnection {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn answers(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub async fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote.lock().await.clone()
    }

    pub async fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().await.clone()
    }

    /// Reports a link state change as the engine would.
    pub fn emit_link_state(&self, state: LinkState) {
        self.events.link_state(state);
    }

    pub fn emit_local_candidate(&self, candidate: &str) {
        self.events.local_candidate(IceCandidate {
            candidate: candidate.to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        });
    }
}

#[async_trait]
impl MediaConnection for MockConnection {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if self.behavior.fail_remote_description {
            bail!("mock remote description rejected");
        }
        self.remote.lock().await.push(description);
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        if let Some(delay) = self.behavior.answer_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.answers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("answer-{}-{}", self.member, n))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        if description.kind != SdpKind::Answer {
            bail!("mock only accepts local answers");
        }
        *self.local.lock().await = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().await.clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.behavior.reject_candidate.as_deref() == Some(candidate.candidate.as_str()) {
            bail!("mock candidate rejected");
        }
        self.candidates.lock().await.push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(delay) = self.behavior.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
