use crate::signaling::OutboundPublisher;
use crate::transport::{MediaConnection, MediaEngine, TransportEventSink};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};
use wavelink_core::{
    IceCandidate, MemberId, OutboundSignal, SdpKind, SessionDescription, SignalError,
    SignalPayload,
};

/// Offer/answer progress of one peer. We only ever answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    HaveRemoteOffer,
    Answered,
    /// Reported by the media engine, never entered on our own.
    Connected,
    Closed,
}

impl NegotiationState {
    pub fn is_closed(self) -> bool {
        self == NegotiationState::Closed
    }

    pub fn is_answered(self) -> bool {
        matches!(self, NegotiationState::Answered | NegotiationState::Connected)
    }

    fn accepts_offer(self) -> bool {
        matches!(
            self,
            NegotiationState::New | NegotiationState::Answered | NegotiationState::Connected
        )
    }
}

enum SessionCommand {
    Signal(SignalPayload),
    LocalCandidate(IceCandidate),
}

enum Negotiation {
    Answered,
    /// The session closed underneath the negotiation; nothing was applied.
    Discarded,
}

/// Negotiation state machine for one remote member.
///
/// Inbound work is queued and applied one item at a time by a dedicated
/// task, so two steps for the same peer never overlap. `close` bypasses the
/// queue: an in-flight step notices the `Closed` state at its next
/// suspension point and drops its result.
pub struct PeerSession {
    epoch: u64,
    inbox: mpsc::UnboundedSender<SessionCommand>,
    shared: Arc<SessionShared>,
}

struct SessionShared {
    member: MemberId,
    state: watch::Sender<NegotiationState>,
    connection: Mutex<Option<Arc<dyn MediaConnection>>>,
    engine: Arc<dyn MediaEngine>,
    publisher: OutboundPublisher,
    events: TransportEventSink,
}

impl PeerSession {
    /// Creates the session and starts its worker. No media connection is
    /// allocated until the first offer arrives.
    pub fn spawn(
        member: MemberId,
        epoch: u64,
        engine: Arc<dyn MediaEngine>,
        publisher: OutboundPublisher,
        events: TransportEventSink,
    ) -> Self {
        let (state, _) = watch::channel(NegotiationState::New);
        let (inbox, inbox_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SessionShared {
            member,
            state,
            connection: Mutex::new(None),
            engine,
            publisher,
            events,
        });
        tokio::spawn(Arc::clone(&shared).run(inbox_rx));

        Self {
            epoch,
            inbox,
            shared,
        }
    }

    pub fn member(&self) -> &MemberId {
        &self.shared.member
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> NegotiationState {
        self.shared.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.shared.state.subscribe()
    }

    /// Queues an inbound signaling payload behind any earlier ones.
    pub fn handle_message(&self, payload: SignalPayload) -> Result<(), SignalError> {
        self.enqueue(SessionCommand::Signal(payload))
    }

    /// Queues a locally gathered candidate. It is published only once the
    /// answer has gone out, which the queue order guarantees.
    pub fn forward_local_candidate(&self, candidate: IceCandidate) -> Result<(), SignalError> {
        self.enqueue(SessionCommand::LocalCandidate(candidate))
    }

    /// Records that the media engine connected. Only meaningful after we
    /// answered.
    pub fn mark_connected(&self) -> bool {
        self.shared.state.send_if_modified(|state| {
            if *state == NegotiationState::Answered {
                *state = NegotiationState::Connected;
                true
            } else {
                false
            }
        })
    }

    /// Enters `Closed` without waiting for the media connection. Queued and
    /// in-flight work is dropped from here on. Returns whether this call did
    /// the transition.
    pub fn mark_closed(&self) -> bool {
        self.shared.mark_closed()
    }

    /// Enters `Closed` and releases the media connection. Idempotent.
    pub async fn close(&self) {
        self.shared.close().await;
    }

    fn enqueue(&self, command: SessionCommand) -> Result<(), SignalError> {
        if self.state().is_closed() {
            return Err(SignalError::SessionClosed(self.member().clone()));
        }
        self.inbox
            .send(command)
            .map_err(|_| SignalError::SessionClosed(self.member().clone()))
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("member", self.member())
            .field("epoch", &self.epoch)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionShared {
    async fn run(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<SessionCommand>) {
        let mut state_rx = self.state.subscribe();
        let mut answered_offer: Option<String> = None;

        loop {
            tokio::select! {
                biased;

                _ = closed(&mut state_rx) => break,

                command = inbox.recv() => match command {
                    Some(SessionCommand::Signal(payload)) => {
                        self.apply(payload, &mut answered_offer).await;
                    }
                    Some(SessionCommand::LocalCandidate(candidate)) => {
                        self.trickle(candidate).await;
                    }
                    None => break,
                },
            }
        }

        debug!("Session worker for {} stopped", self.member);
    }

    fn state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    /// Moves to `next` unless the session was closed meanwhile.
    fn advance(&self, next: NegotiationState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_closed() {
                return false;
            }
            *state = next;
            true
        })
    }

    async fn apply(&self, payload: SignalPayload, answered_offer: &mut Option<String>) {
        if payload.is_empty() {
            debug!("No signaling fields from {}, ignoring", self.member);
            return;
        }

        if let Some(description) = payload.sdp {
            self.apply_description(description, answered_offer).await;
        }

        if let Some(raw) = payload.candidate {
            match self.apply_candidate(&raw).await {
                Ok(()) => {}
                Err(e) if e.is_expected() => debug!("{}", e),
                Err(e) => warn!("{}", e),
            }
        }
    }

    async fn apply_description(
        &self,
        description: SessionDescription,
        answered_offer: &mut Option<String>,
    ) {
        if description.kind != SdpKind::Offer {
            debug!(
                "Ignoring {:?} description from {}",
                description.kind, self.member
            );
            return;
        }

        let state = self.state();
        if !state.accepts_offer() {
            debug!("Ignoring offer from {} in state {:?}", self.member, state);
            return;
        }
        if state.is_answered() && answered_offer.as_deref() == Some(description.sdp.as_str()) {
            debug!("Duplicate offer from {}, already answered", self.member);
            return;
        }

        let sdp = description.sdp;
        match self.negotiate(sdp.clone()).await {
            Ok(Negotiation::Answered) => *answered_offer = Some(sdp),
            Ok(Negotiation::Discarded) => {
                debug!("Session for {} closed mid-negotiation", self.member);
            }
            Err(e) if self.state().is_closed() => {
                debug!("Session for {} closed mid-negotiation: {}", self.member, e);
            }
            Err(e) => {
                error!("{}", e);
                self.close().await;
                self.events.negotiation_failed(e.to_string());
            }
        }
    }

    /// apply remote offer -> create answer -> apply local -> publish.
    async fn negotiate(&self, sdp: String) -> Result<Negotiation, SignalError> {
        let Some(connection) = self.obtain_connection().await? else {
            return Ok(Negotiation::Discarded);
        };

        info!("Applying remote offer from {}", self.member);
        connection
            .set_remote_description(SessionDescription::offer(sdp))
            .await
            .map_err(|e| self.failure("apply remote offer", e))?;
        if !self.advance(NegotiationState::HaveRemoteOffer) {
            return Ok(Negotiation::Discarded);
        }

        let answer = connection
            .create_answer()
            .await
            .map_err(|e| self.failure("create answer", e))?;
        if self.state().is_closed() {
            return Ok(Negotiation::Discarded);
        }

        connection
            .set_local_description(SessionDescription::answer(answer.clone()))
            .await
            .map_err(|e| self.failure("apply local answer", e))?;

        let local = connection
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .filter(|sdp| !sdp.is_empty())
            .unwrap_or(answer);

        if !self.advance(NegotiationState::Answered) {
            return Ok(Negotiation::Discarded);
        }

        info!("Sending answer to {}", self.member);
        self.publisher
            .publish(&self.member, OutboundSignal::answer(local))
            .await;
        Ok(Negotiation::Answered)
    }

    async fn obtain_connection(&self) -> Result<Option<Arc<dyn MediaConnection>>, SignalError> {
        // Held across creation so that `close` cannot miss a handle that is
        // still being built.
        let mut slot = self.connection.lock().await;
        if self.state().is_closed() {
            return Ok(None);
        }
        if let Some(connection) = slot.as_ref() {
            return Ok(Some(Arc::clone(connection)));
        }

        debug!("Creating media connection for {}", self.member);
        let connection = self
            .engine
            .create_connection(&self.member, self.events.clone())
            .await
            .map_err(|e| self.failure("create connection", e))?;
        *slot = Some(Arc::clone(&connection));
        Ok(Some(connection))
    }

    async fn apply_candidate(&self, raw: &Value) -> Result<(), SignalError> {
        let candidate = IceCandidate::from_value(raw).map_err(|e| self.rejected(e.to_string()))?;
        if candidate.is_end_of_candidates() {
            debug!("End of remote candidates from {}", self.member);
            return Ok(());
        }

        let connection = self.connection.lock().await.clone();
        if self.state().is_closed() {
            return Err(SignalError::SessionClosed(self.member.clone()));
        }
        let Some(connection) = connection else {
            return Err(self.rejected("no media connection yet".to_owned()));
        };

        connection
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| self.rejected(format!("{e:#}")))?;
        debug!("Added remote ICE candidate from {}", self.member);
        Ok(())
    }

    async fn trickle(&self, candidate: IceCandidate) {
        let state = self.state();
        if state.is_answered() {
            self.publisher
                .publish(&self.member, OutboundSignal::Candidate(candidate))
                .await;
        } else {
            debug!(
                "Dropping local candidate for {} in state {:?}",
                self.member, state
            );
        }
    }

    fn mark_closed(&self) -> bool {
        let was_open = self.state.send_if_modified(|state| {
            if state.is_closed() {
                return false;
            }
            *state = NegotiationState::Closed;
            true
        });
        if was_open {
            info!("Closed session for {}", self.member);
        }
        was_open
    }

    async fn close(&self) {
        self.mark_closed();

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!("Error closing connection for {}: {:#}", self.member, e);
            }
        }
    }

    fn failure(&self, step: &str, e: anyhow::Error) -> SignalError {
        SignalError::NegotiationFailure {
            member: self.member.clone(),
            reason: format!("{step}: {e:#}"),
        }
    }

    fn rejected(&self, reason: String) -> SignalError {
        SignalError::CandidateRejected {
            member: self.member.clone(),
            reason,
        }
    }
}

async fn closed(state_rx: &mut watch::Receiver<NegotiationState>) {
    let _ = state_rx.wait_for(|state| state.is_closed()).await;
}
