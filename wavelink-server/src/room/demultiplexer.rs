use crate::room::registry::PeerRegistry;
use crate::room::session_event::{SessionEvent, SessionEventKind};
use crate::signaling::{OutboundPublisher, RoomOutput};
use crate::transport::{LinkState, MediaEngine};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wavelink_core::{MemberId, RoomEvent, SignalError, SignalPayload, TransportError};

/// Routes room events to peer sessions.
///
/// Events are handled strictly one at a time. Handling never waits on a
/// negotiation: payloads are queued on the target session, which works
/// through them on its own task.
pub struct Demultiplexer {
    registry: PeerRegistry,
    own_id: Option<MemberId>,
    room_rx: mpsc::Receiver<RoomEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    fault_tx: Option<mpsc::UnboundedSender<TransportError>>,
}

impl Demultiplexer {
    pub fn new(
        room_rx: mpsc::Receiver<RoomEvent>,
        engine: Arc<dyn MediaEngine>,
        output: Arc<dyn RoomOutput>,
    ) -> Self {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let publisher = OutboundPublisher::new(output);

        Self {
            registry: PeerRegistry::new(engine, publisher, session_tx),
            own_id: None,
            room_rx,
            session_rx,
            fault_tx: None,
        }
    }

    /// Transport faults are also forwarded here, for the owning process to
    /// decide whether to restart or exit.
    pub fn with_fault_reporter(mut self, fault_tx: mpsc::UnboundedSender<TransportError>) -> Self {
        self.fault_tx = Some(fault_tx);
        self
    }

    pub fn registry(&self) -> PeerRegistry {
        self.registry.clone()
    }

    pub fn own_id(&self) -> Option<&MemberId> {
        self.own_id.as_ref()
    }

    pub async fn run(mut self) {
        info!("Signaling router started");

        loop {
            tokio::select! {
                event = self.room_rx.recv() => {
                    match event {
                        Some(e) => {
                            if let Err(err) = self.dispatch(e).await {
                                report(&err);
                            }
                        }
                        None => {
                            info!("Room event stream closed. Shutting down router.");
                            break;
                        }
                    }
                }

                Some(evt) = self.session_rx.recv() => {
                    self.handle_session_event(evt).await;
                }
            }
        }

        self.registry.close_all().await;
        info!("Signaling router finished");
    }

    /// Takes the single action a room event calls for.
    pub async fn dispatch(&mut self, event: RoomEvent) -> Result<(), SignalError> {
        match event {
            RoomEvent::Literal(text) => {
                info!("Room literal: {}", text);
                Ok(())
            }

            RoomEvent::SelfJoined(own_id) => {
                info!("Joined room as {}", own_id);
                self.own_id = Some(own_id);
                Ok(())
            }

            RoomEvent::MemberJoined { member, metadata } => {
                if self.own_id.as_ref() == Some(&member) {
                    debug!("Ignoring own membership announcement");
                    return Ok(());
                }
                info!("Member joined: {}", describe(&member, &metadata));
                self.registry.get_or_create(&member);
                Ok(())
            }

            RoomEvent::MemberLeft { member, metadata } => {
                info!("Member left: {}", describe(&member, &metadata));
                self.registry.remove(&member);
                Ok(())
            }

            RoomEvent::Message { sender, payload } => {
                debug!("Signaling message from {}", sender);
                let Some(session) = self.registry.get(&sender) else {
                    return Err(SignalError::UnknownTarget(sender));
                };
                let payload = SignalPayload::from_value(&payload).map_err(|e| {
                    SignalError::MalformedPayload {
                        member: sender.clone(),
                        reason: e.to_string(),
                    }
                })?;
                session.handle_message(payload)
            }

            RoomEvent::TransportFault(fault) => {
                if let Some(fault_tx) = &self.fault_tx {
                    let _ = fault_tx.send(fault.clone());
                }
                Err(SignalError::TransportFault(fault))
            }
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        let SessionEvent {
            member,
            epoch,
            kind,
        } = event;

        let Some(session) = self
            .registry
            .get(&member)
            .filter(|session| session.epoch() == epoch)
        else {
            debug!("Dropping stale event for {} (epoch {})", member, epoch);
            return;
        };

        match kind {
            SessionEventKind::Link(state) => match state {
                LinkState::Connected => {
                    if session.mark_connected() {
                        info!("Media connected for {}", member);
                    }
                }
                LinkState::Disconnected => {
                    warn!("Media link to {} interrupted", member);
                }
                state if state.is_fatal() => {
                    error!("Media link to {} failed; tearing down session", member);
                    self.registry.remove_if_current(&member, epoch);
                }
                _ => {}
            },

            SessionEventKind::LocalCandidate(candidate) => {
                if let Err(e) = session.forward_local_candidate(candidate) {
                    debug!("{}", e);
                }
            }

            SessionEventKind::NegotiationFailed(reason) => {
                warn!("Dropping session for {} after failure: {}", member, reason);
                self.registry.remove_if_current(&member, epoch);
            }
        }
    }
}

fn report(err: &SignalError) {
    match err {
        e if e.is_expected() => debug!("{}", e),
        SignalError::TransportFault(fault) if fault.is_fatal() => error!("{}", err),
        _ => warn!("{}", err),
    }
}

fn describe(member: &MemberId, metadata: &Value) -> String {
    match metadata
        .get("clientData")
        .and_then(|data| data.get("name"))
        .and_then(Value::as_str)
    {
        Some(name) => format!("{name}-{member}"),
        None => member.to_string(),
    }
}
