use crate::transport::media_engine::{MediaConnection, MediaEngine};
use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::{LinkState, TransportEventSink};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use wavelink_core::{IceCandidate, MemberId, SdpKind, SessionDescription};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as CodecRegistry;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// `MediaEngine` backed by webrtc-rs.
#[derive(Debug, Clone, Default)]
pub struct WebRtcEngine {
    config: TransportConfig,
}

impl WebRtcEngine {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = self
            .config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn create_connection(
        &self,
        member: &MemberId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn MediaConnection>> {
        let connection = WebRtcConnection::new(member.clone(), self.rtc_configuration(), events)
            .await
            .with_context(|| format!("Failed to create peer connection for {member}"))?;
        Ok(Arc::new(connection))
    }
}

pub struct WebRtcConnection {
    member: MemberId,
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcConnection {
    async fn new(
        member: MemberId,
        rtc_config: RTCConfiguration,
        events: TransportEventSink,
    ) -> Result<Self> {
        // Codecs must be registered even though we only answer.
        let mut codecs = CodecRegistry::default();
        codecs.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut codecs)?;

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_events.clone();

                Box::pin(async move {
                    info!("Peer connection state for {}: {:?}", events.member(), s);
                    events.link_state(link_state(s));
                })
            },
        ));

        let ice_events = events;
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let events = ice_events.clone();

            Box::pin(async move {
                // `None` marks the end of local gathering.
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                debug!("Local ICE candidate for {}", events.member());
                events.local_candidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                });
            })
        }));

        Ok(Self {
            member,
            peer_connection,
        })
    }
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let desc = rtc_description(description)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .context("Failed to apply remote description")?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        Ok(answer.sdp)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let desc = rtc_description(description)?;
        self.peer_connection
            .set_local_description(desc)
            .await
            .context("Failed to apply local description")?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.peer_connection.local_description().await?;
        Some(SessionDescription {
            kind: sdp_kind(desc.sdp_type),
            sdp: desc.sdp,
        })
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            ..Default::default()
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing peer connection for {}", self.member);
        self.peer_connection.close().await?;
        Ok(())
    }
}

fn rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let desc = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        other => bail!("Unsupported session description type: {other:?}"),
    };
    Ok(desc)
}

fn sdp_kind(sdp_type: RTCSdpType) -> SdpKind {
    match sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        RTCSdpType::Rollback => SdpKind::Rollback,
        _ => SdpKind::Unknown,
    }
}

fn link_state(state: RTCPeerConnectionState) -> LinkState {
    match state {
        RTCPeerConnectionState::Connecting => LinkState::Connecting,
        RTCPeerConnectionState::Connected => LinkState::Connected,
        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
        RTCPeerConnectionState::Failed => LinkState::Failed,
        RTCPeerConnectionState::Closed => LinkState::Closed,
        _ => LinkState::New,
    }
}
