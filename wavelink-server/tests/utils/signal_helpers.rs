use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use wavelink_core::{MemberId, RoomEvent};
use wavelink_server::{NegotiationState, PeerSession, TARGET_ID_FIELD};

use super::test_client::TestClient;

/// Timeout for signal exchange operations (ms).
pub const SIGNAL_TIMEOUT_MS: u64 = 5000;

/// Timeout for ICE gathering (ms).
pub const ICE_GATHERING_TIMEOUT_MS: u64 = 3000;

/// Timeout for connection establishment (ms).
pub const CONNECTION_TIMEOUT_MS: u64 = 10000;

pub fn member_joined(member: &MemberId, name: &str) -> RoomEvent {
    RoomEvent::MemberJoined {
        member: member.clone(),
        metadata: json!({ "id": member.as_str(), "clientData": { "name": name } }),
    }
}

pub fn member_left(member: &MemberId) -> RoomEvent {
    RoomEvent::MemberLeft {
        member: member.clone(),
        metadata: json!({ "id": member.as_str() }),
    }
}

pub fn message(sender: &MemberId, payload: Value) -> RoomEvent {
    RoomEvent::Message {
        sender: sender.clone(),
        payload,
    }
}

pub fn offer_message(sender: &MemberId, sdp: &str) -> RoomEvent {
    message(sender, json!({ "sdp": { "type": "offer", "sdp": sdp } }))
}

pub fn candidate_message(sender: &MemberId, candidate: &str) -> RoomEvent {
    message(
        sender,
        json!({ "candidate": { "candidate": candidate, "sdpMid": "0", "sdpMLineIndex": 0 } }),
    )
}

/// Waits until the session reaches `expected`.
pub async fn wait_for_state(session: &PeerSession, expected: NegotiationState) -> Result<()> {
    let mut rx = session.subscribe();
    tokio::time::timeout(
        Duration::from_millis(SIGNAL_TIMEOUT_MS),
        rx.wait_for(|state| *state == expected),
    )
    .await
    .with_context(|| format!("Timeout waiting for {expected:?} (now {:?})", session.state()))?
    .context("Session state channel closed")?;
    Ok(())
}

/// Polls `condition` until it holds or the signal timeout elapses.
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(SIGNAL_TIMEOUT_MS);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Next document published to `member`, skipping everything else.
pub async fn next_document_for(
    output_rx: &mut mpsc::UnboundedReceiver<Value>,
    member: &MemberId,
) -> Result<Value> {
    let recv = async {
        while let Some(doc) = output_rx.recv().await {
            if doc[TARGET_ID_FIELD] == member.as_str() {
                return Some(doc);
            }
        }
        None
    };

    tokio::time::timeout(Duration::from_millis(SIGNAL_TIMEOUT_MS), recv)
        .await
        .context("Timeout waiting for outbound signal")?
        .context("Output channel closed")
}

/// Full offer/answer exchange between a real client and the router.
pub async fn perform_signaling(
    client: &TestClient,
    room_tx: &mpsc::Sender<RoomEvent>,
    output_rx: &mut mpsc::UnboundedReceiver<Value>,
) -> Result<()> {
    let member = client.member.clone();

    room_tx
        .send(member_joined(&member, "test-client"))
        .await
        .context("Failed to announce member")?;

    let offer = client
        .create_offer()
        .await
        .context("Failed to create offer")?;
    tracing::debug!("[SignalHelper] Created offer for {}", member);

    room_tx
        .send(offer_message(&member, &offer))
        .await
        .context("Failed to send offer")?;

    let answer = loop {
        let doc = next_document_for(output_rx, &member).await?;
        if let Some(sdp) = doc["sdp"]["sdp"].as_str() {
            break sdp.to_owned();
        }
    };
    tracing::debug!("[SignalHelper] Received answer for {}", member);

    client
        .set_remote_answer(answer)
        .await
        .context("Failed to set remote answer")?;

    for candidate in client.gather_ice_candidates(ICE_GATHERING_TIMEOUT_MS).await? {
        let _ = room_tx
            .send(message(&member, json!({ "candidate": candidate })))
            .await;
    }

    Ok(())
}

/// Feeds router-trickled candidates to the client until it connects.
pub async fn connect_client(
    client: &TestClient,
    output_rx: &mut mpsc::UnboundedReceiver<Value>,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(CONNECTION_TIMEOUT_MS);

    while tokio::time::Instant::now() < deadline {
        if client.wait_for_connection(0).await.is_ok() {
            return Ok(());
        }

        match tokio::time::timeout(Duration::from_millis(100), output_rx.recv()).await {
            Ok(Some(mut doc)) if doc[TARGET_ID_FIELD] == client.member.as_str() => {
                if let Some(candidate) = doc.get_mut("candidate").map(Value::take) {
                    if let Err(e) = client.add_ice_candidate(candidate).await {
                        tracing::warn!("[SignalHelper] Failed to add ICE candidate: {}", e);
                    }
                }
            }
            Ok(Some(_)) | Err(_) => continue,
            Ok(None) => break,
        }
    }

    client.wait_for_connection(0).await
}
