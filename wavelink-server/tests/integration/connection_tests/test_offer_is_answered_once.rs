use std::sync::Arc;

use wavelink_core::MemberId;
use wavelink_server::NegotiationState;

use crate::integration::{create_test_router, init_tracing};
use crate::utils::{
    MockMediaEngine, member_joined, next_document_for, offer_message, wait_for_state,
};

#[tokio::test]
async fn test_offer_is_answered_once() {
    init_tracing();

    let engine = MockMediaEngine::new();
    let mut router = create_test_router(Arc::new(engine.clone()));
    let alice = MemberId::from("alice");

    router.room_tx.send(member_joined(&alice, "alice")).await.unwrap();
    router.room_tx.send(offer_message(&alice, "offer-1")).await.unwrap();

    let answer = next_document_for(&mut router.output_rx, &alice)
        .await
        .expect("No answer published");
    assert_eq!(answer["targetId"], "alice");
    assert_eq!(answer["sdp"]["type"], "answer");
    assert_eq!(answer["sdp"]["sdp"], "answer-alice-1");

    let session = router.registry.get(&alice).expect("Session should exist");
    wait_for_state(&session, NegotiationState::Answered)
        .await
        .expect("Session not answered");

    let connection = engine.connection(&alice).await.expect("No connection created");
    let remote = connection.remote_descriptions().await;
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].sdp, "offer-1");

    // Same offer again: not reapplied, no second answer.
    router.room_tx.send(offer_message(&alice, "offer-1")).await.unwrap();
    router.room_tx.send(member_joined(&alice, "alice")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert_eq!(router.output.answers_for(&alice).await.len(), 1);
    assert_eq!(connection.answers(), 1);
    assert_eq!(engine.created().await, 1);
    assert_eq!(session.state(), NegotiationState::Answered);
}

#[tokio::test]
async fn test_new_offer_renegotiates_on_same_connection() {
    init_tracing();

    let engine = MockMediaEngine::new();
    let mut router = create_test_router(Arc::new(engine.clone()));
    let alice = MemberId::from("alice");

    router.room_tx.send(member_joined(&alice, "alice")).await.unwrap();
    router.room_tx.send(offer_message(&alice, "offer-1")).await.unwrap();
    next_document_for(&mut router.output_rx, &alice).await.unwrap();

    router.room_tx.send(offer_message(&alice, "offer-2")).await.unwrap();
    let second = next_document_for(&mut router.output_rx, &alice).await.unwrap();

    assert_eq!(second["sdp"]["sdp"], "answer-alice-2");
    assert_eq!(engine.created().await, 1);
}

#[tokio::test]
async fn test_answer_from_peer_is_ignored() {
    init_tracing();

    let engine = MockMediaEngine::new();
    let router = create_test_router(Arc::new(engine.clone()));
    let alice = MemberId::from("alice");

    router.room_tx.send(member_joined(&alice, "alice")).await.unwrap();
    router
        .room_tx
        .send(crate::utils::message(
            &alice,
            serde_json::json!({ "sdp": { "type": "answer", "sdp": "v=0" } }),
        ))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let session = router.registry.get(&alice).unwrap();
    assert_eq!(session.state(), NegotiationState::New);
    assert_eq!(engine.created().await, 0);
    assert!(router.output.documents().await.is_empty());
}
