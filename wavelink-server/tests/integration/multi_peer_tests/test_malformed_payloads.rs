use std::sync::Arc;

use serde_json::json;
use wavelink_core::{MemberId, SignalError};
use wavelink_server::NegotiationState;

use crate::integration::{create_manual_router, init_tracing};
use crate::utils::{
    MockMediaEngine, member_joined, message, offer_message, wait_for_state,
};

#[tokio::test]
async fn test_malformed_payload_keeps_session_state() {
    init_tracing();

    let engine = MockMediaEngine::new();
    let (mut router, output) = create_manual_router(Arc::new(engine.clone()));
    let alice = MemberId::from("alice");
    let bob = MemberId::from("bob");

    router.dispatch(member_joined(&alice, "alice")).await.unwrap();
    router.dispatch(member_joined(&bob, "bob")).await.unwrap();

    for payload in [json!("{not json"), json!(42), json!(["sdp"])] {
        let result = router.dispatch(message(&alice, payload)).await;
        assert!(
            matches!(result, Err(SignalError::MalformedPayload { ref member, .. }) if member == &alice),
            "unexpected result: {result:?}"
        );
    }

    let registry = router.registry();
    let alice_session = registry.get(&alice).expect("Session must survive");
    assert_eq!(alice_session.state(), NegotiationState::New);
    assert_eq!(engine.created().await, 0);

    // Neighbours and the offending member both still negotiate normally.
    router.dispatch(offer_message(&bob, "offer-bob")).await.unwrap();
    router.dispatch(offer_message(&alice, "offer-alice")).await.unwrap();

    wait_for_state(&alice_session, NegotiationState::Answered).await.unwrap();
    let bob_session = registry.get(&bob).unwrap();
    wait_for_state(&bob_session, NegotiationState::Answered).await.unwrap();
    assert_eq!(output.answers_for(&alice).await.len(), 1);
}

#[tokio::test]
async fn test_string_encoded_payload_is_accepted() {
    init_tracing();

    let engine = MockMediaEngine::new();
    let (mut router, output) = create_manual_router(Arc::new(engine.clone()));
    let alice = MemberId::from("alice");

    router.dispatch(member_joined(&alice, "alice")).await.unwrap();

    let encoded = json!({ "sdp": { "type": "offer", "sdp": "offer-1" } }).to_string();
    router.dispatch(message(&alice, json!(encoded))).await.unwrap();

    let session = router.registry().get(&alice).unwrap();
    wait_for_state(&session, NegotiationState::Answered).await.unwrap();
    assert_eq!(output.answers_for(&alice).await, vec!["answer-alice-1"]);
}
