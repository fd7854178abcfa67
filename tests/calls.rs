//! Integration tests for call negotiation and live streams.

mod common;

use chrono::Duration;
use common::{TestClient, TestServer, test_config};
use huddle::CoordError;
use huddle::auth::RelayRole;
use huddle_proto::{ClientCommand, RequestKind, RespondAction, Topic};

/// `from` asks `to` for a chat and `to` accepts.
async fn accepted_chat_request(from: &mut TestClient, to: &mut TestClient) {
    let receiver = to.identity().expect("signed in").to_string();
    let request = from
        .send(ClientCommand::CreateSessionRequest {
            receiver,
            kind: RequestKind::Chat,
            message: None,
        })
        .await
        .expect("chat request");
    to.send(ClientCommand::RespondSessionRequest {
        request_id: request["id"].as_str().expect("request id").into(),
        action: RespondAction::Accept,
    })
    .await
    .expect("accept chat request");
    from.drain();
    to.drain();
}

#[tokio::test]
async fn call_needs_an_accepted_chat_request() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let _bob = server.individual("bob").await;

    let err = alice
        .send(ClientCommand::InitiateCall {
            receiver: "bob".into(),
            broadcast: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::PreconditionFailed(_)));
}

#[tokio::test]
async fn ring_accept_and_hang_up() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;
    accepted_chat_request(&mut alice, &mut bob).await;

    let call = alice
        .send(ClientCommand::InitiateCall {
            receiver: "bob".into(),
            broadcast: false,
        })
        .await
        .expect("initiate call");
    assert_eq!(call["status"], "pending");
    let call_id = call["id"].as_str().unwrap().to_string();
    let channel = call["channel"].as_str().unwrap().to_string();

    // Calling again while the first is open returns the same call.
    let again = alice
        .send(ClientCommand::InitiateCall {
            receiver: "bob".into(),
            broadcast: false,
        })
        .await
        .unwrap();
    assert_eq!(again["id"], call_id.as_str());
    let names = bob.event_names();
    assert_eq!(names.iter().filter(|n| *n == "CallIncoming").count(), 1);

    let join = bob
        .send(ClientCommand::AcceptCall {
            call_id: call_id.clone(),
        })
        .await
        .expect("accept call");
    assert_eq!(join["call"]["status"], "accepted");
    assert_eq!(join["app_id"], common::APP_ID);

    let (token_channel, account, role) = server
        .issuer
        .inspect_relay_token(join["relay_token"].as_str().unwrap())
        .expect("valid relay token");
    assert_eq!(token_channel, channel);
    assert_eq!(account, "call_bob");
    assert_eq!(role, RelayRole::Publisher);

    let accepted = alice.expect_event("CallAccepted");
    let (_, caller_account, _) = server
        .issuer
        .inspect_relay_token(accepted["data"]["relay_token"].as_str().unwrap())
        .expect("caller token");
    assert_eq!(caller_account, "call_alice");

    server.clock.advance(Duration::seconds(90));
    let ended = alice
        .send(ClientCommand::EndCall {
            call_id: call_id.clone(),
        })
        .await
        .expect("end call");
    assert_eq!(ended["status"], "ended");
    assert_eq!(ended["duration_secs"], 90);
    bob.expect_event("CallEnded");

    let err = bob
        .send(ClientCommand::EndCall { call_id })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::InvalidState(_)));

    let history = bob
        .send(ClientCommand::GetCallHistory { limit: None })
        .await
        .unwrap();
    assert_eq!(history.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn accepted_call_request_offers_a_call() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;

    let request = alice
        .send(ClientCommand::CreateSessionRequest {
            receiver: "bob".into(),
            kind: RequestKind::Call,
            message: None,
        })
        .await
        .unwrap();
    let outcome = bob
        .send(ClientCommand::RespondSessionRequest {
            request_id: request["id"].as_str().unwrap().into(),
            action: RespondAction::Accept,
        })
        .await
        .expect("accept call request");
    assert_eq!(outcome["call"]["caller"], "alice");
    assert_eq!(outcome["call"]["status"], "pending");

    let offered = alice.expect_event("CallOffered");
    assert_eq!(offered["data"]["call"]["id"], outcome["call"]["id"]);

    let active = bob
        .send(ClientCommand::GetActiveCallWithPeer {
            peer: "alice".into(),
        })
        .await
        .unwrap();
    assert_eq!(active["id"], outcome["call"]["id"]);
}

#[tokio::test]
async fn rejected_call_notifies_the_caller() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;
    accepted_chat_request(&mut alice, &mut bob).await;

    let call = alice
        .send(ClientCommand::InitiateCall {
            receiver: "bob".into(),
            broadcast: false,
        })
        .await
        .unwrap();
    let call_id = call["id"].as_str().unwrap().to_string();

    let err = alice
        .send(ClientCommand::AcceptCall {
            call_id: call_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Forbidden(_)));

    let rejected = bob
        .send(ClientCommand::RejectCall { call_id })
        .await
        .unwrap();
    assert_eq!(rejected["status"], "rejected");
    alice.expect_event("CallRejected");
}

#[tokio::test]
async fn live_stream_viewers_are_capped_and_announced() {
    let mut config = test_config();
    config.sessions.max_stream_viewers = 1;
    let server = TestServer::with_config(config);
    let mut school = server.institution("school").await;
    let mut guest = server.individual("guest").await;
    let mut v1 = server.individual("v1").await;
    let mut v2 = server.individual("v2").await;
    accepted_chat_request(&mut school, &mut guest).await;

    let call = school
        .send(ClientCommand::InitiateCall {
            receiver: "guest".into(),
            broadcast: true,
        })
        .await
        .expect("stream call");
    let call_id = call["id"].as_str().unwrap().to_string();

    // Not accepted yet.
    let err = v1
        .send(ClientCommand::JoinLiveStream {
            call_id: call_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::InvalidState(_)));

    guest
        .send(ClientCommand::AcceptCall {
            call_id: call_id.clone(),
        })
        .await
        .unwrap();
    school.drain();

    let join = v1
        .send(ClientCommand::JoinLiveStream {
            call_id: call_id.clone(),
        })
        .await
        .expect("join stream");
    let (_, _, role) = server
        .issuer
        .inspect_relay_token(join["relay_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(role, RelayRole::Subscriber);
    let update = school.expect_event("StreamViewersUpdated");
    assert_eq!(update["data"]["count"], 1);

    // Viewers may follow the call topic, outsiders may not.
    v1.send(ClientCommand::Subscribe {
        topic: Topic::call(&call_id),
    })
    .await
    .expect("viewer follows call");

    let err = v2
        .send(ClientCommand::JoinLiveStream {
            call_id: call_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Full(_)));

    let err = guest
        .send(ClientCommand::JoinLiveStream {
            call_id: call_id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::InvalidArgument(_)));

    let left = v1
        .send(ClientCommand::LeaveLiveStream { call_id })
        .await
        .unwrap();
    assert_eq!(left["viewers"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn individuals_cannot_stream() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;
    accepted_chat_request(&mut alice, &mut bob).await;

    let err = alice
        .send(ClientCommand::InitiateCall {
            receiver: "bob".into(),
            broadcast: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Forbidden(_)));
}
