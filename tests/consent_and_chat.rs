//! Integration tests for the consent gate and chat negotiation.

mod common;

use common::TestServer;
use huddle::CoordError;
use huddle_proto::{ClientCommand, MessageKind, RequestKind, RespondAction, Topic};

#[tokio::test]
async fn connection_request_then_accept_unlocks_chat() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;

    let connection = alice
        .send(ClientCommand::RequestConnection { peer: "bob".into() })
        .await
        .expect("request connection");
    assert_eq!(connection["status"], "pending");
    let connection_id = connection["id"].as_str().expect("connection id").to_string();

    let requested = bob.expect_event("ConnectionRequested");
    assert_eq!(requested["data"]["connection"]["id"], connection_id.as_str());

    // No consent yet.
    let err = alice
        .send(ClientCommand::CreateChat { peer: "bob".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::PreconditionFailed(_)));

    let accepted = bob
        .send(ClientCommand::RespondConnection {
            connection_id: connection_id.clone(),
            action: RespondAction::Accept,
        })
        .await
        .expect("accept");
    assert_eq!(accepted["status"], "accepted");
    alice.expect_event("ConnectionUpdated");

    let status = alice
        .send(ClientCommand::GetConnectionStatus { peer: "bob".into() })
        .await
        .expect("status");
    assert_eq!(status["status"], "accepted");

    let chat = alice
        .send(ClientCommand::CreateChat { peer: "bob".into() })
        .await
        .expect("create chat");
    let again = bob
        .send(ClientCommand::CreateChat {
            peer: "alice".into(),
        })
        .await
        .expect("create chat again");
    assert_eq!(chat["id"], again["id"]);
    assert_eq!(bob.event_names().iter().filter(|n| *n == "ChatCreated").count(), 1);
}

#[tokio::test]
async fn rejected_connection_can_be_requested_again() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;

    let connection = alice
        .send(ClientCommand::RequestConnection { peer: "bob".into() })
        .await
        .unwrap();
    let id = connection["id"].as_str().unwrap().to_string();
    bob.send(ClientCommand::RespondConnection {
        connection_id: id.clone(),
        action: RespondAction::Reject,
    })
    .await
    .unwrap();

    let again = alice
        .send(ClientCommand::RequestConnection { peer: "bob".into() })
        .await
        .unwrap();
    assert_eq!(again["id"], id.as_str());
    assert_eq!(again["status"], "pending");
}

#[tokio::test]
async fn outsiders_cannot_answer_a_connection() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let _bob = server.individual("bob").await;
    let mut mallory = server.individual("mallory").await;

    let connection = alice
        .send(ClientCommand::RequestConnection { peer: "bob".into() })
        .await
        .unwrap();
    let err = mallory
        .send(ClientCommand::RespondConnection {
            connection_id: connection["id"].as_str().unwrap().into(),
            action: RespondAction::Accept,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Forbidden(_)));

    // Nor may the requester accept on the recipient's behalf.
    let err = alice
        .send(ClientCommand::RespondConnection {
            connection_id: connection["id"].as_str().unwrap().into(),
            action: RespondAction::Accept,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Forbidden(_)));
    let err = alice
        .send(ClientCommand::CreateChat { peer: "bob".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::PreconditionFailed(_)));
}

#[tokio::test]
async fn chat_request_flow_delivers_messages() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;

    let request = alice
        .send(ClientCommand::CreateSessionRequest {
            receiver: "bob".into(),
            kind: RequestKind::Chat,
            message: Some("hi, got a minute?".into()),
        })
        .await
        .expect("create request");
    bob.expect_event("SessionRequested");

    let duplicate = alice
        .send(ClientCommand::CreateSessionRequest {
            receiver: "bob".into(),
            kind: RequestKind::Chat,
            message: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(duplicate, CoordError::Conflict(_)));

    let outcome = bob
        .send(ClientCommand::RespondSessionRequest {
            request_id: request["id"].as_str().unwrap().into(),
            action: RespondAction::Accept,
        })
        .await
        .expect("accept request");
    assert_eq!(outcome["request"]["status"], "accepted");
    let chat_id = outcome["chat"]["id"].as_str().expect("chat created").to_string();
    alice.expect_event("ChatCreated");

    alice
        .send(ClientCommand::Subscribe {
            topic: Topic::chat(&chat_id),
        })
        .await
        .expect("subscribe to chat");

    bob.send(ClientCommand::SendMessage {
        chat_id: chat_id.clone(),
        content: "sure".into(),
        kind: MessageKind::default(),
    })
    .await
    .expect("send message");

    // Reaches alice once even though she follows both topics.
    let names = alice.event_names();
    assert_eq!(names.iter().filter(|n| *n == "MessageCreated").count(), 1);

    let marked = alice
        .send(ClientCommand::MarkRead {
            chat_id: chat_id.clone(),
        })
        .await
        .expect("mark read");
    assert_eq!(marked["marked"], 1);

    let page = alice
        .send(ClientCommand::GetMessages {
            chat_id: chat_id.clone(),
            before: None,
            limit: None,
        })
        .await
        .expect("history");
    assert_eq!(page.as_array().map(Vec::len), Some(1));
    assert_eq!(page[0]["content"], "sure");
}

#[tokio::test]
async fn strangers_cannot_follow_a_chat() {
    let server = TestServer::new();
    let mut alice = server.individual("alice").await;
    let mut bob = server.individual("bob").await;
    let mut eve = server.individual("eve").await;

    let connection = alice
        .send(ClientCommand::RequestConnection { peer: "bob".into() })
        .await
        .unwrap();
    bob.send(ClientCommand::RespondConnection {
        connection_id: connection["id"].as_str().unwrap().into(),
        action: RespondAction::Accept,
    })
    .await
    .unwrap();
    let chat = alice
        .send(ClientCommand::CreateChat { peer: "bob".into() })
        .await
        .unwrap();

    let err = eve
        .send(ClientCommand::Subscribe {
            topic: Topic::chat(chat["id"].as_str().unwrap()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Forbidden(_)));

    let err = eve
        .send(ClientCommand::Subscribe {
            topic: Topic::identity("alice"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::Forbidden(_)));
}

#[tokio::test]
async fn commands_require_authentication() {
    let server = TestServer::new();
    let mut anonymous = common::TestClient::open(server.coord.clone());

    let err = anonymous
        .send(ClientCommand::ListChats)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordError::InvalidCredential(_)));

    let pong = anonymous.send(ClientCommand::Ping).await.expect("ping");
    assert!(pong.get("pong").is_some());

    let err = anonymous.authenticate("v1.garbage.sig").await.unwrap_err();
    assert!(matches!(err, CoordError::InvalidCredential(_)));
    assert!(anonymous.identity().is_none());
}
