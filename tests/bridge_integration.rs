//! Bridge messaging client integration tests
//!
//! Exercises `BridgeClient` against a `wiremock` server standing in for the
//! bridge service: session setup, the SSE event feed and outbound commands.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wagpt::messaging::{
    BridgeClientFactory, ChatPresence, ChatPresenceMedia, ClientFactory, ClientProps, Event,
    EventHandler, Jid, MessagingClient, OutgoingMessage, Presence,
};
use wagpt::store::DeviceIdentity;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Forward(mpsc::UnboundedSender<Event>);

#[async_trait]
impl EventHandler for Forward {
    async fn handle(&self, event: Event) {
        let _ = self.0.send(event);
    }
}

fn linked_identity() -> DeviceIdentity {
    DeviceIdentity {
        jid: Some("628000000001@s.whatsapp.net".parse().unwrap()),
        credentials: json!({ "noise_key": "abc" }),
        ..DeviceIdentity::unpaired()
    }
}

fn build(server: &MockServer, identity: DeviceIdentity) -> Arc<dyn MessagingClient> {
    BridgeClientFactory::new(&server.uri())
        .expect("factory")
        .build(identity, &ClientProps::default())
        .expect("client")
}

async fn mount_session(server: &MockServer, events: &str) {
    Mock::given(method("POST"))
        .and(path("/session/connect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "sess-1",
            "jid": "628000000001@s.whatsapp.net",
            "logged_in": true
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .and(header("x-session-id", "sess-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(events.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_delivers_events_to_handlers() {
    let server = MockServer::start().await;
    let events = concat!(
        "data: {\"type\":\"connected\"}\n\n",
        "data: {\"type\":\"message\",\"info\":{\"id\":\"M1\",",
        "\"chat\":\"628111222333@s.whatsapp.net\",",
        "\"sender\":\"628111222333@s.whatsapp.net\"},",
        "\"conversation\":\"ask what is 2+2\"}\n\n",
    );
    mount_session(&server, events).await;

    let client = build(&server, linked_identity());
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.add_event_handler(Arc::new(Forward(tx)));

    client.connect().await.expect("connect");
    assert!(client.is_logged_in());
    assert_eq!(client.own_id().unwrap().user, "628000000001");

    let mut bodies = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        if let Event::Message(message) = event {
            bodies.push(message.body().to_string());
            break;
        }
    }
    assert_eq!(bodies, vec!["ask what is 2+2".to_string()]);
}

#[tokio::test]
async fn test_event_stream_end_marks_disconnected() {
    let server = MockServer::start().await;
    mount_session(&server, "data: {\"type\":\"connected\"}\n\n").await;

    let client = build(&server, linked_identity());
    client.connect().await.expect("connect");

    let mut connected = true;
    for _ in 0..100 {
        if !client.is_connected() {
            connected = false;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!connected, "client should notice the closed event stream");
}

#[tokio::test]
async fn test_connect_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/connect"))
        .respond_with(ResponseTemplate::new(503).set_body_string("bridge starting"))
        .mount(&server)
        .await;

    let client = build(&server, linked_identity());
    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_commands_carry_session_header() {
    let server = MockServer::start().await;
    mount_session(&server, ": keep-alive\n\n").await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-session-id", "sess-1"))
        .and(body_partial_json(json!({
            "to": "628111222333@s.whatsapp.net",
            "message": { "kind": "reply", "body": "Four.", "quoted_id": "M1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "3EB0AAAA" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/presence"))
        .and(body_partial_json(json!({ "presence": "available" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat-presence"))
        .and(body_partial_json(json!({ "state": "composing", "media": "text" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = build(&server, linked_identity());
    client.connect().await.expect("connect");

    let chat: Jid = "628111222333@s.whatsapp.net".parse().unwrap();
    client.send_presence(Presence::Available).await.unwrap();
    client
        .send_chat_presence(&chat, ChatPresence::Composing, ChatPresenceMedia::Text)
        .await
        .unwrap();

    let receipt = client
        .send_message(
            &chat,
            "3EB0AAAA",
            OutgoingMessage::Reply {
                body: "Four.".to_string(),
                quoted_id: "M1".to_string(),
                quoted_sender: chat.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.id, "3EB0AAAA");
}

#[tokio::test]
async fn test_pair_phone_returns_code_with_default_expiry() {
    let server = MockServer::start().await;
    mount_session(&server, ": idle\n\n").await;

    Mock::given(method("POST"))
        .and(path("/pair/phone"))
        .and(body_partial_json(json!({
            "phone": "628111222333",
            "show_push_notification": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "WXYZ-1234" })))
        .mount(&server)
        .await;

    let client = build(&server, DeviceIdentity::unpaired());
    client.connect().await.expect("connect");

    let code = client
        .pair_phone("628111222333", true, "Chrome (Linux)")
        .await
        .unwrap();
    assert_eq!(code.code, "WXYZ-1234");
    assert_eq!(code.expires_in, 160);
}

#[tokio::test]
async fn test_qr_codes_stream() {
    let server = MockServer::start().await;
    let frames = concat!(
        "data: {\"code\":\"2@first\",\"timeout\":60}\n\n",
        "data: {\"code\":\"2@second\",\"timeout\":20}\n\n",
        "event: done\ndata: {}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/pair/qr"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(frames.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = build(&server, DeviceIdentity::unpaired());
    let mut codes = client.qr_codes().await.unwrap();

    let first = codes.recv().await.unwrap();
    assert_eq!(first.code, "2@first");
    assert_eq!(first.timeout, 60);
    assert_eq!(codes.recv().await.unwrap().code, "2@second");
    assert!(codes.recv().await.is_none());
}

#[tokio::test]
async fn test_logout_clears_login_state() {
    let server = MockServer::start().await;
    mount_session(&server, ": idle\n\n").await;

    Mock::given(method("POST"))
        .and(path("/session/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = build(&server, linked_identity());
    client.connect().await.unwrap();
    client.logout().await.unwrap();

    assert!(!client.is_logged_in());
    assert!(!client.is_connected());
}
