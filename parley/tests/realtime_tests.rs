//! Integration tests for the realtime client
//!
//! These run a scripted websocket server on a random local port and check
//! joins, change delivery, reconnects and the sync driver on top.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};

use common::{direct_chat, message, record, user, MockBackend};
use parley_lib::realtime::{ChangeFilter, ChangeKind, RealtimeClient};
use parley_lib::sync::{ChatStore, Intent, Notifier, SyncDriver};

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

/// Bind a listener and a client pointed at it
async fn start(heartbeat: Duration) -> (TcpListener, RealtimeClient) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!(
        "ws://{}/realtime/v1/websocket?apikey=anon&vsn=1.0.0",
        listener.local_addr().unwrap()
    );
    let client = RealtimeClient::with_url(url, heartbeat, Duration::from_millis(50));
    (listener, client)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("Timeout waiting for client")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Next frame with the given event, skipping everything else
async fn next_event(ws: &mut ServerSocket, event: &str) -> Value {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .unwrap_or_else(|_| panic!("Timeout waiting for {}", event))
            .expect("Stream closed")
            .expect("Read error");
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).unwrap();
            if frame["event"] == event {
                return frame;
            }
        }
    }
}

async fn send(ws: &mut ServerSocket, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn reply_ok(ws: &mut ServerSocket, join: &Value) {
    send(
        ws,
        json!({
            "topic": join["topic"],
            "event": "phx_reply",
            "ref": join["ref"],
            "payload": { "status": "ok", "response": { "postgres_changes": [] } }
        }),
    )
    .await;
}

async fn push_change(ws: &mut ServerSocket, topic: &str, kind: &str, row: Value) {
    send(
        ws,
        json!({
            "topic": topic,
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "type": kind,
                    "schema": "public",
                    "table": "messages",
                    "record": row,
                    "old_record": null,
                    "commit_timestamp": "2024-03-01T12:00:00Z",
                    "columns": [],
                    "errors": null
                }
            }
        }),
    )
    .await;
}

#[tokio::test]
async fn test_join_carries_filter_and_token() {
    let (listener, client) = start(Duration::from_secs(30)).await;
    client.set_access_token(Some("jwt-1".to_string()));
    let _sub = client.subscribe(
        "messages-realtime-chat-c1",
        ChangeFilter::table("messages")
            .on(ChangeKind::Insert)
            .column_eq("chat_id", "c1"),
    );
    client.connect();

    let mut ws = accept(&listener).await;
    let join = next_event(&mut ws, "phx_join").await;

    assert_eq!(join["topic"], "realtime:messages-realtime-chat-c1");
    assert_eq!(join["payload"]["access_token"], "jwt-1");
    let config = &join["payload"]["config"]["postgres_changes"][0];
    assert_eq!(config["event"], "INSERT");
    assert_eq!(config["table"], "messages");
    assert_eq!(config["filter"], "chat_id=eq.c1");

    client.disconnect();
}

#[tokio::test]
async fn test_changes_are_routed_by_topic_and_filter() {
    let (listener, client) = start(Duration::from_secs(30)).await;
    let mut open = client.subscribe(
        "messages-realtime-chat-c1",
        ChangeFilter::table("messages")
            .on(ChangeKind::Insert)
            .column_eq("chat_id", "c1"),
    );
    let mut all = client.subscribe("chats-realtime-me", ChangeFilter::table("messages"));
    client.connect();

    let mut ws = accept(&listener).await;
    let join = next_event(&mut ws, "phx_join").await;
    reply_ok(&mut ws, &join).await;

    let topic = "realtime:messages-realtime-chat-c1";
    push_change(&mut ws, topic, "INSERT", json!({ "id": "x", "chat_id": "c2" })).await;
    push_change(&mut ws, topic, "INSERT", json!({ "id": "m1", "chat_id": "c1" })).await;
    push_change(&mut ws, "realtime:chats-realtime-me", "DELETE", json!({ "id": "m0", "chat_id": "c1" })).await;

    let event = timeout(WAIT, open.recv()).await.unwrap().unwrap();
    assert_eq!(event.record["id"], "m1");
    assert_eq!(event.kind, ChangeKind::Insert);

    let event = timeout(WAIT, all.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Delete);

    // The c2 row never reached the open-chat stream
    assert!(open.try_recv().is_none());

    client.disconnect();
}

#[tokio::test]
async fn test_unsubscribe_sends_leave() {
    let (listener, client) = start(Duration::from_secs(30)).await;
    let sub = client.subscribe("chats-realtime-me", ChangeFilter::table("messages"));
    client.connect();

    let mut ws = accept(&listener).await;
    next_event(&mut ws, "phx_join").await;

    client.unsubscribe(sub);
    let leave = next_event(&mut ws, "phx_leave").await;
    assert_eq!(leave["topic"], "realtime:chats-realtime-me");

    client.disconnect();
}

#[tokio::test]
async fn test_token_refresh_is_pushed_to_channels() {
    let (listener, client) = start(Duration::from_secs(30)).await;
    let _sub = client.subscribe("chats-realtime-me", ChangeFilter::table("messages"));
    client.connect();

    let mut ws = accept(&listener).await;
    next_event(&mut ws, "phx_join").await;

    client.set_access_token(Some("jwt-2".to_string()));
    let frame = next_event(&mut ws, "access_token").await;
    assert_eq!(frame["topic"], "realtime:chats-realtime-me");
    assert_eq!(frame["payload"]["access_token"], "jwt-2");

    client.disconnect();
}

#[tokio::test]
async fn test_heartbeats_are_sent() {
    let (listener, client) = start(Duration::from_millis(50)).await;
    client.connect();

    let mut ws = accept(&listener).await;
    let heartbeat = next_event(&mut ws, "heartbeat").await;
    assert_eq!(heartbeat["topic"], "phoenix");

    client.disconnect();
}

#[tokio::test]
async fn test_channels_rejoin_after_reconnect() {
    let (listener, client) = start(Duration::from_secs(30)).await;
    client.set_access_token(Some("jwt-1".to_string()));
    let mut sub = client.subscribe("chats-realtime-me", ChangeFilter::table("messages"));
    client.connect();

    let mut first = accept(&listener).await;
    next_event(&mut first, "phx_join").await;
    first.close(None).await.unwrap();
    drop(first);

    let mut second = accept(&listener).await;
    let join = next_event(&mut second, "phx_join").await;
    assert_eq!(join["topic"], "realtime:chats-realtime-me");
    assert_eq!(join["payload"]["access_token"], "jwt-1");

    push_change(&mut second, "realtime:chats-realtime-me", "UPDATE", json!({ "id": "m1" })).await;
    let event = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, ChangeKind::Update);

    client.disconnect();
}

#[tokio::test]
async fn test_disconnect_closes_socket() {
    let (listener, client) = start(Duration::from_secs(30)).await;
    client.connect();

    let mut ws = accept(&listener).await;
    timeout(WAIT, async {
        while !client.is_connected().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    client.disconnect();

    let closed = timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                _ => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    timeout(WAIT, async {
        while client.is_connected().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_driver_merges_pushed_message_into_view() {
    let me = user("me", "Me");
    let bob = user("bob", "Bob");
    let backend = Arc::new(
        MockBackend::new()
            .with_user(me.clone())
            .with_user(bob.clone())
            .with_chats(vec![direct_chat("A", &[&me, &bob])])
            .with_messages("A", vec![message("a1", "A", "bob", "hi", 0)]),
    );

    let (listener, realtime) = start(Duration::from_secs(30)).await;
    realtime.connect();
    let store = ChatStore::new(backend.clone(), me.clone(), Notifier::new());
    let (driver, handle) = SyncDriver::new(store, realtime.clone());
    let session = tokio::spawn(driver.run());

    // Wait until the open chat's own channel is joined
    let mut ws = accept(&listener).await;
    loop {
        let join = next_event(&mut ws, "phx_join").await;
        reply_ok(&mut ws, &join).await;
        if join["topic"] == "realtime:messages-realtime-chat-A" {
            assert_eq!(
                join["payload"]["config"]["postgres_changes"][0]["filter"],
                "chat_id=eq.A"
            );
            break;
        }
    }

    let pushed = message("a2", "A", "bob", "are you there?", 1);
    push_change(&mut ws, "realtime:messages-realtime-all-me", "INSERT", record(&pushed)).await;
    // Same row on the open chat's channel must not show twice
    push_change(&mut ws, "realtime:messages-realtime-chat-A", "INSERT", record(&pushed)).await;

    let mut view = handle.watch();
    let seen = timeout(WAIT, async {
        loop {
            {
                let current = view.borrow_and_update();
                let merged = current.messages.iter().any(|m| m.id == "a2")
                    && current.chats[0].last_message.as_deref() == Some("are you there?");
                if merged {
                    return current.clone();
                }
            }
            view.changed().await.unwrap();
        }
    })
    .await
    .expect("pushed message never reached the view");

    assert_eq!(seen.selected.as_deref(), Some("A"));
    assert_eq!(seen.title.as_deref(), Some("Bob"));
    let pushed_view = seen.messages.iter().find(|m| m.id == "a2").unwrap();
    assert_eq!(pushed_view.display_sender(), "Bob");
    assert_eq!(seen.chats[0].last_message.as_deref(), Some("are you there?"));

    handle.send(Intent::Shutdown).unwrap();
    let store = timeout(WAIT, session).await.unwrap().unwrap();
    let ids: Vec<&str> = store.visible_messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["a1", "a2"]);
    realtime.disconnect();
}
