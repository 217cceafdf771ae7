//! Integration tests for the connection manager
//!
//! Mock-connector tests run on a paused clock; the loopback test at the end
//! goes through a real WebSocket handshake.

mod common;

use common::{drain_events, settle, MockConnector, MockWsServer, OpenOutcome};
use realtime_channel::{
    builder, ChannelConfig, ChannelError, ChannelEvent, ConnectionManager, ConnectionState,
    Diagnostic, Envelope, Identity, Result, Scope,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn manager_with(connector: &MockConnector, config: ChannelConfig) -> ConnectionManager {
    builder()
        .url("ws://collab.test/realtime")
        .identity(Identity::new("u1").with_token("t"))
        .config(config)
        .connector(connector.clone())
        .build()
        .unwrap()
}

fn manager(connector: &MockConnector) -> ConnectionManager {
    manager_with(connector, ChannelConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_connect_reaches_connected() {
    verbose_println!("Testing basic connect...");

    let connector = MockConnector::accepting();
    let channel = manager(&connector);

    assert_eq!(channel.connect().await, ConnectionState::Connected);
    assert_eq!(connector.opens(), 1);
    assert!(channel.status().is_live());
    assert_eq!(drain_events(&channel), vec![ChannelEvent::Connected]);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_is_noop() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);

    channel.connect().await;
    assert_eq!(channel.connect().await, ConnectionState::Connected);
    assert_eq!(connector.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_connects_open_one_transport() {
    let connector = MockConnector::new(OpenOutcome::AcceptAfter(Duration::from_millis(500)));
    let channel = manager(&connector);

    let (first, second) = tokio::join!(channel.connect(), channel.connect());

    assert_eq!(first, ConnectionState::Connected);
    assert_eq!(second, ConnectionState::Connecting);
    assert_eq!(connector.opens(), 1);
    assert_eq!(connector.link_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_envelopes_drain_in_order_on_connect() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);

    for event_type in ["a", "b", "c"] {
        channel.send(event_type, Scope::workspace("w1"), json!({}));
    }
    assert_eq!(channel.status().queued_count, 3);

    channel.connect().await;

    assert_eq!(connector.last_link().written_app_types(), vec!["a", "b", "c"]);
    let status = channel.status();
    assert_eq!(status.queued_count, 0);
    assert_eq!(status.metrics.messages_sent, 3);
}

#[tokio::test(start_paused = true)]
async fn test_queue_overflow_drops_oldest() {
    let connector = MockConnector::accepting();
    let channel = manager_with(&connector, ChannelConfig::default().with_queue_capacity(3));

    for event_type in ["A", "B", "C", "D"] {
        channel.send(event_type, Scope::Global, Value::Null);
    }

    let status = channel.status();
    assert_eq!(status.queued_count, 3);
    assert_eq!(status.metrics.dropped_count, 1);
    assert!(drain_events(&channel).contains(&ChannelEvent::Diagnostic(
        Diagnostic::QueueOverflow {
            dropped_type: "A".to_string(),
            total_dropped: 1,
        }
    )));

    channel.connect().await;
    assert_eq!(connector.last_link().written_app_types(), vec!["B", "C", "D"]);
    assert_eq!(channel.status().metrics.dropped_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_undrained_events_stay_bounded_under_overflow() {
    let connector = MockConnector::refusing();
    let channel = manager_with(
        &connector,
        ChannelConfig::default()
            .with_queue_capacity(1)
            .with_event_buffer_capacity(8),
    );
    let events = channel.events();

    for i in 0..1000 {
        channel.send("edit", Scope::Global, json!({ "n": i }));
    }

    let status = channel.status();
    assert_eq!(status.queued_count, 1);
    assert_eq!(status.metrics.dropped_count, 999);
    assert_eq!(events.len(), 8);
    assert_eq!(status.metrics.events_dropped, 999 - 8);

    let pending = drain_events(&channel);
    assert_eq!(
        pending.last(),
        Some(&ChannelEvent::Diagnostic(Diagnostic::QueueOverflow {
            dropped_type: "edit".to_string(),
            total_dropped: 999,
        }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_send_while_connected_writes_immediately() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    channel.connect().await;

    channel.send_envelope(Envelope::new(
        "cursor_moved",
        Scope::file_collaborators("f1"),
        json!({ "line": 7 }),
    ));

    assert_eq!(connector.last_link().written_app_types(), vec!["cursor_moved"]);
    assert_eq!(channel.status().queued_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_falls_back_to_queue() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    channel.connect().await;
    drain_events(&channel);

    let link = connector.last_link();
    link.fail_writes(true);
    channel.send("edit", Scope::Global, Value::Null);

    assert_eq!(channel.status().queued_count, 1);
    let events = drain_events(&channel);
    assert!(events.iter().any(|e| matches!(
        e,
        ChannelEvent::Diagnostic(Diagnostic::WriteFailed { event_type, .. }) if event_type == "edit"
    )));

    // the backlog goes out ahead of newer envelopes once writes succeed
    link.fail_writes(false);
    channel.send("save", Scope::Global, Value::Null);
    assert_eq!(link.written_app_types(), vec!["edit", "save"]);
    assert_eq!(channel.status().queued_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_handlers_receive_in_registration_order() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let seen = seen.clone();
        channel.on("file_updated", move |envelope: &Envelope| -> Result<()> {
            seen.lock()
                .push(format!("{}:{}", tag, envelope.payload()["path"].as_str().unwrap_or("")));
            Ok(())
        });
    }

    channel.connect().await;
    connector
        .last_link()
        .push("file_updated", json!({ "path": "src/main.rs" }));
    settle().await;

    assert_eq!(
        *seen.lock(),
        vec!["first:src/main.rs".to_string(), "second:src/main.rs".to_string()]
    );
    assert_eq!(channel.status().metrics.messages_received, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_handlers_do_not_block_others() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    let delivered = Arc::new(AtomicUsize::new(0));

    let failing = channel.on("comment_added", |_: &Envelope| -> Result<()> {
        Err(ChannelError::handler("comment store unavailable"))
    });
    channel.on("comment_added", |_: &Envelope| -> Result<()> {
        panic!("handler bug")
    });
    {
        let delivered = delivered.clone();
        channel.on("comment_added", move |_: &Envelope| -> Result<()> {
            delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    channel.connect().await;
    connector.last_link().push("comment_added", json!({ "id": 1 }));
    settle().await;

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert!(channel.is_connected());

    let events = drain_events(&channel);
    assert!(events.iter().any(|e| matches!(
        e,
        ChannelEvent::Diagnostic(Diagnostic::HandlerFailed { handler_id, .. }) if *handler_id == failing
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, ChannelEvent::Diagnostic(Diagnostic::HandlerPanicked { .. }))));
}

#[tokio::test(start_paused = true)]
async fn test_off_stops_delivery() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    let delivered = Arc::new(AtomicUsize::new(0));

    let id = {
        let delivered = delivered.clone();
        channel.on("typing", move |_: &Envelope| -> Result<()> {
            delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    channel.connect().await;
    let link = connector.last_link();
    link.push("typing", Value::Null);
    settle().await;

    assert!(channel.off("typing", id));
    assert!(!channel.off("typing", id));
    link.push("typing", Value::Null);
    settle().await;

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(channel.handler_count("typing"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unrouted_envelopes_reach_fallback() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    let unrouted = Arc::new(parking_lot::Mutex::new(Vec::new()));

    {
        let unrouted = unrouted.clone();
        channel.on_unrouted(move |envelope: &Envelope| -> Result<()> {
            unrouted.lock().push(envelope.event_type().to_string());
            Ok(())
        });
    }

    channel.connect().await;
    connector.last_link().push("brand_new_event", Value::Null);
    settle().await;

    assert_eq!(*unrouted.lock(), vec!["brand_new_event".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_presence_follows_server_notifications() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    let notified = Arc::new(AtomicUsize::new(0));
    {
        let notified = notified.clone();
        channel.on("user_online", move |_: &Envelope| -> Result<()> {
            notified.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    channel.connect().await;
    let link = connector.last_link();
    link.push("user_online", json!({ "userId": "u2" }));
    link.push("user_online", json!({ "userId": "u3" }));
    link.push("user_offline", json!({ "userId": "u3" }));
    link.push("user_offline", json!({ "userId": "never-seen" }));
    settle().await;

    assert!(channel.is_online("u2"));
    assert!(!channel.is_online("u3"));
    assert_eq!(channel.online_count(), 1);
    assert_eq!(notified.load(Ordering::SeqCst), 2);

    link.push("online_users", json!({ "users": ["u5", "u4"] }));
    settle().await;
    assert_eq!(channel.online_identities(), vec!["u4", "u5"]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_reported_and_skipped() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let delivered = delivered.clone();
        channel.on("edit", move |_: &Envelope| -> Result<()> {
            delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    channel.connect().await;
    let link = connector.last_link();
    link.push_raw("{not json");
    link.push("edit", Value::Null);
    settle().await;

    assert!(channel.is_connected());
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert!(drain_events(&channel)
        .iter()
        .any(|e| matches!(e, ChannelEvent::Diagnostic(Diagnostic::MalformedFrame { length: 9, .. }))));
}

#[tokio::test(start_paused = true)]
async fn test_server_ping_is_answered() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    let pings_seen = Arc::new(AtomicUsize::new(0));
    {
        let pings_seen = pings_seen.clone();
        channel.on("ping", move |_: &Envelope| -> Result<()> {
            pings_seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    channel.connect().await;
    let link = connector.last_link();
    link.push("ping", Value::Null);
    settle().await;

    assert_eq!(link.written_types(), vec!["pong"]);
    // heartbeat traffic never reaches handlers
    assert_eq!(pings_seen.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_is_final_until_connect() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);

    channel.connect().await;
    drain_events(&channel);
    let link = connector.last_link();

    channel.close();

    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    assert_eq!(link.closes(), vec![(1000, "client closed".to_string())]);
    assert!(matches!(
        drain_events(&channel).as_slice(),
        [ChannelEvent::Disconnected { .. }]
    ));

    // no heartbeat or reconnect survives the close
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.opens(), 1);
    assert!(link.written_types().is_empty());
    assert!(drain_events(&channel).is_empty());

    // envelopes sent while closed wait for the next connect
    channel.send("edit", Scope::Global, Value::Null);
    assert_eq!(channel.connect().await, ConnectionState::Connected);
    assert_eq!(connector.last_link().written_app_types(), vec!["edit"]);
}

#[tokio::test(start_paused = true)]
async fn test_handler_may_close_the_channel() {
    let connector = MockConnector::accepting();
    let channel = manager(&connector);
    {
        let handle = channel.clone();
        channel.on("session_revoked", move |_: &Envelope| -> Result<()> {
            handle.close();
            Ok(())
        });
    }

    channel.connect().await;
    connector.last_link().push("session_revoked", Value::Null);
    settle().await;

    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.opens(), 1);
}

#[tokio::test]
async fn test_websocket_loopback() {
    verbose_println!("Testing real WebSocket round trip...");

    let server = MockWsServer::start().await;
    let channel = builder()
        .url(server.ws_url())
        .identity(Identity::new("u-loop").with_token("secret"))
        .config(ChannelConfig::default().with_heartbeat_interval(Duration::from_millis(100)))
        .build()
        .unwrap();

    let echoed = Arc::new(AtomicUsize::new(0));
    {
        let echoed = echoed.clone();
        channel.on("echo", move |envelope: &Envelope| -> Result<()> {
            assert_eq!(envelope.payload()["n"], json!(1));
            echoed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    assert_eq!(channel.connect().await, ConnectionState::Connected);
    channel.send("echo", Scope::users(["u-loop"]), json!({ "n": 1 }));

    // outlive several heartbeat timeouts; the server answers every ping
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while echoed.load(Ordering::SeqCst) == 0 || channel.status().last_heartbeat_at.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await;

    assert!(waited.is_ok(), "no echo or pong within 5s");
    assert!(channel.is_connected());
    assert_eq!(echoed.load(Ordering::SeqCst), 1);
    assert_eq!(server.user_ids(), vec!["u-loop".to_string()]);

    channel.close();
    assert_eq!(channel.connection_state(), ConnectionState::Disconnected);
}
