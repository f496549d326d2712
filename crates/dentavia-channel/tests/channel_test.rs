//! Integration tests for the channel lifecycle against scripted transports.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dentavia_channel::message::{ChatPayload, NotificationPayload};
use dentavia_channel::{ChannelBuilder, ChannelEvent, MessageKind, NoticeLevel, Phase};
use dentavia_core::config::{ChannelConfig, EndpointConfig};
use dentavia_core::types::ActorRole;

use helpers::{
    TestConnector, chat, quiet_config, settle, wait_for_event, wait_for_phase,
};

#[tokio::test(start_paused = true)]
async fn test_connect_reaches_open() {
    let connector = Arc::new(TestConnector::new());
    let _transport = connector.script_open();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .build();
    let mut status = channel.watch_status();

    channel.connect();
    let open = wait_for_phase(&mut status, Phase::Open).await;

    assert!(open.is_connected());
    assert_eq!(open.reconnect_attempt, 0);
    assert!(open.last_error.is_none());
    assert!(!open.using_fallback);
    assert!(open.connection_id.is_some());
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent_while_connecting_or_open() {
    let connector = Arc::new(TestConnector::new());
    let _transport = connector.script_open();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .build();
    let mut status = channel.watch_status();

    channel.connect();
    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    channel.connect();
    settle().await;
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sends_while_disconnected_queue_and_flush_in_order() {
    let connector = Arc::new(TestConnector::new());
    let mut transport = connector.script_open();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .build();
    let mut status = channel.watch_status();

    // No explicit connect: the first send connects opportunistically and
    // the rest queue behind it.
    for text in ["first", "second", "third"] {
        channel.send(chat(text));
    }
    let open = wait_for_phase(&mut status, Phase::Open).await;
    let open_id = open.connection_id.expect("open connection id").to_string();

    for expected in ["first", "second", "third"] {
        let envelope = transport.sent_envelope().await;
        assert_eq!(envelope.kind, MessageKind::Chat);
        assert_eq!(envelope.connection_id.as_deref(), Some(open_id.as_str()));
        let payload: ChatPayload =
            serde_json::from_value(envelope.payload.expect("chat payload")).expect("payload shape");
        assert_eq!(payload.message, expected);
    }
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(channel.metrics().messages_queued, 3);
}

#[tokio::test(start_paused = true)]
async fn test_outbound_envelopes_are_stamped() {
    let endpoint = EndpointConfig { user_id: Some(77), ..EndpointConfig::default() };
    let connector = Arc::new(TestConnector::new());
    let mut transport = connector.script_open();
    let channel = ChannelBuilder::new(endpoint, quiet_config()).connector(connector.clone()).build();
    let mut status = channel.watch_status();

    channel.connect();
    let open = wait_for_phase(&mut status, Phase::Open).await;

    channel.send(chat("hello"));
    let envelope = transport.sent_envelope().await;
    assert_eq!(envelope.kind, MessageKind::Chat);
    assert_eq!(
        envelope.connection_id,
        open.connection_id.map(|id| id.to_string())
    );
    assert!(envelope.timestamp.is_some());
    let sender = envelope.sender.expect("sender stamped from identity");
    assert_eq!(sender.id, 77);
    assert_eq!(sender.role, ActorRole::Patient);

    // A timestamp set by the composer survives stamping.
    let mut preset = chat("later");
    preset.timestamp = Some(1_700_000_000_000);
    channel.send(preset);
    let envelope = transport.sent_envelope().await;
    assert_eq!(envelope.timestamp, Some(1_700_000_000_000));
}

#[tokio::test(start_paused = true)]
async fn test_inbound_envelopes_reach_subscribers_and_handlers() {
    let connector = Arc::new(TestConnector::new());
    let transport = connector.script_open();
    let titles: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = titles.clone();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .on_kind(MessageKind::Notification, move |envelope| {
            let payload: NotificationPayload =
                serde_json::from_value(envelope.payload.clone().expect("payload"))
                    .expect("notification payload");
            sink.lock().expect("titles").push(payload.title);
        })
        .build();
    let mut events = channel.events();
    let mut status = channel.watch_status();

    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    transport
        .push_frame(r#"{"type":"notification","payload":{"title":"Quote ready","message":"Your quote from Smile Dental is ready"}}"#)
        .await;

    let event =
        wait_for_event(&mut events, "message event", |e| matches!(e, ChannelEvent::Message(_)))
            .await;
    let ChannelEvent::Message(envelope) = event else { unreachable!() };
    assert_eq!(envelope.kind, MessageKind::Notification);
    assert_eq!(*titles.lock().expect("titles"), ["Quote ready"]);
    assert_eq!(channel.metrics().frames_received, 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_unknown_frames_are_dropped() {
    let connector = Arc::new(TestConnector::new());
    let transport = connector.script_open();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .build();
    let mut events = channel.events();
    let mut status = channel.watch_status();

    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    transport.push_frame("this is not json").await;
    transport.push_frame(r#"{"type":"telemetry_v2","payload":{}}"#).await;
    transport
        .push_frame(r#"{"type":"system","payload":{"message":"Maintenance at midnight"}}"#)
        .await;

    // Only the well-formed, known-kind envelope surfaces, and the two bad
    // frames did not kill the connection.
    let event =
        wait_for_event(&mut events, "message event", |e| matches!(e, ChannelEvent::Message(_)))
            .await;
    let ChannelEvent::Message(envelope) = event else { unreachable!() };
    assert_eq!(envelope.kind, MessageKind::System);
    assert!(channel.is_connected());

    let metrics = channel.metrics();
    assert_eq!(metrics.frames_received, 3);
    assert_eq!(metrics.parse_failures, 1);
    assert_eq!(metrics.unknown_kinds, 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_ping_is_answered_with_pong() {
    let connector = Arc::new(TestConnector::new());
    let mut transport = connector.script_open();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .build();
    let mut events = channel.events();
    let mut status = channel.watch_status();

    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    transport.push_frame(r#"{"type":"ping","timestamp":1700000000123}"#).await;

    let pong = transport.sent_envelope().await;
    assert_eq!(pong.kind, MessageKind::Pong);
    assert_eq!(pong.timestamp, Some(1_700_000_000_123));

    // The keepalive never surfaces as a message; the next visible message
    // is the notification behind it.
    transport
        .push_frame(r#"{"type":"notification","payload":{"title":"Hi","message":"After the ping"}}"#)
        .await;
    let event =
        wait_for_event(&mut events, "message event", |e| matches!(e, ChannelEvent::Message(_)))
            .await;
    let ChannelEvent::Message(envelope) = event else { unreachable!() };
    assert_eq!(envelope.kind, MessageKind::Notification);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_keepalives_never_reach_handlers() {
    let connector = Arc::new(TestConnector::new());
    let mut transport = connector.script_open();
    let keepalives: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let ping_sink = keepalives.clone();
    let pong_sink = keepalives.clone();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .on_kind(MessageKind::Ping, move |_| {
            ping_sink.lock().expect("keepalives").push("ping".to_string());
        })
        .on_kind(MessageKind::Pong, move |_| {
            pong_sink.lock().expect("keepalives").push("pong".to_string());
        })
        .build();
    let mut events = channel.events();
    let mut status = channel.watch_status();

    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    transport.push_frame(r#"{"type":"ping","timestamp":1700000000500}"#).await;
    let pong = transport.sent_envelope().await;
    assert_eq!(pong.kind, MessageKind::Pong);

    // A stray pong from the server is consumed the same way the ping was.
    transport.push_frame(r#"{"type":"pong","timestamp":1700000000500}"#).await;
    transport.push_frame(r#"{"type":"chat","payload":{"message":"still here"}}"#).await;

    let event =
        wait_for_event(&mut events, "message event", |e| matches!(e, ChannelEvent::Message(_)))
            .await;
    let ChannelEvent::Message(envelope) = event else { unreachable!() };
    assert_eq!(envelope.kind, MessageKind::Chat);
    assert!(keepalives.lock().expect("keepalives").is_empty());
    assert_eq!(channel.metrics().frames_received, 3);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_follow_the_configured_interval() {
    let config = ChannelConfig { ping_interval_seconds: 30, surface_notices: false, ..ChannelConfig::default() };
    let connector = Arc::new(TestConnector::new());
    let mut transport = connector.script_open();
    let channel =
        ChannelBuilder::new(EndpointConfig::default(), config).connector(connector.clone()).build();
    let mut status = channel.watch_status();

    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    let ping = transport.sent_envelope().await;
    assert_eq!(ping.kind, MessageKind::Ping);
    assert!(ping.timestamp.is_some());

    // Nothing more until the next interval boundary.
    tokio::time::advance(Duration::from_secs(29)).await;
    settle().await;
    assert!(transport.try_sent().is_none());

    tokio::time::advance(Duration::from_secs(1)).await;
    let ping = transport.sent_envelope().await;
    assert_eq!(ping.kind, MessageKind::Ping);
}

#[tokio::test(start_paused = true)]
async fn test_clean_server_close_is_not_retried() {
    let connector = Arc::new(TestConnector::new());
    let transport = connector.script_open();
    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .build();
    let mut events = channel.events();
    let mut status = channel.watch_status();

    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    transport.close(Some(1000), "server going away").await;

    let event =
        wait_for_event(&mut events, "closed event", |e| matches!(e, ChannelEvent::Closed { .. }))
            .await;
    let ChannelEvent::Closed { reason } = event else { unreachable!() };
    assert_eq!(reason, "server going away");

    let closed = wait_for_phase(&mut status, Phase::Closed).await;
    assert!(closed.last_error.is_none());
    assert_eq!(closed.reconnect_attempt, 0);

    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(channel.status().phase, Phase::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_full_outbox_drops_the_oldest_message() {
    let config = ChannelConfig { outbox_capacity: 2, ..quiet_config() };
    let connector = Arc::new(TestConnector::new());
    connector.script_refuse("connection refused");
    let mut transport = connector.script_open();
    let channel =
        ChannelBuilder::new(EndpointConfig::default(), config).connector(connector.clone()).build();
    let mut status = channel.watch_status();

    for text in ["first", "second", "third"] {
        channel.send(chat(text));
    }
    wait_for_phase(&mut status, Phase::Open).await;

    for expected in ["second", "third"] {
        let envelope = transport.sent_envelope().await;
        let payload: ChatPayload =
            serde_json::from_value(envelope.payload.expect("chat payload")).expect("payload shape");
        assert_eq!(payload.message, expected);
    }
    settle().await;
    assert!(transport.try_sent().is_none(), "the evicted message must not be transmitted");

    let metrics = channel.metrics();
    assert_eq!(metrics.messages_queued, 3);
    assert_eq!(metrics.outbox_evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_notices_surface_when_enabled() {
    let config = ChannelConfig { ping_interval_seconds: 0, ..ChannelConfig::default() };
    let connector = Arc::new(TestConnector::new());
    let _transport = connector.script_open();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let channel = ChannelBuilder::new(EndpointConfig::default(), config)
        .connector(connector.clone())
        .on_notice(move |notice| sink.lock().expect("notices").push(notice.message.clone()))
        .build();
    let mut events = channel.events();

    channel.connect();
    let event =
        wait_for_event(&mut events, "notice event", |e| matches!(e, ChannelEvent::Notice(_)))
            .await;
    let ChannelEvent::Notice(notice) = event else { unreachable!() };
    assert_eq!(notice.level, NoticeLevel::Info);
    assert_eq!(notice.message, "Realtime connection established");
    assert_eq!(*seen.lock().expect("notices"), [notice.message]);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_callbacks_fire_in_order() {
    let connector = Arc::new(TestConnector::new());
    connector.script_refuse("connection refused");
    let _transport = connector.script_open();

    let opens: Arc<Mutex<Vec<Phase>>> = Arc::new(Mutex::new(Vec::new()));
    let closes: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let (open_sink, close_sink, error_sink) = (opens.clone(), closes.clone(), errors.clone());

    let channel = ChannelBuilder::new(EndpointConfig::default(), quiet_config())
        .connector(connector.clone())
        .on_open(move |status| open_sink.lock().expect("opens").push(status.phase))
        .on_close(move |reason| close_sink.lock().expect("closes").push(reason.to_string()))
        .on_error(move |error| error_sink.lock().expect("errors").push(error.to_string()))
        .build();
    let mut status = channel.watch_status();

    channel.connect();
    wait_for_phase(&mut status, Phase::Open).await;

    {
        let errors = errors.lock().expect("errors");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection refused"));
        let closes = closes.lock().expect("closes");
        assert_eq!(closes.len(), 1);
        assert!(closes[0].contains("connection refused"));
    }
    assert_eq!(*opens.lock().expect("opens"), [Phase::Open]);

    channel.disconnect();
    wait_for_phase(&mut status, Phase::Closed).await;
    let closes = closes.lock().expect("closes");
    assert_eq!(closes.len(), 2);
    assert_eq!(closes[1], "manual disconnect");
}
