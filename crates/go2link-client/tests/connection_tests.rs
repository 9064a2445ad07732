//! Connection Orchestrator Tests (go2link-client)
//!
//! Tests for Go2Connection including:
//! - Local, discovered and remote session setup
//! - Busy-peer and unreachable-endpoint retries
//! - Reachability waiting and cancellation by disconnect
//! - Disconnect idempotence
//! - Automatic and manual reconnect
//! - Handshake timeout and failure

use go2link_client::{
    ClientError, ConnectionConfig, ConnectionMethod, Go2Connection, Go2ConnectionBuilder,
    StaticDiscovery, TurnServerInfo,
};
use go2link_core::topics;
use go2link_test_utils::{
    wait_for, wait_for_count, FakeBroker, FakeCredentials, FakeSignalingServer, MockEngine,
    ScriptedProbe, SignalingReply, DEFAULT_CHECK_INTERVAL, MOCK_ANSWER_SDP,
};
use go2link_transport::{IceServer, PeerConnectionState};
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn fast_config(port: u16) -> ConnectionConfig {
    ConnectionConfig {
        reachability_interval_ms: 10,
        signaling_retry_interval_ms: 10,
        reconnect_interval_ms: 10,
        signaling_timeout_ms: 2000,
        signaling_port: port,
        ..Default::default()
    }
}

fn local_connection(
    engine: &Arc<MockEngine>,
    probe: &Arc<ScriptedProbe>,
    config: ConnectionConfig,
) -> Go2Connection {
    Go2ConnectionBuilder::local_sta(LOCALHOST)
        .token("tok")
        .engine(engine.clone())
        .probe(probe.clone())
        .config(config)
        .build()
        .expect("build failed")
}

fn remote_builder(engine: &Arc<MockEngine>) -> Go2ConnectionBuilder {
    Go2ConnectionBuilder::new(ConnectionMethod::Remote {
        serial: "B42D2000XXXXXXXX".to_string(),
    })
    .token("cloud-token")
    .engine(engine.clone())
    // Remote sessions never probe reachability
    .probe(ScriptedProbe::always(false))
    .config(fast_config(0))
}

// ============================================================================
// Local Sessions
// ============================================================================

#[tokio::test]
async fn test_connect_local_sta() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let pubsub = timeout(WAIT, conn.connect()).await.unwrap().expect("connect failed");
    assert!(pubsub.is_open());
    assert!(conn.is_connected());
    assert_eq!(engine.created(), 1);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["id"], "STA_localNetwork");
    assert_eq!(requests[0]["type"], "offer");
    assert_eq!(requests[0]["sdp"], "mock-offer-1");
    assert_eq!(requests[0]["token"], "tok");
    assert!(requests[0].get("turnserver").is_none());

    let peer = engine.peer(0).unwrap();
    assert!(peer.config.ice_servers.is_empty());
    assert_eq!(peer.config.channel_label, "data");
    assert_eq!(peer.answers()[0].sdp, MOCK_ANSWER_SDP);

    assert!(
        wait_for(
            || async { conn.state() == PeerConnectionState::Connected },
            DEFAULT_CHECK_INTERVAL,
            WAIT
        )
        .await
    );

    conn.disconnect().await;
}

#[tokio::test]
async fn test_connect_twice_returns_same_router() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let first = conn.connect().await.unwrap();
    let second = conn.connect().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.created(), 1);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_publish_reaches_channel() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let pubsub = conn.connect().await.unwrap();
    pubsub
        .publish(topics::SPORT_REQUEST, go2link_core::ApiRequest::without_parameter(1004))
        .await
        .unwrap();

    let sent = engine.peer(0).unwrap().channel.sent_envelopes();
    let request = sent.iter().find(|e| e.topic == topics::SPORT_REQUEST).unwrap();
    assert_eq!(request.data["header"]["identity"]["api_id"], 1004);
}

#[tokio::test]
async fn test_login_fetches_token() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let credentials = Arc::new(FakeCredentials::ok());

    let conn = Go2ConnectionBuilder::local_sta(LOCALHOST)
        .login("owner@example.com", "secret")
        .credentials(credentials.clone())
        .engine(engine.clone())
        .probe(ScriptedProbe::always(true))
        .config(fast_config(server.port()))
        .build()
        .unwrap();

    conn.connect().await.unwrap();
    assert_eq!(server.requests()[0]["token"], "fetched-token");
    assert_eq!(credentials.token_calls(), 1);

    // The fetched token is kept for later sessions
    conn.reconnect().await.unwrap();
    assert_eq!(server.requests()[1]["token"], "fetched-token");
    assert_eq!(credentials.token_calls(), 1);
}

// ============================================================================
// Signaling Retries
// ============================================================================

#[tokio::test]
async fn test_rejected_answer_retries_with_identical_offer() {
    let server =
        FakeSignalingServer::start(vec![SignalingReply::Reject, SignalingReply::Reject]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    timeout(WAIT, conn.connect()).await.unwrap().expect("connect failed");

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0], requests[1]);
    assert_eq!(requests[1], requests[2]);
    assert_eq!(engine.created(), 1, "retries must reuse the same peer");
}

#[tokio::test]
async fn test_signaling_transport_error_retried() {
    let server = FakeSignalingServer::start(vec![SignalingReply::Status(503)]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    timeout(WAIT, conn.connect()).await.unwrap().expect("connect failed");
    assert_eq!(server.request_count(), 2);
}

#[tokio::test]
async fn test_signaling_cap_surfaces_last_error() {
    let server = FakeSignalingServer::start(vec![
        SignalingReply::Reject,
        SignalingReply::Reject,
        SignalingReply::Reject,
    ])
    .await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let config = ConnectionConfig {
        signaling_max_attempts: Some(2),
        ..fast_config(server.port())
    };
    let conn = local_connection(&engine, &probe, config);

    let result = timeout(WAIT, conn.connect()).await.unwrap();
    assert!(matches!(result, Err(ClientError::PeerRejected)));
    assert_eq!(server.request_count(), 2);
    assert!(engine.peer(0).unwrap().is_closed());
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn test_invalid_answer_is_fatal() {
    let server =
        FakeSignalingServer::start(vec![SignalingReply::Raw("<html>oops</html>".into())]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let result = timeout(WAIT, conn.connect()).await.unwrap();
    assert!(matches!(result, Err(ClientError::InvalidAnswer(_))));
    assert_eq!(server.request_count(), 1);
}

// ============================================================================
// Reachability
// ============================================================================

#[tokio::test]
async fn test_waits_for_reachability_before_signaling() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::sequence(vec![false, false, true]);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    timeout(WAIT, conn.connect()).await.unwrap().expect("connect failed");
    assert_eq!(probe.calls(), 3);
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn test_unreachable_with_cap() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(false);
    let config = ConnectionConfig {
        reachability_max_attempts: Some(3),
        ..fast_config(server.port())
    };
    let conn = local_connection(&engine, &probe, config);

    let result = timeout(WAIT, conn.connect()).await.unwrap();
    assert!(matches!(result, Err(ClientError::Unreachable(_))));
    assert_eq!(probe.calls(), 3);
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn test_disconnect_stops_reachability_wait() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(false);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let attempt = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.connect().await })
    };

    assert!(wait_for_count(probe.calls_counter(), 2, WAIT).await);
    conn.disconnect().await;

    let result = timeout(WAIT, attempt).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled)));

    // No orphaned retry loop keeps probing
    let calls = probe.calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(probe.calls(), calls);
    assert_eq!(server.request_count(), 0);
    assert!(engine.peer(0).unwrap().is_closed());
}

// ============================================================================
// Timeouts and Handshake Failure
// ============================================================================

#[tokio::test]
async fn test_connect_timeout() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(false);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let result = conn.connect_timeout(Duration::from_millis(100)).await;
    assert!(matches!(result, Err(ClientError::HandshakeTimeout)));
    assert!(!conn.is_connected());

    // A later connect is not affected by the expired attempt
    let calls = probe.calls();
    let attempt = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.connect().await })
    };
    assert!(wait_for_count(probe.calls_counter(), calls + 2, WAIT).await);
    conn.disconnect().await;
    let _ = timeout(WAIT, attempt).await;
}

#[tokio::test]
async fn test_failure_before_channel_open_starts_over() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::manual();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let attempt = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.connect().await })
    };

    assert!(
        wait_for(
            || async { engine.peer(0).map_or(false, |p| !p.answers().is_empty()) },
            DEFAULT_CHECK_INTERVAL,
            WAIT
        )
        .await
    );
    let first = engine.peer(0).unwrap();
    first.emit_state(PeerConnectionState::Failed).await;

    // The whole sequence repeats on a fresh peer connection
    assert!(
        wait_for(
            || async { engine.peer(1).map_or(false, |p| !p.answers().is_empty()) },
            DEFAULT_CHECK_INTERVAL,
            WAIT
        )
        .await,
        "handshake was not started over"
    );
    assert!(first.is_closed());
    assert_eq!(server.request_count(), 2);

    let second = engine.peer(1).unwrap();
    second.emit_state(PeerConnectionState::Connected).await;
    second.channel.open().await;

    let pubsub = timeout(WAIT, attempt).await.unwrap().unwrap().expect("connect failed");
    assert!(pubsub.is_open());
    assert!(conn.is_connected());
    assert_eq!(engine.created(), 2);
}

#[tokio::test]
async fn test_failure_before_channel_open_with_cap() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::manual();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(
        &engine,
        &probe,
        ConnectionConfig {
            reconnect_max_attempts: Some(1),
            ..fast_config(server.port())
        },
    );

    let attempt = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.connect().await })
    };

    assert!(
        wait_for(
            || async { engine.peer(0).map_or(false, |p| !p.answers().is_empty()) },
            DEFAULT_CHECK_INTERVAL,
            WAIT
        )
        .await
    );
    engine
        .peer(0)
        .unwrap()
        .emit_state(PeerConnectionState::Failed)
        .await;

    let result = timeout(WAIT, attempt).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::HandshakeFailed(_))));
    assert_eq!(engine.created(), 1);
}

#[tokio::test]
async fn test_disconnect_stops_repeated_handshakes() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::manual();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let attempt = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.connect().await })
    };

    assert!(
        wait_for(
            || async { engine.peer(0).map_or(false, |p| !p.answers().is_empty()) },
            DEFAULT_CHECK_INTERVAL,
            WAIT
        )
        .await
    );
    engine
        .peer(0)
        .unwrap()
        .emit_state(PeerConnectionState::Failed)
        .await;
    assert!(wait_for_count(engine.created_counter(), 2, WAIT).await);

    conn.disconnect().await;
    let result = timeout(WAIT, attempt).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled)));

    let created = engine.created();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.created(), created);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_twice_is_noop() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let pubsub = conn.connect().await.unwrap();
    conn.disconnect().await;
    conn.disconnect().await;

    assert!(!conn.is_connected());
    assert!(conn.pubsub().is_none());
    assert!(!pubsub.is_open());
    assert!(engine.peer(0).unwrap().is_closed());
    assert_eq!(conn.state(), PeerConnectionState::Closed);
}

#[tokio::test]
async fn test_disconnect_without_session() {
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(0));

    conn.disconnect().await;
    conn.disconnect().await;
    assert_eq!(engine.created(), 0);
}

#[tokio::test]
async fn test_no_reconnect_after_disconnect() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    conn.connect().await.unwrap();
    let peer = engine.peer(0).unwrap();
    conn.disconnect().await;
    peer.emit_state(PeerConnectionState::Failed).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.created(), 1);
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test]
async fn test_failed_and_closed_trigger_one_reconnect() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let reconnected = Arc::new(AtomicU32::new(0));
    {
        let reconnected = reconnected.clone();
        conn.on_reconnected(move || {
            reconnected.fetch_add(1, Ordering::SeqCst);
        });
    }

    let before = conn.connect().await.unwrap();
    let peer = engine.peer(0).unwrap();
    peer.emit_state(PeerConnectionState::Failed).await;
    peer.emit_state(PeerConnectionState::Closed).await;

    assert!(wait_for_count(&reconnected, 1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(reconnected.load(Ordering::SeqCst), 1);
    assert_eq!(engine.created(), 2);
    assert!(peer.is_closed());

    let after = conn.pubsub().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.is_open());
}

#[tokio::test]
async fn test_automatic_reconnect_repeats_until_success() {
    // First reconnect attempt is rejected, the second is accepted
    let server = FakeSignalingServer::start(vec![
        SignalingReply::Accept,
        SignalingReply::Reject,
        SignalingReply::Accept,
    ])
    .await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let config = ConnectionConfig {
        signaling_max_attempts: Some(1),
        ..fast_config(server.port())
    };
    let conn = local_connection(&engine, &probe, config);

    let reconnected = Arc::new(AtomicU32::new(0));
    {
        let reconnected = reconnected.clone();
        conn.on_reconnected(move || {
            reconnected.fetch_add(1, Ordering::SeqCst);
        });
    }

    conn.connect().await.unwrap();
    engine
        .peer(0)
        .unwrap()
        .emit_state(PeerConnectionState::Closed)
        .await;

    assert!(wait_for_count(&reconnected, 1, WAIT).await);
    assert_eq!(server.request_count(), 3);
    assert_eq!(engine.created(), 3);
    assert!(engine.peer(1).unwrap().is_closed());
    assert!(conn.is_connected());
}

#[tokio::test]
async fn test_manual_reconnect_invokes_callback() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let reconnected = Arc::new(AtomicU32::new(0));
    {
        let reconnected = reconnected.clone();
        conn.on_reconnected(move || {
            reconnected.fetch_add(1, Ordering::SeqCst);
        });
    }

    conn.connect().await.unwrap();
    conn.reconnect().await.unwrap();

    assert_eq!(reconnected.load(Ordering::SeqCst), 1);
    assert_eq!(engine.created(), 2);
    assert!(engine.peer(0).unwrap().is_closed());
    assert!(conn.is_connected());
}

#[tokio::test]
async fn test_on_reconnected_overwrites() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));

    let first = Arc::new(AtomicU32::new(0));
    let second = Arc::new(AtomicU32::new(0));
    {
        let first = first.clone();
        conn.on_reconnected(move || {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = second.clone();
        conn.on_reconnected(move || {
            second.fetch_add(1, Ordering::SeqCst);
        });
    }

    conn.connect().await.unwrap();
    conn.reconnect().await.unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_reconnects_serialize() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let probe = ScriptedProbe::always(true);
    let conn = local_connection(&engine, &probe, fast_config(server.port()));
    conn.connect().await.unwrap();

    let (a, b) = tokio::join!(conn.reconnect(), conn.reconnect());
    assert!(a.is_ok());
    assert!(b.is_ok());

    // Each reconnect replaced exactly one session; only the last peer is open
    assert_eq!(engine.created(), 3);
    assert!(engine.peer(0).unwrap().is_closed());
    assert!(engine.peer(1).unwrap().is_closed());
    assert!(!engine.peer(2).unwrap().is_closed());
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_discovery_returns_nothing() {
    let engine = MockEngine::new();
    let conn = Go2ConnectionBuilder::new(ConnectionMethod::LocalDiscovered {
        serial: "B42D2000AAAA".to_string(),
    })
    .engine(engine.clone())
    .discovery(Arc::new(StaticDiscovery::new()))
    .build()
    .unwrap();

    match conn.connect().await {
        Err(ClientError::AddressResolution(msg)) => assert!(msg.contains("no devices found")),
        other => panic!("expected AddressResolution, got {:?}", other.map(|_| ())),
    }
    assert_eq!(engine.created(), 0);
}

#[tokio::test]
async fn test_discovery_serial_absent() {
    let engine = MockEngine::new();
    let conn = Go2ConnectionBuilder::new(ConnectionMethod::LocalDiscovered {
        serial: "B42D2000AAAA".to_string(),
    })
    .engine(engine.clone())
    .discovery(Arc::new(
        StaticDiscovery::new().with_device("B42D2000BBBB", LOCALHOST),
    ))
    .build()
    .unwrap();

    match conn.connect().await {
        Err(ClientError::AddressResolution(msg)) => {
            assert!(msg.contains("B42D2000AAAA"));
            assert!(msg.contains("not found"));
        }
        other => panic!("expected AddressResolution, got {:?}", other.map(|_| ())),
    }
    assert_eq!(engine.created(), 0);
}

#[tokio::test]
async fn test_discovery_resolves_address() {
    let server = FakeSignalingServer::start(vec![]).await;
    let engine = MockEngine::new();
    let conn = Go2ConnectionBuilder::new(ConnectionMethod::LocalDiscovered {
        serial: "B42D2000AAAA".to_string(),
    })
    .engine(engine.clone())
    .probe(ScriptedProbe::always(true))
    .discovery(Arc::new(
        StaticDiscovery::new().with_device("B42D2000AAAA", LOCALHOST),
    ))
    .config(fast_config(server.port()))
    .build()
    .unwrap();

    conn.connect().await.unwrap();
    assert_eq!(server.requests()[0]["id"], "STA_localNetwork");
}

// ============================================================================
// Remote Sessions
// ============================================================================

#[tokio::test]
async fn test_connect_remote() {
    let engine = MockEngine::new();
    let broker = Arc::new(FakeBroker::accepting());
    let conn = remote_builder(&engine)
        .credentials(Arc::new(FakeCredentials::ok()))
        .broker(broker.clone())
        .build()
        .unwrap();

    timeout(WAIT, conn.connect()).await.unwrap().expect("connect failed");

    let ice = &engine.peer(0).unwrap().config.ice_servers;
    assert_eq!(
        *ice,
        vec![
            IceServer::turn("turn:relay.example:3478", "turn-user", "turn-pass"),
            IceServer::stun("stun:stun.l.google.com:19302"),
        ]
    );

    let bodies = broker.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["token"], "cloud-token");
    assert_eq!(bodies[0]["type"], "offer");
    assert_eq!(
        bodies[0]["turnserver"],
        json!({"user": "turn-user", "passwd": "turn-pass", "realm": "turn:relay.example:3478"})
    );
}

#[tokio::test]
async fn test_remote_busy_peer_retried() {
    let engine = MockEngine::new();
    let broker = Arc::new(FakeBroker::scripted(vec![
        Ok(json!({"sdp": "reject", "type": "answer"}).to_string()),
        Err(anyhow::anyhow!("broker timeout")),
    ]));
    let conn = remote_builder(&engine)
        .credentials(Arc::new(FakeCredentials::ok()))
        .broker(broker.clone())
        .build()
        .unwrap();

    timeout(WAIT, conn.connect()).await.unwrap().expect("connect failed");
    let bodies = broker.bodies();
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[0], bodies[2]);
}

#[tokio::test]
async fn test_remote_public_key_failure() {
    let engine = MockEngine::new();
    let credentials = FakeCredentials::ok().with_public_key_error("service unavailable");
    let conn = remote_builder(&engine)
        .credentials(Arc::new(credentials))
        .broker(Arc::new(FakeBroker::accepting()))
        .build()
        .unwrap();

    let result = conn.connect().await;
    assert!(matches!(result, Err(ClientError::CredentialFetch(_))));
    assert_eq!(engine.created(), 0);
}

#[tokio::test]
async fn test_remote_incomplete_turn_info() {
    let engine = MockEngine::new();
    let credentials = FakeCredentials::ok().with_turn(TurnServerInfo {
        user: String::new(),
        password: "p".to_string(),
        realm: "turn:x".to_string(),
    });
    let conn = remote_builder(&engine)
        .credentials(Arc::new(credentials))
        .broker(Arc::new(FakeBroker::accepting()))
        .build()
        .unwrap();

    let result = conn.connect().await;
    assert!(matches!(result, Err(ClientError::CredentialFetch(_))));
}

#[tokio::test]
async fn test_remote_without_credentials() {
    let engine = MockEngine::new();
    let conn = remote_builder(&engine).build().unwrap();

    let result = conn.connect().await;
    assert!(matches!(result, Err(ClientError::CredentialFetch(_))));
}

// ============================================================================
// Builder
// ============================================================================

#[test]
fn test_build_requires_engine() {
    let result = Go2ConnectionBuilder::local_ap().build();
    assert!(matches!(result, Err(ClientError::Other(_))));
}
