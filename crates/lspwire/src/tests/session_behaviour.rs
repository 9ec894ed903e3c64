//! Session tests against in-process peers.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::rstest;
use serde_json::{Value, json};

use super::support::{
    PUBLISH_DIAGNOSTICS, connect_manual, connect_scripted, id_of, method_of, ready_manual,
};
use crate::errors::SessionError;
use crate::jsonrpc::{JsonRpcError, METHOD_NOT_FOUND};
use crate::session::{SessionOptions, SessionState};

const WAIT: Duration = Duration::from_secs(5);

#[rstest]
fn handshake_sends_initialize_then_initialized() {
    let (session, server) = connect_scripted();

    let result = session
        .initialize(json!({"capabilities": {}}))
        .expect("initialize failed");

    assert_eq!(result["capabilities"]["hoverProvider"], json!(true));
    assert_eq!(session.state(), SessionState::Ready);

    session.shutdown(WAIT).expect("shutdown failed");
    let received = server.finish();
    let methods: Vec<_> = received.iter().map(method_of).collect();
    assert_eq!(methods, ["initialize", "initialized", "shutdown", "exit"]);
    assert_eq!(received.first().map(id_of), Some(1));
}

#[rstest]
fn identifiers_increase_per_request() {
    let (session, server) = connect_scripted();
    session.initialize(json!({})).expect("initialize failed");

    for n in 0..3 {
        session
            .request("echo", json!({"n": n}))
            .expect("request failed");
    }

    session.shutdown(WAIT).expect("shutdown failed");
    let ids: Vec<_> = server
        .finish()
        .iter()
        .filter_map(|message| message.get("id").and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, [1, 2, 3, 4, 5]);
}

#[rstest]
fn echoes_params_as_result() {
    let (session, server) = connect_scripted();
    session.initialize(json!({})).expect("initialize failed");

    let result = session
        .request("workspace/symbol", json!({"query": "Main"}))
        .expect("request failed");

    assert_eq!(result, json!({"query": "Main"}));
    session.shutdown(WAIT).expect("shutdown failed");
    server.finish();
}

#[rstest]
fn requests_before_handshake_are_rejected() {
    let (session, _peer) = connect_manual(SessionOptions::default());

    let error = session
        .request("textDocument/hover", json!({}))
        .expect_err("request should be rejected");

    assert!(matches!(
        error,
        SessionError::InvalidState {
            state: SessionState::Unstarted,
            ..
        }
    ));
    assert!(session.notify("initialized", json!({})).is_err());
}

#[rstest]
fn initialize_is_rejected_once_ready() {
    let (session, _peer) = ready_manual();

    let error = session
        .initialize(json!({}))
        .expect_err("second initialize should be rejected");

    assert!(matches!(
        error,
        SessionError::InvalidState {
            operation: "initialize",
            state: SessionState::Ready,
        }
    ));
}

#[rstest]
fn failed_handshake_may_be_retried() {
    let (session, mut peer) = connect_manual(SessionOptions::default());

    thread::scope(|scope| {
        let client = scope.spawn(|| session.initialize(json!({})));
        let request = peer.receive();
        peer.reply_error(&request, -32002, "server not initialized");
        let error = client
            .join()
            .expect("client panicked")
            .expect_err("initialize should fail");
        assert!(matches!(error, SessionError::RemotePeer { code: -32002, .. }));
    });
    assert_eq!(session.state(), SessionState::Handshaking);

    thread::scope(|scope| {
        let client = scope.spawn(|| session.initialize(json!({})));
        let request = peer.receive();
        peer.reply(&request, json!({"capabilities": {}}));
        client
            .join()
            .expect("client panicked")
            .expect("retry should succeed");
    });
    assert_eq!(method_of(&peer.receive()), "initialized");
    assert_eq!(session.state(), SessionState::Ready);
}

#[rstest]
fn out_of_order_responses_reach_their_callers() {
    let (session, mut peer) = ready_manual();

    thread::scope(|scope| {
        let first = scope.spawn(|| session.request("slow", json!({"n": 1})));
        let slow = peer.receive();
        let second = scope.spawn(|| session.request("fast", json!({"n": 2})));
        let fast = peer.receive();

        peer.reply(&fast, json!("fast result"));
        let fast_result = second.join().expect("second caller panicked");
        assert_eq!(fast_result.expect("fast request failed"), json!("fast result"));
        assert!(!first.is_finished());

        peer.reply(&slow, json!("slow result"));
        let slow_result = first.join().expect("first caller panicked");
        assert_eq!(slow_result.expect("slow request failed"), json!("slow result"));
    });

    assert_eq!(session.in_flight(), 0);
}

#[rstest]
fn response_with_unknown_id_is_discarded() {
    let (session, mut peer) = ready_manual();

    thread::scope(|scope| {
        let caller = scope.spawn(|| session.request("echo", json!({})));
        let request = peer.receive();
        peer.send(&json!({"jsonrpc": "2.0", "id": 999, "result": "stray"}));
        peer.send(&json!({"jsonrpc": "2.0", "id": "text", "result": "stray"}));
        peer.reply(&request, json!("mine"));

        let result = caller.join().expect("caller panicked");
        assert_eq!(result.expect("request failed"), json!("mine"));
    });

    assert_eq!(session.in_flight(), 0);
}

#[rstest]
fn remote_error_carries_code_message_and_data() {
    let (session, mut peer) = ready_manual();

    thread::scope(|scope| {
        let caller = scope.spawn(|| session.request("textDocument/hover", json!({})));
        let request = peer.receive();
        peer.send(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32602, "message": "Invalid params", "data": {"field": "position"}},
        }));

        let error = caller
            .join()
            .expect("caller panicked")
            .expect_err("request should fail");
        let SessionError::RemotePeer {
            code,
            message,
            data,
        } = error
        else {
            panic!("expected remote error, got {error:?}");
        };
        assert_eq!(code, -32602);
        assert_eq!(message, "Invalid params");
        assert_eq!(data, Some(json!({"field": "position"})));
    });
    assert_eq!(session.state(), SessionState::Ready);
}

#[rstest]
fn scripted_failure_surfaces_as_remote_error() {
    let (session, server) = connect_scripted();
    session.initialize(json!({})).expect("initialize failed");

    let error = session
        .request("fail", json!({}))
        .expect_err("request should fail");

    assert!(matches!(error, SessionError::RemotePeer { code: -32602, .. }));
    session.shutdown(WAIT).expect("shutdown failed");
    server.finish();
}

#[rstest]
fn closed_stream_fails_pending_and_later_requests() {
    let (session, mut peer) = ready_manual();

    thread::scope(|scope| {
        let caller = scope.spawn(|| session.request("hang", json!({})));
        peer.receive();
        drop(peer);

        let error = caller
            .join()
            .expect("caller panicked")
            .expect_err("request should fail");
        assert!(matches!(error, SessionError::ConnectionClosed));
    });

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.in_flight(), 0);
    assert!(matches!(
        session.request("echo", json!({})),
        Err(SessionError::InvalidState {
            state: SessionState::Closed,
            ..
        })
    ));
}

#[rstest]
fn dropped_connection_mid_request_closes_session() {
    let (session, server) = connect_scripted();
    session.initialize(json!({})).expect("initialize failed");

    let error = session
        .request("drop-connection", json!({}))
        .expect_err("request should fail");

    assert!(matches!(error, SessionError::ConnectionClosed));
    assert_eq!(session.state(), SessionState::Closed);
    server.finish();
}

#[rstest]
fn malformed_header_closes_session() {
    let (session, mut peer) = ready_manual();

    thread::scope(|scope| {
        let caller = scope.spawn(|| session.request("echo", json!({})));
        peer.receive();
        peer.send_raw(b"Content-Type: application/json\r\n\r\n{}");

        let error = caller
            .join()
            .expect("caller panicked")
            .expect_err("request should fail");
        assert!(matches!(error, SessionError::ConnectionClosed));
    });
    assert_eq!(session.state(), SessionState::Closed);
}

#[rstest]
fn timeout_removes_entry_and_discards_late_response() {
    let (session, mut peer) = ready_manual();

    let error = session
        .request_with_timeout("slow", json!({}), Duration::from_millis(50))
        .expect_err("request should time out");
    let SessionError::Timeout { method, id, .. } = error else {
        panic!("expected timeout, got {error:?}");
    };
    assert_eq!(method, "slow");
    assert_eq!(session.in_flight(), 0);

    let late = peer.receive();
    assert_eq!(id_of(&late), id);
    peer.reply(&late, json!("too late"));

    thread::scope(|scope| {
        let caller = scope.spawn(|| session.request("echo", json!({})));
        let request = peer.receive();
        assert_ne!(id_of(&request), id);
        peer.reply(&request, json!("on time"));
        let result = caller.join().expect("caller panicked");
        assert_eq!(result.expect("request failed"), json!("on time"));
    });
    assert_eq!(session.state(), SessionState::Ready);
}

#[rstest]
fn notification_without_pending_request_reaches_handler_once() {
    let (session, mut peer) = ready_manual();
    let (sender, receiver) = mpsc::channel();
    session.register_notification_handler(move |method, params| {
        sender
            .send((method.to_owned(), params.clone()))
            .expect("test receiver dropped");
    });

    peer.notify("ping", json!({"seq": 1}));

    let (method, params) = receiver.recv_timeout(WAIT).expect("handler not called");
    assert_eq!(method, "ping");
    assert_eq!(params, json!({"seq": 1}));
    assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(session.in_flight(), 0);
}

#[rstest]
fn concurrent_notifications_arrive_as_separate_frames() {
    let (session, mut peer) = ready_manual();

    thread::scope(|scope| {
        for method in ["first/notification", "second/notification"] {
            let session = &session;
            scope.spawn(move || {
                session
                    .notify(method, json!({"padding": "x".repeat(10_000)}))
                    .expect("notify failed");
            });
        }
        let mut methods = vec![
            method_of(&peer.receive()).to_owned(),
            method_of(&peer.receive()).to_owned(),
        ];
        methods.sort();
        assert_eq!(methods, ["first/notification", "second/notification"]);
    });
}

#[rstest]
fn server_request_without_handler_gets_method_not_found() {
    let (_session, mut peer) = ready_manual();

    peer.send(&json!({
        "jsonrpc": "2.0",
        "id": "cfg-1",
        "method": "workspace/configuration",
        "params": {"items": []},
    }));

    let reply = peer.receive();
    assert_eq!(reply["id"], json!("cfg-1"));
    assert_eq!(reply["error"]["code"], json!(METHOD_NOT_FOUND));
}

#[rstest]
fn server_request_is_answered_by_handler() {
    let (session, mut peer) = ready_manual();
    session.register_request_handler(|method, _params| match method {
        "workspace/configuration" => Ok(json!([{"formatter": "default"}])),
        other => Err(JsonRpcError::method_not_found(other)),
    });

    peer.send(&json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "workspace/configuration",
        "params": {"items": [{}]},
    }));

    let reply = peer.receive();
    assert_eq!(reply["id"], json!(7));
    assert_eq!(reply["result"], json!([{"formatter": "default"}]));
}

#[rstest]
fn keeps_latest_diagnostics_per_document() {
    let (session, mut peer) = ready_manual();

    peer.notify(PUBLISH_DIAGNOSTICS, json!({"uri": "file:///A.java", "diagnostics": [1]}));
    peer.notify(PUBLISH_DIAGNOSTICS, json!({"uri": "file:///A.java", "diagnostics": [2]}));
    peer.notify(PUBLISH_DIAGNOSTICS, json!({"uri": "file:///B.java", "diagnostics": []}));

    // Dispatch is sequential, so B arriving means both A updates were stored.
    assert!(
        session
            .wait_for_notification(PUBLISH_DIAGNOSTICS, Some("file:///B.java"), WAIT)
            .is_some()
    );
    assert_eq!(
        session.latest_notification(PUBLISH_DIAGNOSTICS, Some("file:///A.java")),
        Some(json!({"uri": "file:///A.java", "diagnostics": [2]}))
    );
}

#[rstest]
fn did_open_produces_diagnostics() {
    let (session, server) = connect_scripted();
    session.initialize(json!({})).expect("initialize failed");

    session
        .notify(
            "textDocument/didOpen",
            json!({"textDocument": {"uri": "file:///Main.java", "languageId": "java", "version": 1, "text": ""}}),
        )
        .expect("notify failed");

    let diagnostics =
        session.wait_for_notification(PUBLISH_DIAGNOSTICS, Some("file:///Main.java"), WAIT);
    assert_eq!(
        diagnostics,
        Some(json!({"uri": "file:///Main.java", "diagnostics": []}))
    );
    session.shutdown(WAIT).expect("shutdown failed");
    server.finish();
}

#[rstest]
fn shutdown_before_handshake_skips_protocol_exchange() {
    let (session, server) = connect_scripted();

    let report = session.shutdown(WAIT).expect("shutdown failed");

    assert_eq!(report.previous_state, SessionState::Unstarted);
    assert_eq!(report.exit_status, None);
    assert!(!report.forced);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(server.finish().is_empty());
}

#[rstest]
fn shutdown_accepts_unbounded_timeout() {
    let (session, server) = connect_scripted();
    session.initialize(json!({})).expect("initialize failed");

    let report = session
        .shutdown(Duration::MAX)
        .expect("shutdown failed");

    assert_eq!(report.previous_state, SessionState::Ready);
    assert_eq!(session.state(), SessionState::Closed);
    let received = server.finish();
    let methods: Vec<_> = received.iter().map(method_of).collect();
    assert_eq!(methods, ["initialize", "initialized", "shutdown", "exit"]);
}

#[rstest]
fn shutdown_twice_is_rejected() {
    let (session, server) = connect_scripted();
    session.initialize(json!({})).expect("initialize failed");

    session.shutdown(WAIT).expect("shutdown failed");

    // Closed is a valid starting state; only a running shutdown is refused.
    let second = session.shutdown(WAIT).expect("second shutdown failed");
    assert_eq!(second.previous_state, SessionState::Closed);
    assert!(matches!(
        session.request("echo", json!({})),
        Err(SessionError::InvalidState { .. })
    ));
    server.finish();
}

#[rstest]
fn shutdown_clears_stored_notifications() {
    let (session, mut peer) = ready_manual();
    peer.notify(PUBLISH_DIAGNOSTICS, json!({"uri": "file:///A.java", "diagnostics": []}));
    assert!(
        session
            .wait_for_notification(PUBLISH_DIAGNOSTICS, Some("file:///A.java"), WAIT)
            .is_some()
    );

    thread::scope(|scope| {
        let shutdown = scope.spawn(|| session.shutdown(WAIT));
        let request = peer.receive();
        assert_eq!(method_of(&request), "shutdown");
        peer.reply(&request, Value::Null);
        assert_eq!(method_of(&peer.receive()), "exit");
        drop(peer);
        shutdown
            .join()
            .expect("shutdown panicked")
            .expect("shutdown failed");
    });

    assert!(
        session
            .latest_notification(PUBLISH_DIAGNOSTICS, Some("file:///A.java"))
            .is_none()
    );
}

#[cfg(unix)]
mod process {
    use lspwire_config::LaunchSpec;

    use super::*;
    use crate::session::Session;

    #[rstest]
    fn missing_binary_is_reported() {
        let launch = LaunchSpec::new("/nonexistent/path/to/language-server");

        let error = Session::start(&launch, SessionOptions::default())
            .expect_err("start should fail");

        assert!(matches!(error, SessionError::BinaryNotFound { .. }));
        assert!(error.to_string().contains("/nonexistent/"));
    }

    #[rstest]
    fn unresponsive_server_is_killed_at_deadline() {
        let launch = LaunchSpec::new("sleep").with_arg("30");
        let session =
            Session::start(&launch, SessionOptions::default()).expect("failed to spawn sleep");
        assert!(session.pid().is_some());

        let started = Instant::now();
        let report = session
            .shutdown(Duration::from_millis(200))
            .expect("shutdown failed");

        assert!(report.forced);
        assert!(report.exit_status.is_some_and(|status| !status.success()));
        assert!(started.elapsed() < WAIT);
        assert_eq!(session.state(), SessionState::Closed);
    }
}
