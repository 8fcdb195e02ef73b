//! Command correlation, timeouts and teardown against a mock browser

mod common;

use cdp_sock::cdp::{call, CdpConnection, CdpSocket, ConnectionState};
use cdp_sock::protocol::dom;
use cdp_sock::Error;
use common::{connect, sync, test_config};
use futures_util::future::join_all;
use mock_chrome::{MockChromeServer, Mode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn decode(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_concurrent_commands_out_of_order_replies() {
    let server = MockChromeServer::start().await;
    server.set_mode(Mode::Manual);
    let socket = connect(&server.ws_url()).await;

    let tasks: Vec<_> = (0..50)
        .map(|n| {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                let result = socket.send_raw("Test.echo", json!({ "n": n }), None).await;
                (n, result)
            })
        })
        .collect();

    let received = server.wait_for_requests(50).await;
    let mut ids: Vec<u64> = received.iter().map(|r| r["id"].as_u64().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 50, "every command needs a distinct id");
    assert_eq!(socket.pending_commands(), 50);

    for request in received.iter().rev() {
        server.reply(
            request["id"].as_u64().unwrap(),
            json!({ "n": request["params"]["n"] }),
        );
    }

    for task in tasks {
        let (n, result) = task.await.unwrap();
        let result = decode(&assert_ok!(result));
        assert_eq!(result["n"], n);
    }
    assert_eq!(socket.pending_commands(), 0);

    socket.close().await.unwrap();
}

#[tokio::test]
async fn test_ids_increase_for_the_life_of_the_connection() {
    let server = MockChromeServer::start().await;
    let socket = connect(&server.ws_url()).await;

    for _ in 0..5 {
        sync(&socket).await;
    }

    let ids: Vec<u64> = server
        .received()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids not increasing: {:?}", ids);
}

#[tokio::test]
async fn test_round_trip_fidelity() {
    let server = MockChromeServer::start().await;
    let result = json!({
        "result": {
            "type": "object",
            "value": {
                "text": "héllo \"wörld\" \u{1F600}",
                "ratio": 0.125,
                "big": 9007199254740991i64,
                "negative": -42,
                "nothing": null,
                "list": [true, false, [], {}]
            }
        }
    });
    server.reply_with("Runtime.evaluate", result.clone());
    let socket = connect(&server.ws_url()).await;

    let params = json!({
        "expression": "JSON.stringify({a: '\\n'})",
        "returnByValue": true,
        "awaitPromise": false,
        "contextId": 3
    });
    let decoded: Value = call(&*socket, "Runtime.evaluate", &params).await.unwrap();

    assert_eq!(decoded, result);
    let sent = &server.received()[0];
    assert_eq!(sent["method"], "Runtime.evaluate");
    assert_eq!(sent["params"], params);
}

#[tokio::test]
async fn test_params_omitted_when_absent() {
    let server = MockChromeServer::start().await;
    let socket = connect(&server.ws_url()).await;

    dom::enable(&*socket).await.unwrap();

    let sent = &server.received()[0];
    assert_eq!(sent["method"], "DOM.enable");
    assert!(sent.get("params").is_none());
}

#[tokio::test]
async fn test_domain_binding_over_socket() {
    let server = MockChromeServer::start().await;
    server.reply_with("DOM.getAttributes", json!({ "attributes": ["href", "/a"] }));
    let socket = connect(&server.ws_url()).await;

    let attributes = dom::get_attributes(&*socket, dom::NodeId(9)).await.unwrap();
    assert_eq!(attributes, vec!["href", "/a"]);
}

#[tokio::test]
async fn test_remote_error_object() {
    let server = MockChromeServer::start().await;
    server.fail_with("Page.navigate", -32000, "Cannot navigate to invalid URL");
    let socket = connect(&server.ws_url()).await;

    let err = assert_err!(
        socket
            .send_raw("Page.navigate", json!({ "url": "nope" }), None)
            .await
    );
    let remote = err.remote().expect("remote error");
    assert_eq!(remote.code, -32000);
    assert_eq!(remote.message, "Cannot navigate to invalid URL");

    // The connection stays usable
    sync(&socket).await;
}

#[tokio::test]
async fn test_error_object_without_message() {
    let server = MockChromeServer::start().await;
    server.set_mode(Mode::Manual);
    let socket = connect(&server.ws_url()).await;

    let pending = {
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            socket
                .send_raw("Test.x", Value::Null, Some(Duration::from_secs(5)))
                .await
        })
    };
    let id = server.wait_for_requests(1).await[0]["id"].as_u64().unwrap();
    server.send_frame(json!({ "id": id, "error": { "code": -32000 } }));

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("reply was not delivered before the deadline")
        .unwrap();
    let err = result.unwrap_err();
    assert_eq!(err.remote().map(|e| e.code), Some(-32000));
}

#[tokio::test]
async fn test_malformed_reply_fails_its_command() {
    let server = MockChromeServer::start().await;
    server.set_mode(Mode::Manual);
    let socket = connect(&server.ws_url()).await;

    let pending = {
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            socket
                .send_raw("Test.x", Value::Null, Some(Duration::from_secs(5)))
                .await
        })
    };
    let id = server.wait_for_requests(1).await[0]["id"].as_u64().unwrap();
    server.send_frame(json!({ "id": id, "error": { "code": "not a number" } }));

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("malformed reply was not delivered before the deadline")
        .unwrap();
    assert!(matches!(result, Err(Error::Decode(_))));
    assert_eq!(socket.pending_commands(), 0);
    assert!(socket.is_active());
}

#[tokio::test]
async fn test_timeout_then_late_reply_is_dropped() {
    let server = MockChromeServer::start().await;
    server.set_mode(Mode::Manual);
    let socket = connect(&server.ws_url()).await;

    let err = socket
        .send_raw("Test.slow", json!({}), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert!(matches!(err, Error::Timeout { ref method, .. } if method == "Test.slow"));
    assert_eq!(socket.pending_commands(), 0);

    let late_id = server.received()[0]["id"].as_u64().unwrap();
    server.reply(late_id, json!({ "late": true }));

    server.set_mode(Mode::AutoReply);
    sync(&socket).await;
    assert_eq!(socket.pending_commands(), 0);
    assert!(socket.is_active());
}

#[tokio::test]
async fn test_unknown_reply_id_is_ignored() {
    let server = MockChromeServer::start().await;
    server.set_mode(Mode::Manual);
    let socket = connect(&server.ws_url()).await;

    let pending = {
        let socket = Arc::clone(&socket);
        tokio::spawn(async move { socket.send_raw("Test.wait", Value::Null, None).await })
    };
    let id = server.wait_for_requests(1).await[0]["id"].as_u64().unwrap();

    server.reply(id + 1000, json!({ "stray": true }));
    server.reply(id, json!({ "mine": true }));

    let result = decode(&pending.await.unwrap().unwrap());
    assert_eq!(result, json!({ "mine": true }));
}

#[tokio::test]
async fn test_close_resolves_all_pending_commands() {
    let server = MockChromeServer::start().await;
    server.set_mode(Mode::Manual);
    let socket = connect(&server.ws_url()).await;

    let calls = join_all((0..3).map(|n| socket.send_raw("Test.hang", json!({ "n": n }), None)));
    let closer = async {
        server.wait_for_requests(3).await;
        assert_eq!(socket.pending_commands(), 3);
        socket.close().await.unwrap();
        socket.pending_commands()
    };

    let (results, pending_after_close) = tokio::join!(calls, closer);

    assert_eq!(pending_after_close, 0);
    for result in results {
        assert!(result.unwrap_err().is_closed());
    }
    assert_eq!(socket.state().await, ConnectionState::Closed);
    assert!(!socket.is_active());

    let err = socket.send_raw("Test.after", Value::Null, None).await.unwrap_err();
    assert!(matches!(err, Error::Write(_)));

    // Closing twice is harmless
    socket.close().await.unwrap();
}

#[tokio::test]
async fn test_remote_drop_flushes_pending_commands() {
    let server = MockChromeServer::start().await;
    server.set_mode(Mode::Manual);
    let socket = connect(&server.ws_url()).await;

    let pending = {
        let socket = Arc::clone(&socket);
        tokio::spawn(async move { socket.send_raw("Test.hang", Value::Null, None).await })
    };
    server.wait_for_requests(1).await;
    server.drop_connection();

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("pending command was not flushed")
        .unwrap();
    assert!(result.unwrap_err().is_closed());

    // Teardown is under way; a dead socket does not report itself open
    assert_ne!(socket.state().await, ConnectionState::Open);
    assert!(matches!(socket.connect().await, Err(Error::ConnectionClosed)));

    let mut closed = false;
    for _ in 0..200 {
        if socket.state().await == ConnectionState::Closed {
            closed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(closed);
    assert!(!socket.is_active());
}

#[tokio::test]
async fn test_connect_is_idempotent_unless_strict() {
    let server = MockChromeServer::start().await;

    let socket = connect(&server.ws_url()).await;
    assert_ok!(socket.connect().await);
    assert_eq!(server.connections(), 1);

    let mut config = test_config(&server.ws_url());
    config.strict_connect = true;
    let strict = CdpSocket::open(config).await.unwrap();
    let err = assert_err!(strict.connect().await);
    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let socket = CdpSocket::new(test_config(&format!("ws://{}/devtools/browser/gone", addr)));
    let err = assert_err!(socket.connect().await);
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(socket.state().await, ConnectionState::Disconnected);
}
