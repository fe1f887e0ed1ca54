//! End-to-end runs of the relay: scripted chat platform, real webhook
//! receiver, real control API.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use code_relay::auth::SenderIdentity;
use code_relay::bot::{CodeRelay, StopReason};
use code_relay::channels::{ChatTransport, InboundMessage};
use code_relay::channels::responders::GREETING_REPLY;

use common::{PHONE, ScriptedTransport, TEST_TIMEOUT, code_message, config, free_port};

const CODE_TEXT: &str = "Login code: 40353. Do not give this code to anyone.";

/// Webhook receiver that forwards every JSON body it gets.
async fn webhook_receiver() -> (String, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/hook",
        post(move |Json(body): Json<Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                StatusCode::OK
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{port}/hook"), rx)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn relay(transport: &Arc<ScriptedTransport>, extra: &[(&str, &str)]) -> CodeRelay {
    CodeRelay::new(config(extra), Arc::clone(transport) as Arc<dyn ChatTransport>)
}

#[tokio::test]
async fn intercepted_code_signs_in_and_reaches_webhook() {
    let (hook_url, mut hooks) = webhook_receiver().await;
    let transport = Arc::new(ScriptedTransport::new().delivers_on_request(code_message(CODE_TEXT)));
    let relay = relay(&transport, &[("WEBHOOK_URL", hook_url.as_str())]);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = relay.run(async {
        let _ = stop_rx.await;
    });
    let drive = async {
        let body = hooks.recv().await.unwrap();
        wait_until(|| !transport.sign_ins.lock().unwrap().is_empty()).await;
        stop_tx.send(()).unwrap();
        body
    };

    let (reason, body) = timeout(TEST_TIMEOUT, async { tokio::join!(run, drive) })
        .await
        .unwrap();

    assert_eq!(reason.unwrap(), StopReason::Shutdown);
    assert_eq!(body["code"], "40353");
    assert_eq!(body["message"], CODE_TEXT);
    assert_eq!(body["phone_number"], PHONE);
    assert_eq!(body["source"], "telegram_chat_42777");

    assert_eq!(
        *transport.sign_ins.lock().unwrap(),
        vec![("40353".to_string(), "hash-1".to_string())]
    );
    assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn code_from_stranger_is_ignored_in_strict_mode() {
    let transport = Arc::new(ScriptedTransport::new());
    let relay = relay(&transport, &[("CODE_WAIT_TIMEOUT_SECS", "1")]);
    let ctx = relay.context();

    let stranger = InboundMessage::new(
        5001,
        SenderIdentity::with_id(5001).with_username("mallory"),
        "Login code: 11111",
    );
    transport.deliver(stranger);

    let result = timeout(TEST_TIMEOUT, relay.run(std::future::pending::<()>()))
        .await
        .unwrap();

    assert!(result.is_err());
    assert!(transport.sign_ins.lock().unwrap().is_empty());
    assert!(ctx.latest_code().is_none());
}

#[tokio::test]
async fn greeting_gets_a_reply() {
    let transport = Arc::new(ScriptedTransport::new().already_authorized());
    let relay = relay(&transport, &[]);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = relay.run(async {
        let _ = stop_rx.await;
    });
    let drive = async {
        transport.deliver(InboundMessage::new(
            1001,
            SenderIdentity::with_id(1001).with_username("alice"),
            "hi",
        ));
        wait_until(|| !transport.sent.lock().unwrap().is_empty()).await;
        stop_tx.send(()).unwrap();
    };

    let (reason, ()) = timeout(TEST_TIMEOUT, async { tokio::join!(run, drive) })
        .await
        .unwrap();

    assert_eq!(reason.unwrap(), StopReason::Shutdown);
    assert_eq!(
        *transport.sent.lock().unwrap(),
        vec![(1001, GREETING_REPLY.to_string())]
    );
    assert_eq!(transport.requests(), 0);
}

#[tokio::test]
async fn control_api_requests_and_reports_codes() {
    let transport = Arc::new(ScriptedTransport::new().already_authorized());
    let port = free_port();
    let relay = relay(
        &transport,
        &[
            ("HTTP_PORT", port.to_string().as_str()),
            ("POLL_INTERVAL_MS", "1000"),
        ],
    );
    let base = format!("http://127.0.0.1:{port}");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = relay.run(async {
        let _ = stop_rx.await;
    });
    let drive = async {
        let client = reqwest::Client::new();

        // Nothing captured yet.
        let resp = loop {
            match client.get(format!("{base}/get-code")).send().await {
                Ok(resp) => break resp,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        };
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "pending");

        // Three requests inside one poll interval collapse into one.
        let request = || client.post(format!("{base}/request-code")).send();
        let (a, b, c) = tokio::join!(request(), request(), request());
        for resp in [a, b, c] {
            let resp = resp.unwrap();
            assert_eq!(resp.status(), 200);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["status"], "ok");
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.requests(), 1);

        transport.deliver(code_message(CODE_TEXT));
        let body: Value = loop {
            let resp = client
                .get(format!("{base}/get-code"))
                .send()
                .await
                .unwrap();
            if resp.status() == 200 {
                break resp.json().await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert_eq!(body["code"], "40353");
        assert_eq!(body["status"], "ok");
        assert!(body["captured_at"].is_string());

        stop_tx.send(()).unwrap();
    };

    let (reason, ()) = timeout(TEST_TIMEOUT, async { tokio::join!(run, drive) })
        .await
        .unwrap();
    assert_eq!(reason.unwrap(), StopReason::Shutdown);
}

#[tokio::test]
async fn closed_inbound_stream_stops_relay() {
    let transport = Arc::new(ScriptedTransport::new().already_authorized());
    let relay = relay(&transport, &[]);

    let run = relay.run(std::future::pending::<()>());
    let drive = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.close_inbound();
    };

    let (reason, ()) = timeout(TEST_TIMEOUT, async { tokio::join!(run, drive) })
        .await
        .unwrap();

    assert_eq!(reason.unwrap(), StopReason::Disconnected);
    assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
}
