//! Peer-to-Peer over Channels
//!
//! Two JSON-RPC engines connected by in-memory pipes. Both sides serve
//! methods, so calls flow in either direction, including follow-ups queued
//! by a handler while it runs.

use serde_json::{json, Value};
use std::time::Duration;
use tether_codec_json::{JsonRpcCodec, JsonRpcEngine};
use tether_core::{method_fn, HandlerError, Registry, RequestOptions, RpcEngine, RpcError};
use tokio::sync::mpsc;

/// Engine whose outbound payloads land in the returned receiver
fn endpoint(methods: Registry) -> (JsonRpcEngine, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = RpcEngine::builder(JsonRpcCodec::default())
        .methods(methods)
        .transport(move |payload: &str| {
            let _ = tx.send(payload.to_string());
        })
        .build();
    (engine, rx)
}

/// Deliver everything from `rx` to `engine` until the pipe closes
fn pump(engine: JsonRpcEngine, mut rx: mpsc::UnboundedReceiver<String>) {
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = engine.on_message(&payload).await;
            });
        }
    });
}

fn connect(left: Registry, right: Registry) -> (JsonRpcEngine, JsonRpcEngine) {
    let (a, a_out) = endpoint(left);
    let (b, b_out) = endpoint(right);
    pump(b.clone(), a_out);
    pump(a.clone(), b_out);
    (a, b)
}

#[tokio::test]
async fn test_calls_flow_both_ways() {
    let (a, b) = connect(
        Registry::new().register("whoami", method_fn(|_cx, _params| async { Ok(json!("a")) })),
        Registry::new().register("whoami", method_fn(|_cx, _params| async { Ok(json!("b")) })),
    );

    let from_b = a.request("whoami", ()).unwrap();
    let from_a = b.request("whoami", ()).unwrap();

    let timeout = Duration::from_secs(1);
    assert_eq!(tokio::time::timeout(timeout, from_b).await.unwrap(), Ok(json!("b")));
    assert_eq!(tokio::time::timeout(timeout, from_a).await.unwrap(), Ok(json!("a")));
}

#[tokio::test]
async fn test_handler_followup_is_answered_by_caller() {
    let (client, server) = connect(
        Registry::new().register(
            "confirm",
            method_fn(|_cx, params| async move {
                Ok(json!({"confirmed": params.first().cloned().unwrap_or(Value::Null)}))
            }),
        ),
        Registry::new().register(
            "start",
            method_fn(|cx, _params| async move {
                let confirmation = cx.request("confirm", json!(["job-7"]))?;
                tokio::spawn(async move {
                    let _ = confirmation.await;
                });
                Ok::<_, HandlerError>(json!("started"))
            }),
        ),
    );

    let started = client.request("start", ()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(1), started).await.unwrap();
    assert_eq!(outcome, Ok(json!("started")));

    // The follow-up answer travels back on its own
    tokio::time::timeout(Duration::from_secs(1), async {
        while server.pending_count() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let (tx, _rx) = mpsc::unbounded_channel::<String>();
    let silent = RpcEngine::builder(JsonRpcCodec::default())
        .transport(move |payload: &str| {
            let _ = tx.send(payload.to_string());
        })
        .build();

    let request = silent
        .request_with(RequestOptions::timeout(Duration::from_millis(20)), "void", ())
        .unwrap();
    assert_eq!(request.await, Err(RpcError::Timeout(Duration::from_millis(20))));
    assert_eq!(silent.pending_count(), 1);

    silent.reset();
    assert_eq!(silent.pending_count(), 0);
}
