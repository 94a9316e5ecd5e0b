//! Engine dispatch tests over the logical codec

#[cfg(test)]
mod tests {
    use crate::application::{method_fn, parse_params, Registry, RequestOptions, RpcEngine};
    use crate::codec::LogicalCodec;
    use crate::config::EngineConfig;
    use crate::domain::{ErrorObject, HandlerError, Id};
    use crate::error::{EngineError, RpcError};
    use crate::port::MockTransport;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn methods() -> Registry {
        Registry::new()
            .register("foo", method_fn(|_cx, _params| async { Ok(json!("bar")) }))
            .register(
                "add",
                method_fn(|_cx, params| async move {
                    let (a, b): (i64, i64) = parse_params(params)?;
                    Ok::<_, HandlerError>(json!(a + b))
                }),
            )
            .register(
                "coded",
                method_fn(|_cx, _params| async {
                    Err(HandlerError::coded(1234, "custom failure"))
                }),
            )
            .register(
                "crash",
                method_fn(|_cx, _params| async { Err(HandlerError::failed("kaboom")) }),
            )
            .register(
                "first",
                method_fn(|_cx, params| async move { Ok(params[0].clone()) }),
            )
            .register(
                "positive",
                method_fn(|_cx, params| async move { Ok(params[0].clone()) }).with_validator(
                    |params| match params.first().and_then(Value::as_i64) {
                        Some(n) if n > 0 => Ok(()),
                        _ => Err(HandlerError::failed("expected a positive number")),
                    },
                ),
            )
            .namespace(
                "math",
                Registry::new().register(
                    "neg",
                    method_fn(|_cx, params| async move {
                        let (n,): (i64,) = parse_params(params)?;
                        Ok::<_, HandlerError>(json!(-n))
                    }),
                ),
            )
    }

    fn server() -> RpcEngine<LogicalCodec> {
        RpcEngine::builder(LogicalCodec::new()).methods(methods()).build()
    }

    fn client() -> RpcEngine<LogicalCodec> {
        RpcEngine::new(LogicalCodec::new())
    }

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).unwrap()
    }

    async fn reply_to(engine: &RpcEngine<LogicalCodec>, raw: &str) -> Value {
        let outgoing = engine.on_message(raw).await.unwrap().expect("a reply");
        parse(outgoing.payload())
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let client = client();
        let server = server();

        let handle = client.request("foo", ()).unwrap();
        assert_eq!(handle.payload(), Some(r#"{"id":0,"method":"foo"}"#));
        assert_eq!(client.pending_count(), 1);

        let reply = server.on_message(handle.payload().unwrap()).await.unwrap().unwrap();
        assert_eq!(parse(reply.payload()), json!({"ack": 0, "result": "bar"}));

        assert!(client.on_message(reply.payload()).await.unwrap().is_none());
        assert_eq!(handle.await, Ok(json!("bar")));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_notification_gets_no_reply() {
        let client = client();
        let server = server();

        let outgoing = client.notification("add", vec![json!(1), json!(2)]).unwrap();
        assert_eq!(outgoing.payload(), r#"{"method":"add","params":[1,2]}"#);
        assert!(server.on_message(outgoing.payload()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_method_and_message_are_local_errors() {
        let client = client();
        assert!(matches!(client.notification("", ()), Err(EngineError::MissingMethod)));
        assert!(matches!(client.request("", ()), Err(EngineError::MissingMethod)));
        assert!(matches!(client.on_message("  ").await, Err(EngineError::MissingMessage)));
    }

    #[tokio::test]
    async fn test_engine_without_registry() {
        let engine = client();

        let reply = reply_to(&engine, r#"{"id":4,"method":"foo"}"#).await;
        assert_eq!(reply["ack"], json!(4));
        assert_eq!(reply["error"]["code"], json!(-32603));
        assert_eq!(reply["error"]["message"], json!("Client doesn't accept requests"));
    }

    #[tokio::test]
    async fn test_unknown_method_and_notification() {
        let server = server();

        let reply = reply_to(&server, r#"{"id":1,"method":"nope"}"#).await;
        assert_eq!(
            reply["error"],
            json!({"code": -32601, "message": "Unknown method 'nope'", "data": "nope"})
        );

        let reply = reply_to(&server, r#"{"method":"nope"}"#).await;
        assert_eq!(reply["ack"], Value::Null);
        assert_eq!(reply["error"]["message"], json!("Unknown notification 'nope'"));
    }

    #[tokio::test]
    async fn test_coded_handler_error_is_forwarded() {
        let reply = reply_to(&server(), r#"{"id":1,"method":"coded"}"#).await;
        assert_eq!(reply["error"]["code"], json!(1234));
        assert_eq!(reply["error"]["message"], json!("custom failure"));
    }

    #[tokio::test]
    async fn test_uncoded_handler_error_is_wrapped() {
        let reply = reply_to(&server(), r#"{"id":1,"method":"crash"}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32500));
        assert_eq!(reply["error"]["message"], json!("kaboom"));
        assert_eq!(reply["error"]["data"]["name"], json!("Error"));
    }

    #[tokio::test]
    async fn test_validator_rejects_with_invalid_params() {
        let server = server();

        let reply = reply_to(&server, r#"{"id":1,"method":"positive","params":[-3]}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32602));

        let reply = reply_to(&server, r#"{"id":2,"method":"positive","params":[3]}"#).await;
        assert_eq!(reply["result"], json!(3));

        let reply = reply_to(&server, r#"{"id":3,"method":"add","params":["x"]}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn test_dotted_method_resolves_through_namespace() {
        let reply = reply_to(&server(), r#"{"id":1,"method":"math.neg","params":[5]}"#).await;
        assert_eq!(reply["result"], json!(-5));
    }

    #[tokio::test]
    async fn test_response_for_unknown_request() {
        let err = client().on_message(r#"{"ack":42,"result":1}"#).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownRequest { ack: Id::Number(42), .. }));
    }

    #[tokio::test]
    async fn test_null_ack_response_is_malformed() {
        let err = client()
            .on_message(r#"{"ack":null,"error":{"code":-32700,"message":"Invalid JSON"}}"#)
            .await
            .unwrap_err();
        match err {
            EngineError::MalformedResponse { error: Some(e) } => assert_eq!(e.code, -32700),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_error_rejects_request() {
        let client = client();
        let handle = client.request("coded", ()).unwrap();

        let reply = server().on_message(handle.payload().unwrap()).await.unwrap().unwrap();
        client.on_message(reply.payload()).await.unwrap();

        let err = handle.await.unwrap_err();
        assert_eq!(err.remote().map(|e| e.code), Some(1234));
    }

    #[tokio::test]
    async fn test_inbound_batch_replies_in_order() {
        let raw = r#"[
            {"id":1,"method":"add","params":[1,2]},
            {"method":"foo"},
            {"id":2,"method":"nope"}
        ]"#;

        let reply = reply_to(&server(), raw).await;
        let items = reply.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], json!({"ack": 1, "result": 3}));
        assert_eq!(items[1]["ack"], json!(2));
        assert_eq!(items[1]["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_only_its_own_call() {
        let raw = r#"[{"id":1,"method":"first"},{"id":2,"method":"foo"}]"#;

        let reply = reply_to(&server(), raw).await;
        let items = reply.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["ack"], json!(1));
        assert_eq!(items[0]["error"]["code"], json!(-32500));
        assert_eq!(items[0]["error"]["data"]["name"], json!("Panic"));
        assert!(items[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("index out of bounds"));
        assert_eq!(items[1], json!({"ack": 2, "result": "bar"}));
    }

    #[tokio::test]
    async fn test_inbound_batch_of_notifications_is_silent() {
        let raw = r#"[{"method":"foo"},{"method":"add","params":[1,1]}]"#;
        assert!(server().on_message(raw).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inbound_batch_of_failures_is_local_error() {
        let raw = r#"[{"ack":7,"result":1},{"ack":8,"result":2}]"#;
        match client().on_message(raw).await {
            Err(EngineError::BatchFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inbound_batch_elements_run_concurrently() {
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let gate = barrier.clone();
        let methods = Registry::new().register(
            "meet",
            method_fn(move |_cx, _params| {
                let gate = gate.clone();
                async move {
                    gate.wait().await;
                    Ok(json!(true))
                }
            }),
        );
        let server = RpcEngine::builder(LogicalCodec::new()).methods(methods).build();

        let raw = r#"[{"id":1,"method":"meet"},{"id":2,"method":"meet"}]"#;
        let outgoing = tokio::time::timeout(Duration::from_secs(1), server.on_message(raw))
            .await
            .expect("batch elements must not run one after another")
            .unwrap()
            .unwrap();
        assert_eq!(parse(outgoing.payload()).as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_batch_run_settles_after_responses() {
        let client = client();
        let server = server();

        let batch = client.create_batch();
        let sum = batch.request("add", vec![json!(2), json!(3)]).unwrap();
        batch.notification("foo", ()).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(sum.payload().is_none());

        let run = batch.run().unwrap();
        assert!(batch.is_empty());
        assert_eq!(
            parse(run.payload().unwrap()),
            json!([{"id": 0, "method": "add", "params": [2, 3]}, {"method": "foo"}])
        );

        let reply = server.on_message(run.payload().unwrap()).await.unwrap().unwrap();
        assert_eq!(parse(reply.payload()), json!([{"ack": 0, "result": 5}]));

        client.on_message(reply.payload()).await.unwrap();
        run.await;
        assert_eq!(sum.await, Ok(json!(5)));
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let engine = RpcEngine::builder(LogicalCodec::new()).transport(transport).build();

        let run = engine.create_batch().run().unwrap();
        assert!(run.payload().is_none());
        run.await;
    }

    #[tokio::test]
    async fn test_messages_are_handed_to_transport() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|payload| payload == r#"{"method":"ping"}"#)
            .times(1)
            .return_const(());
        let engine = RpcEngine::builder(LogicalCodec::new())
            .transport(transport)
            .config(EngineConfig { log_messages: true })
            .build();

        engine.notification("ping", ()).unwrap();
    }

    #[tokio::test]
    async fn test_followup_request_rides_with_reply() {
        let server = RpcEngine::builder(LogicalCodec::new())
            .methods(Registry::new().register(
                "start",
                method_fn(|cx, _params| async move {
                    cx.request("confirm", json!(["job"]))?;
                    Ok::<_, HandlerError>(json!("started"))
                }),
            ))
            .build();
        let client = RpcEngine::builder(LogicalCodec::new())
            .methods(Registry::new().register(
                "confirm",
                method_fn(|_cx, params| async move { Ok(json!({"confirmed": params[0]})) }),
            ))
            .build();

        let start = client.request("start", ()).unwrap();
        let reply = server.on_message(start.payload().unwrap()).await.unwrap().unwrap();
        assert_eq!(
            parse(reply.payload()),
            json!({"ack": 0, "result": "started", "id": 0, "method": "confirm", "params": ["job"]})
        );
        assert_eq!(server.pending_count(), 1);

        // Client settles its own request and answers the multiplexed call
        let answer = client.on_message(reply.payload()).await.unwrap().unwrap();
        assert_eq!(start.await, Ok(json!("started")));
        assert_eq!(parse(answer.payload()), json!({"ack": 0, "result": {"confirmed": "job"}}));

        let settled = reply.settled().expect("follow-up pending");
        server.on_message(answer.payload()).await.unwrap();
        settled.await;
        assert_eq!(server.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_followups_of_notification_are_sent_alone() {
        let server = RpcEngine::builder(LogicalCodec::new())
            .methods(Registry::new().register(
                "tick",
                method_fn(|cx, _params| async move {
                    cx.notification("tock", ())?;
                    Ok::<_, HandlerError>(Value::Null)
                }),
            ))
            .build();

        let reply = reply_to(&server, r#"{"method":"tick"}"#).await;
        assert_eq!(reply, json!([{"method": "tock"}]));
    }

    #[tokio::test]
    async fn test_mixed_with_unknown_ack_answers_the_call() {
        let reply = reply_to(&server(), r#"{"ack":99,"result":1,"id":3,"method":"foo"}"#).await;
        assert_eq!(reply["ack"], json!(3));
        assert_eq!(reply["error"]["code"], json!(-32600));
        assert_eq!(reply["error"]["data"], json!(99));
    }

    #[tokio::test]
    async fn test_request_timeout_keeps_entry() {
        let client = client();
        let handle = client
            .request_with(RequestOptions::timeout(Duration::from_millis(20)), "foo", ())
            .unwrap();

        assert_eq!(handle.await, Err(RpcError::Timeout(Duration::from_millis(20))));
        assert_eq!(client.pending_count(), 1);

        // Late response is absorbed without error
        assert!(client.on_message(r#"{"ack":0,"result":"late"}"#).await.unwrap().is_none());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_abandons_and_restarts_ids() {
        let client = client();
        let first = client.request("foo", ()).unwrap();
        client.reset();
        assert_eq!(client.pending_count(), 0);

        let still_waiting = tokio::time::timeout(Duration::from_millis(50), first).await;
        assert!(still_waiting.is_err(), "abandoned request must not settle");
        assert_eq!(client.request("foo", ()).unwrap().id(), &Id::Number(0));
    }

    #[tokio::test]
    async fn test_unsendable_batch_request_is_abandoned() {
        let client = client();
        let batch = client.create_batch();
        let handle = batch.request("foo", ()).unwrap();

        // A codec failure on run drops the queued entries
        client.correlator().forget(handle.id());
        assert_eq!(handle.await, Err(RpcError::Abandoned));
    }

    #[tokio::test]
    async fn test_callback_sees_remote_error() {
        let client = client();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        let handle = client
            .request("foo", ())
            .unwrap()
            .with_callback(move |outcome| {
                *sink.lock().unwrap() = outcome.err();
                json!("handled")
            });

        client
            .on_message(r#"{"ack":0,"error":{"code":-32601,"message":"Unknown method 'foo'"}}"#)
            .await
            .unwrap();

        assert_eq!(handle.await, Ok(json!("handled")));
        assert_eq!(
            *seen.lock().unwrap(),
            Some(RpcError::Remote(ErrorObject::new(-32601, "Unknown method 'foo'")))
        );
    }
}
