//! Demo method registry served by `tether serve`

use serde_json::{json, Value};
use tether_core::{method_fn, parse_params, Fault, HandlerError, Registry};

pub fn registry() -> Registry {
    Registry::new()
        .register(
            "echo",
            method_fn(|_cx, params| async move {
                Ok(match params.len() {
                    1 => params.into_iter().next().unwrap_or(Value::Null),
                    _ => Value::Array(params),
                })
            }),
        )
        .register("ping", method_fn(|_cx, _params| async { Ok(json!("pong")) }))
        .register(
            "fail",
            method_fn(|_cx, _params| async {
                Err(HandlerError::Failed(
                    Fault::new("DemoError", "requested failure").with_trace("tether::demo::fail"),
                ))
            }),
        )
        .namespace("math", math())
}

fn math() -> Registry {
    Registry::new()
        .register(
            "add",
            method_fn(|_cx, params| async move {
                let (a, b): (f64, f64) = parse_params(params)?;
                Ok::<_, HandlerError>(number(a + b))
            })
            .with_validator(|params| match params.len() {
                2 => Ok(()),
                n => Err(HandlerError::failed(format!("expected 2 params, got {}", n))),
            }),
        )
        .register(
            "sum",
            method_fn(|_cx, params| async move {
                let values: Vec<f64> = parse_params(params)?;
                Ok::<_, HandlerError>(number(values.iter().sum()))
            }),
        )
}

/// Integral results render without a fraction
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_codec_json::JsonRpcCodec;
    use tether_core::RpcEngine;

    async fn call(raw: &str) -> Value {
        let engine = RpcEngine::builder(JsonRpcCodec::default())
            .methods(registry())
            .build();
        let reply = engine.on_message(raw).await.unwrap().unwrap();
        serde_json::from_str(reply.payload()).unwrap()
    }

    #[tokio::test]
    async fn test_math() {
        let reply = call(r#"{"jsonrpc":"2.0","id":1,"method":"math.add","params":[2,3]}"#).await;
        assert_eq!(reply["result"], json!(5));

        let reply = call(r#"{"jsonrpc":"2.0","id":2,"method":"math.sum","params":[1,2.5]}"#).await;
        assert_eq!(reply["result"], json!(3.5));

        let reply = call(r#"{"jsonrpc":"2.0","id":3,"method":"math.add","params":[1]}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn test_echo_and_fail() {
        let reply = call(r#"{"jsonrpc":"2.0","id":1,"method":"echo","params":{"a":1}}"#).await;
        assert_eq!(reply["result"], json!({"a": 1}));

        let reply = call(r#"{"jsonrpc":"2.0","id":2,"method":"fail"}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32500));
        assert!(reply["error"]["data"].is_string());
    }
}
