//! `system.multicall` Batching
//!
//! XML-RPC has no batch envelope; queued calls travel as the single array
//! param of one `system.multicall` request, and each call reads its own slot
//! of the result array.

use crate::codec::XmlRpcCodec;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use tether_core::domain::{Args, Call};
use tether_core::{ErrorObject, RequestHandle, Result, RpcEngine, RpcError};
use tracing::debug;

const MULTICALL: &str = "system.multicall";

struct QueuedCall {
    call: Call,
    slot: oneshot::Sender<RequestHandle>,
}

/// Calls queued for one `system.multicall` request
pub struct MulticallBatch {
    engine: RpcEngine<XmlRpcCodec>,
    queue: Mutex<Vec<QueuedCall>>,
}

impl MulticallBatch {
    pub fn new(engine: RpcEngine<XmlRpcCodec>) -> Self {
        Self {
            engine,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Queue a call; the returned future settles once the multicall response
    /// has been delivered to the engine
    ///
    /// # Errors
    /// - EngineError::MissingMethod if `method` is empty
    pub fn request(&self, method: impl Into<String>, args: impl Into<Args>) -> Result<MulticallResult> {
        let call = Call::new(method, args)?;
        let (slot, multicall) = oneshot::channel();

        let index = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.push(QueuedCall { call, slot });
            queue.len() - 1
        };

        let inner = async move {
            let multicall = multicall.await.map_err(|_| RpcError::Abandoned)?;
            let results = multicall.await?;
            pick(results, index)
        }
        .boxed();

        Ok(MulticallResult { inner })
    }

    /// Queue a call whose result is ignored. XML-RPC answers every call, so
    /// this only differs from `request` on the caller's side.
    pub fn notification(&self, method: impl Into<String>, args: impl Into<Args>) -> Result<()> {
        self.request(method, args).map(drop)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send the queued calls as one `system.multicall` request.
    ///
    /// Returns `None` if nothing was queued. The returned run carries the
    /// request id the transport must hand back with the response.
    pub fn run(&self) -> Result<Option<MulticallRun>> {
        let queued = std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner));
        if queued.is_empty() {
            return Ok(None);
        }

        let entries: Vec<Value> = queued
            .iter()
            .map(|q| json!({"methodName": q.call.method, "params": q.call.positional_params()}))
            .collect();
        debug!(calls = entries.len(), "Running multicall");

        let handle = self.engine.request(MULTICALL, json!([entries]))?;
        for queued in queued {
            // The caller may have dropped the result future already
            let _ = queued.slot.send(handle.clone());
        }

        Ok(Some(MulticallRun { handle }))
    }
}

/// Outcome of one call of a multicall
pub struct MulticallResult {
    inner: BoxFuture<'static, std::result::Result<Value, RpcError>>,
}

impl Future for MulticallResult {
    type Output = std::result::Result<Value, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// A sent multicall; completes once its response arrived, whatever the
/// individual outcomes
pub struct MulticallRun {
    handle: RequestHandle,
}

impl MulticallRun {
    pub fn id(&self) -> &tether_core::Id {
        self.handle.id()
    }

    pub fn payload(&self) -> Option<&str> {
        self.handle.payload()
    }
}

impl Future for MulticallRun {
    type Output = std::result::Result<(), RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|outcome| outcome.map(drop))
    }
}

/// Slot `index` of a multicall result: `[value]` on success, a fault struct
/// on failure
fn pick(results: Value, index: usize) -> std::result::Result<Value, RpcError> {
    let malformed = || RpcError::Remote(ErrorObject::invalid_request("Malformed system.multicall response"));

    let Value::Array(mut results) = results else {
        return Err(malformed());
    };
    if index >= results.len() {
        return Err(malformed());
    }

    match results.swap_remove(index) {
        Value::Array(mut wrapped) if wrapped.len() == 1 => Ok(wrapped.remove(0)),
        Value::Object(fault) => {
            let code = fault.get("faultCode").and_then(Value::as_i64);
            let message = fault.get("faultString").and_then(Value::as_str);
            match (code, message) {
                (Some(code), Some(message)) => Err(RpcError::Remote(ErrorObject::new(code, message))),
                _ => Err(malformed()),
            }
        }
        _ => Err(malformed()),
    }
}
