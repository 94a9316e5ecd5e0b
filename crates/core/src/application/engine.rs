// RPC Engine - message correlation and dispatch
//
// Wire concerns are delegated to the codec; delivery to the transport.

use super::batch::Batch;
use super::context::CallContext;
use super::correlator::{
    settled_after, Correlator, Outgoing, QueuedCall, RequestHandle, RequestOptions, Settled,
    SharedResponse,
};
use super::registry::Registry;
use crate::config::EngineConfig;
use crate::domain::{
    code, Args, Call, Decoded, ErrorObject, Fault, HandlerError, Id, Message, Outbound,
    OutboundCall, Reply,
};
use crate::error::{EngineError, Result};
use crate::port::{Codec, Transport};
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

struct EngineInner<C> {
    codec: C,
    methods: Option<Registry>,
    transport: Option<Arc<dyn Transport>>,
    config: EngineConfig,
    correlator: Arc<Correlator>,
}

/// Transport-agnostic RPC endpoint.
///
/// Cheap to clone; clones share the pending table and id sequence.
pub struct RpcEngine<C: Codec> {
    inner: Arc<EngineInner<C>>,
}

impl<C: Codec> Clone for RpcEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Builder for [`RpcEngine`]
pub struct EngineBuilder<C> {
    codec: C,
    methods: Option<Registry>,
    transport: Option<Arc<dyn Transport>>,
    config: EngineConfig,
}

impl<C: Codec> EngineBuilder<C> {
    /// Methods exposed to the peer. Without a registry, incoming calls are
    /// answered with `-32603`.
    pub fn methods(mut self, methods: Registry) -> Self {
        self.methods = Some(methods);
        self
    }

    /// Where serialized messages go. Without a transport, they are only
    /// returned to the caller.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> RpcEngine<C> {
        RpcEngine {
            inner: Arc::new(EngineInner {
                codec: self.codec,
                methods: self.methods,
                transport: self.transport,
                config: self.config,
                correlator: Arc::new(Correlator::new()),
            }),
        }
    }
}

/// Encoded reply of one inbound message, plus the follow-up requests it carries
struct Processed<W> {
    wire: W,
    responses: Vec<SharedResponse>,
}

/// Outcome of dispatching one message
struct Dispatch {
    reply: Option<Reply>,
    followups: Vec<QueuedCall>,
}

impl Dispatch {
    fn none() -> Self {
        Self {
            reply: None,
            followups: Vec::new(),
        }
    }

    fn failure(ack: Option<Id>, error: ErrorObject) -> Self {
        Self {
            reply: Some(Reply::failure(ack, error)),
            followups: Vec::new(),
        }
    }
}

impl<C: Codec> RpcEngine<C> {
    pub fn builder(codec: C) -> EngineBuilder<C> {
        EngineBuilder {
            codec,
            methods: None,
            transport: None,
            config: EngineConfig::default(),
        }
    }

    /// Engine with no methods and no transport
    pub fn new(codec: C) -> Self {
        Self::builder(codec).build()
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    /// Send a notification; returns its serialized form
    ///
    /// # Errors
    /// - EngineError::MissingMethod if `method` is empty
    pub fn notification(&self, method: impl Into<String>, args: impl Into<Args>) -> Result<Outgoing> {
        let call = Call::new(method, args)?;
        let wire = self
            .inner
            .codec
            .encode(Outbound::Call(OutboundCall { id: None, call }))?;
        self.emit(&wire, None)
    }

    /// Send a request; the returned handle resolves with the peer's answer
    ///
    /// # Errors
    /// - EngineError::MissingMethod if `method` is empty
    pub fn request(&self, method: impl Into<String>, args: impl Into<Args>) -> Result<RequestHandle> {
        self.request_with(RequestOptions::default(), method, args)
    }

    /// Send a request with per-request options (e.g. a timeout)
    pub fn request_with(
        &self,
        options: RequestOptions,
        method: impl Into<String>,
        args: impl Into<Args>,
    ) -> Result<RequestHandle> {
        let call = Call::new(method, args)?;
        let (outbound, mut handle) = self.inner.correlator.request(call, &options);

        let sent = self
            .inner
            .codec
            .encode(Outbound::Call(outbound))
            .and_then(|wire| self.emit(&wire, None));

        match sent {
            Ok(outgoing) => {
                handle.set_payload(outgoing.into_payload());
                Ok(handle)
            }
            Err(err) => {
                self.inner.correlator.forget(handle.id());
                Err(err)
            }
        }
    }

    /// Process raw inbound input
    ///
    /// Returns the reply that was sent, if any.
    ///
    /// # Errors
    /// Local failures with no peer to address: empty input, invalid or
    /// unknown-id responses, failed notifications, all-failed batches.
    pub async fn on_message(&self, raw: &str) -> Result<Option<Outgoing>> {
        self.on_message_with_ack(raw, None).await
    }

    /// Process raw inbound input with an out-of-band correlation hint.
    ///
    /// Used by wire formats that do not carry ids themselves.
    pub async fn on_message_with_ack(&self, raw: &str, ack: Option<Id>) -> Result<Option<Outgoing>> {
        if raw.trim().is_empty() {
            return Err(EngineError::MissingMessage);
        }
        self.log_payload("inbound", raw);

        let (wire, responses) = match self.inner.codec.decode(raw, ack.as_ref()) {
            Decoded::Batch(items) => {
                debug!(size = items.len(), "Processing batch");

                // All elements start before any is awaited; all settle before aggregation
                let settled = join_all(items.into_iter().map(|item| self.process(item))).await;

                let mut responses = Vec::new();
                let settled = settled
                    .into_iter()
                    .map(|outcome| {
                        outcome.map(|processed| {
                            processed.map(|p| {
                                responses.extend(p.responses);
                                p.wire
                            })
                        })
                    })
                    .collect();

                (self.inner.codec.aggregate_results(settled)?, responses)
            }
            decoded => match self.process(decoded).await? {
                Some(processed) => (Some(processed.wire), processed.responses),
                None => (None, Vec::new()),
            },
        };

        match wire {
            None => Ok(None),
            Some(wire) => {
                let settled = (!responses.is_empty()).then(|| settled_after(responses));
                self.emit(&wire, settled).map(Some)
            }
        }
    }

    /// Batch of calls sent together by [`Batch::run`]
    pub fn create_batch(&self) -> Batch<C> {
        Batch::new(self.clone())
    }

    /// Restart the id sequence and abandon every pending request
    pub fn reset(&self) {
        let abandoned = self.inner.correlator.pending_count();
        self.inner.correlator.reset();
        info!(abandoned, "Engine reset");
    }

    /// Number of requests still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub(crate) fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    /// Encode and send queued calls as one multi-call envelope
    pub(crate) fn send_calls(&self, calls: Vec<OutboundCall>) -> Result<Outgoing> {
        let ids: Vec<Id> = calls.iter().filter_map(|c| c.id.clone()).collect();

        let sent = self.encode_calls(calls).and_then(|wire| self.emit(&wire, None));
        if sent.is_err() {
            for id in &ids {
                self.inner.correlator.forget(id);
            }
        }
        sent
    }

    async fn process(&self, decoded: Decoded) -> Result<Option<Processed<C::Wire>>> {
        let envelope = match decoded {
            Decoded::Message(envelope) => envelope,
            Decoded::Rejected { ack, error } => {
                debug!(code = error.code, reason = %error.message, "Rejected by codec");
                return self.encode_dispatch(Dispatch::failure(ack, error));
            }
            Decoded::Batch(_) => {
                return Err(EngineError::InvalidMessage {
                    id: None,
                    error: None,
                });
            }
        };

        let message = self.inner.codec.validate(envelope)?;
        let dispatch = self.dispatch(message).await?;
        self.encode_dispatch(dispatch)
    }

    async fn dispatch(&self, message: Message) -> Result<Dispatch> {
        let (id, call) = match message {
            Message::Response(response) => {
                self.inner.correlator.settle(response)?;
                return Ok(Dispatch::none());
            }
            Message::Notification(call) => (None, call),
            Message::Request { id, call } => (Some(id), call),
            Message::Mixed { response, id, call } => {
                if let Err(err) = self.inner.correlator.settle(response) {
                    warn!(error = %err, "Answering multiplexed call with correlation failure");
                    return Ok(Dispatch::failure(id, correlation_error(err)));
                }
                (id, call)
            }
        };

        Ok(self.invoke(id, call).await)
    }

    async fn invoke(&self, id: Option<Id>, call: Call) -> Dispatch {
        let Some(methods) = &self.inner.methods else {
            return Dispatch::failure(id, ErrorObject::not_accepting_requests());
        };

        let Some(method) = methods.resolve(&call.method) else {
            debug!(method = %call.method, "Unknown method");
            return Dispatch::failure(id.clone(), ErrorObject::method_not_found(&call.method, id.is_some()));
        };

        let params = call.positional_params();
        let cx = CallContext::new(id.clone(), call.method.clone(), self.inner.correlator.clone());

        let outcome: std::result::Result<Value, ErrorObject> =
            match guarded(&call.method, method.validate_params(&params)).await {
                Err(err) => Err(err.into_error_object(code::INVALID_PARAMS)),
                Ok(()) => guarded(&call.method, method.call(cx.clone(), params))
                    .await
                    .map_err(|err| err.into_error_object(code::HANDLER_FAILED)),
            };

        if let Err(err) = &outcome {
            debug!(method = %call.method, code = err.code, reason = %err.message, "Handler failed");
        }

        let reply = (outcome.is_err() || id.is_some()).then(|| Reply {
            ack: id,
            outcome,
            followups: Vec::new(),
        });

        Dispatch {
            reply,
            followups: cx.take_followups(),
        }
    }

    fn encode_dispatch(&self, dispatch: Dispatch) -> Result<Option<Processed<C::Wire>>> {
        let Dispatch { reply, followups } = dispatch;

        let responses: Vec<SharedResponse> =
            followups.iter().filter_map(|q| q.response.clone()).collect();
        let calls: Vec<OutboundCall> = followups.into_iter().map(|q| q.call).collect();
        let ids: Vec<Id> = calls.iter().filter_map(|c| c.id.clone()).collect();

        let encoded = match reply {
            Some(mut reply) => {
                reply.followups = calls;
                self.inner.codec.encode(Outbound::Reply(reply)).map(Some)
            }
            None if calls.is_empty() => Ok(None),
            None => self.encode_calls(calls).map(Some),
        };

        match encoded {
            Ok(wire) => Ok(wire.map(|wire| Processed { wire, responses })),
            Err(err) => {
                // Follow-ups that never leave will never be answered
                for id in &ids {
                    self.inner.correlator.forget(id);
                }
                Err(err)
            }
        }
    }

    fn encode_calls(&self, calls: Vec<OutboundCall>) -> Result<C::Wire> {
        let items = calls
            .into_iter()
            .map(|call| self.inner.codec.encode(Outbound::Call(call)))
            .collect::<Result<Vec<_>>>()?;
        self.inner.codec.encode_batch(items)
    }

    fn emit(&self, wire: &C::Wire, settled: Option<Settled>) -> Result<Outgoing> {
        let payload = self.inner.codec.stringify(wire)?;
        self.log_payload("outbound", &payload);

        if let Some(transport) = &self.inner.transport {
            transport.send(&payload);
        }

        Ok(Outgoing::new(payload, settled))
    }

    fn log_payload(&self, direction: &str, payload: &str) {
        if self.inner.config.log_messages {
            info!(direction, payload, "RPC message");
        } else {
            trace!(direction, payload, "RPC message");
        }
    }
}

/// Run handler code with panic isolation: a panicking handler fails its own
/// call only, never the dispatch loop or its batch siblings
async fn guarded<T>(
    method: &str,
    future: impl Future<Output = std::result::Result<T, HandlerError>>,
) -> std::result::Result<T, HandlerError> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            error!(method, panic_msg = %panic_msg, "Handler panicked");
            Err(HandlerError::Failed(Fault::new("Panic", panic_msg)))
        }
    }
}

fn correlation_error(err: EngineError) -> ErrorObject {
    let error = ErrorObject::invalid_request(err.to_string());
    match err {
        EngineError::UnknownRequest { ack, .. } => error.with_data(ack.to_value()),
        _ => error,
    }
}
