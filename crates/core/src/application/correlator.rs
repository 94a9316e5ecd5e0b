// Request Correlation
//
// The pending table and the request-id sequence: the only mutable state an
// engine shares between concurrent dispatches. Both live behind one lock,
// which is never held across an await point.

use crate::domain::{Call, Id, OutboundCall, Response};
use crate::error::{EngineError, RpcError};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

type Outcome = Result<Value, RpcError>;

/// Outcome of one request, observable from several places at once
pub type SharedResponse = Shared<BoxFuture<'static, Outcome>>;

/// Completes once a set of requests has settled, whatever their outcome
pub type Settled = Shared<BoxFuture<'static, ()>>;

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Reject with `RpcError::Timeout` if no response arrived in time.
    /// The pending entry is kept; a late response is discarded.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// What a pending entry is settled with
enum Settlement {
    Outcome(Outcome),
    /// The table was reset; the request stays unsettled forever
    Reset,
}

#[derive(Default)]
struct PendingTable {
    next_id: i64,
    entries: HashMap<Id, oneshot::Sender<Settlement>>,
}

/// Id sequence plus table of unsettled requests
#[derive(Default)]
pub struct Correlator {
    table: Mutex<PendingTable>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and register a pending entry for it
    pub fn register(&self, options: &RequestOptions) -> (Id, SharedResponse) {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut table = self.lock();
            let id = Id::Number(table.next_id);
            table.next_id += 1;
            table.entries.insert(id.clone(), tx);
            id
        };

        let settled = async move {
            match rx.await {
                Ok(Settlement::Outcome(outcome)) => outcome,
                Ok(Settlement::Reset) => future::pending::<Outcome>().await,
                Err(_) => Err(RpcError::Abandoned),
            }
        };

        let response = match options.timeout {
            None => settled.boxed(),
            Some(timeout) => {
                let deadline = tokio::time::Instant::now() + timeout;
                async move {
                    tokio::time::timeout_at(deadline, settled)
                        .await
                        .unwrap_or_else(|_| Err(RpcError::Timeout(timeout)))
                }
                .boxed()
            }
        };

        (id, response.shared())
    }

    /// Register a request for `call` and build its outbound form
    pub fn request(&self, call: Call, options: &RequestOptions) -> (OutboundCall, RequestHandle) {
        let (id, response) = self.register(options);
        let handle = RequestHandle {
            id: id.clone(),
            payload: None,
            response,
        };
        (OutboundCall { id: Some(id), call }, handle)
    }

    /// Settle the pending entry acknowledged by `response`.
    ///
    /// The entry is removed before it is settled, so a second response for
    /// the same id is reported as unknown.
    ///
    /// # Errors
    /// - EngineError::UnknownRequest if no entry is pending for the ack
    pub fn settle(&self, response: Response) -> Result<(), EngineError> {
        let Response { ack, outcome } = response;
        let sender = {
            let mut table = self.lock();
            match table.entries.remove(&ack) {
                Some(sender) => Some(sender),
                None => ack.as_numeric().and_then(|id| table.entries.remove(&id)),
            }
        };

        match sender {
            None => Err(EngineError::UnknownRequest { ack, outcome }),
            Some(sender) => {
                let settlement = Settlement::Outcome(outcome.map_err(RpcError::Remote));
                if sender.send(settlement).is_err() {
                    debug!(ack = %ack, "Discarding late response");
                }
                Ok(())
            }
        }
    }

    /// Drop a pending entry that will never be sent; its handle resolves
    /// with `RpcError::Abandoned`
    pub fn forget(&self, id: &Id) {
        self.lock().entries.remove(id);
    }

    /// Restart the id sequence and abandon every pending request.
    ///
    /// Abandoned handles are not rejected: they stay pending (or run into
    /// their own timeout).
    pub fn reset(&self) {
        let table = std::mem::take(&mut *self.lock());
        for sender in table.entries.into_values() {
            let _ = sender.send(Settlement::Reset);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle of an outstanding request.
///
/// Carries the serialized request (when it was sent directly rather than
/// queued) and resolves with the peer's result. Clones observe the same
/// outcome.
#[derive(Clone)]
pub struct RequestHandle {
    id: Id,
    payload: Option<String>,
    response: SharedResponse,
}

impl RequestHandle {
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Serialized request, `None` for calls queued on a batch or context
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Attach a completion callback.
    ///
    /// The callback sees the outcome (success or failure); the handle then
    /// resolves successfully with whatever the callback returns.
    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: FnOnce(Result<Value, RpcError>) -> Value + Send + 'static,
    {
        let response = self
            .response
            .map(move |outcome| -> Outcome { Ok(callback(outcome)) })
            .boxed()
            .shared();

        Self { response, ..self }
    }

    pub(crate) fn set_payload(&mut self, payload: String) {
        self.payload = Some(payload);
    }

    pub(crate) fn response(&self) -> SharedResponse {
        self.response.clone()
    }
}

impl Future for RequestHandle {
    type Output = Result<Value, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.response).poll(cx)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .finish()
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload.as_deref().unwrap_or_default())
    }
}

/// Join-all-then-discard: completes when every response settled
pub fn settled_after(responses: Vec<SharedResponse>) -> Settled {
    future::join_all(responses).map(|_| ()).boxed().shared()
}

/// Serialized message produced by the engine
#[derive(Clone)]
pub struct Outgoing {
    payload: String,
    settled: Option<Settled>,
}

impl Outgoing {
    pub(crate) fn new(payload: String, settled: Option<Settled>) -> Self {
        Self { payload, settled }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Completion of the follow-up requests piggy-backed on this message
    pub fn settled(&self) -> Option<Settled> {
        self.settled.clone()
    }
}

impl fmt::Debug for Outgoing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outgoing")
            .field("payload", &self.payload)
            .field("followups", &self.settled.is_some())
            .finish()
    }
}

impl fmt::Display for Outgoing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload)
    }
}

impl AsRef<str> for Outgoing {
    fn as_ref(&self) -> &str {
        &self.payload
    }
}

pub(crate) struct QueuedCall {
    pub call: OutboundCall,
    pub response: Option<SharedResponse>,
}

/// Calls built now, sent later as one unit
#[derive(Default)]
pub(crate) struct CallQueue {
    calls: Mutex<Vec<QueuedCall>>,
}

impl CallQueue {
    pub fn push_notification(&self, call: Call) {
        self.lock().push(QueuedCall {
            call: OutboundCall { id: None, call },
            response: None,
        });
    }

    pub fn push_request(&self, correlator: &Correlator, call: Call) -> RequestHandle {
        let (call, handle) = correlator.request(call, &RequestOptions::default());
        self.lock().push(QueuedCall {
            call,
            response: Some(handle.response()),
        });
        handle
    }

    /// Swap the queue for an empty one
    pub fn take(&self) -> Vec<QueuedCall> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorObject;
    use serde_json::json;

    fn response(ack: i64, outcome: Result<Value, ErrorObject>) -> Response {
        Response {
            ack: Id::Number(ack),
            outcome,
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let correlator = Correlator::new();
        let (a, _) = correlator.register(&RequestOptions::default());
        let (b, _) = correlator.register(&RequestOptions::default());
        assert_eq!(a, Id::Number(0));
        assert_eq!(b, Id::Number(1));
        assert_eq!(correlator.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_settle_resolves_once() {
        let correlator = Correlator::new();
        let (id, pending) = correlator.register(&RequestOptions::default());
        assert_eq!(id, Id::Number(0));

        correlator.settle(response(0, Ok(json!("bar")))).unwrap();
        assert_eq!(pending.await, Ok(json!("bar")));
        assert_eq!(correlator.pending_count(), 0);

        let err = correlator.settle(response(0, Ok(json!("again")))).unwrap_err();
        assert!(matches!(err, EngineError::UnknownRequest { ack: Id::Number(0), .. }));
    }

    #[tokio::test]
    async fn test_settle_accepts_ack_echoed_as_string() {
        let correlator = Correlator::new();
        let (_, pending) = correlator.register(&RequestOptions::default());

        correlator
            .settle(Response {
                ack: Id::from("0"),
                outcome: Ok(json!("bar")),
            })
            .unwrap();
        assert_eq!(pending.await, Ok(json!("bar")));
    }

    #[tokio::test]
    async fn test_settle_with_error_rejects() {
        let correlator = Correlator::new();
        let (_, pending) = correlator.register(&RequestOptions::default());

        let error = ErrorObject::new(-32601, "Unknown method 'foo'");
        correlator.settle(response(0, Err(error.clone()))).unwrap();
        assert_eq!(pending.await, Err(RpcError::Remote(error)));
    }

    #[tokio::test]
    async fn test_timeout_keeps_entry_and_discards_late_response() {
        let correlator = Correlator::new();
        let (_, pending) =
            correlator.register(&RequestOptions::timeout(Duration::from_millis(10)));

        assert_eq!(
            pending.await,
            Err(RpcError::Timeout(Duration::from_millis(10)))
        );
        assert_eq!(correlator.pending_count(), 1);

        // Late arrival is matched and dropped without error
        correlator.settle(response(0, Ok(json!(1)))).unwrap();
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_leaves_pending_unsettled() {
        let correlator = Correlator::new();
        let (_, pending) = correlator.register(&RequestOptions::default());

        correlator.reset();
        assert_eq!(correlator.pending_count(), 0);
        let mut pending = tokio_test::task::spawn(pending);
        tokio_test::assert_pending!(pending.poll());

        let (id, _) = correlator.register(&RequestOptions::default());
        assert_eq!(id, Id::Number(0));
    }

    #[tokio::test]
    async fn test_reset_request_still_times_out() {
        let correlator = Correlator::new();
        let (_, pending) =
            correlator.register(&RequestOptions::timeout(Duration::from_millis(10)));

        correlator.reset();
        assert_eq!(pending.await, Err(RpcError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_forgotten_entry_is_abandoned() {
        let correlator = Correlator::new();
        let (id, pending) = correlator.register(&RequestOptions::default());

        correlator.forget(&id);
        assert_eq!(pending.await, Err(RpcError::Abandoned));
    }

    #[tokio::test]
    async fn test_callback_maps_both_outcomes() {
        let correlator = Correlator::new();
        let (_, handle) = correlator.request(
            Call::new("foo", ()).unwrap(),
            &RequestOptions::default(),
        );
        let handle = handle.with_callback(|outcome| match outcome {
            Ok(result) => json!({ "ok": result }),
            Err(err) => json!({ "err": err.to_string() }),
        });

        correlator.settle(response(0, Ok(json!("bar")))).unwrap();
        assert_eq!(handle.await, Ok(json!({"ok": "bar"})));
    }

    #[tokio::test]
    async fn test_settled_after_waits_for_failures_too() {
        let correlator = Correlator::new();
        let (_, first) = correlator.register(&RequestOptions::default());
        let (_, second) = correlator.register(&RequestOptions::default());
        let mut settled = tokio_test::task::spawn(settled_after(vec![first, second]));
        tokio_test::assert_pending!(settled.poll());

        correlator
            .settle(response(0, Err(ErrorObject::new(1, "no"))))
            .unwrap();
        tokio_test::assert_pending!(settled.poll());

        correlator.settle(response(1, Ok(json!(null)))).unwrap();
        tokio_test::assert_ready!(settled.poll());
    }
}
