// Outbound Batch
//
// Accumulates calls against one engine and flushes them as a single
// multi-call envelope.

use super::correlator::{settled_after, CallQueue, RequestHandle, Settled};
use super::engine::RpcEngine;
use crate::domain::{Args, Call};
use crate::error::Result;
use crate::port::Codec;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Calls queued for one combined send
pub struct Batch<C: Codec> {
    engine: RpcEngine<C>,
    queue: CallQueue,
}

impl<C: Codec> Batch<C> {
    pub(crate) fn new(engine: RpcEngine<C>) -> Self {
        Self {
            engine,
            queue: CallQueue::default(),
        }
    }

    /// Queue a notification (fire-and-forget)
    ///
    /// # Errors
    /// - EngineError::MissingMethod if `method` is empty
    pub fn notification(&self, method: impl Into<String>, args: impl Into<Args>) -> Result<()> {
        self.queue.push_notification(Call::new(method, args)?);
        Ok(())
    }

    /// Queue a request.
    ///
    /// The id is allocated and the entry registered immediately: the call is
    /// pending even though nothing was sent yet.
    pub fn request(&self, method: impl Into<String>, args: impl Into<Args>) -> Result<RequestHandle> {
        let call = Call::new(method, args)?;
        Ok(self.queue.push_request(self.engine.correlator(), call))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send every queued call as one envelope and empty the queue.
    ///
    /// The returned [`BatchRun`] completes once every queued request settled;
    /// per-call results are observed through the individual request handles.
    /// An empty batch sends nothing.
    pub fn run(&self) -> Result<BatchRun> {
        let queued = self.queue.take();

        let responses = queued.iter().filter_map(|q| q.response.clone()).collect();
        let settled = settled_after(responses);

        if queued.is_empty() {
            return Ok(BatchRun {
                payload: None,
                settled,
            });
        }

        debug!(size = queued.len(), "Running batch");
        let calls = queued.into_iter().map(|q| q.call).collect();
        let outgoing = self.engine.send_calls(calls)?;

        Ok(BatchRun {
            payload: Some(outgoing.into_payload()),
            settled,
        })
    }
}

/// Result of [`Batch::run`]: the sent envelope, awaitable until every
/// request in it has settled
pub struct BatchRun {
    payload: Option<String>,
    settled: Settled,
}

impl BatchRun {
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

impl Future for BatchRun {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.settled).poll(cx)
    }
}
