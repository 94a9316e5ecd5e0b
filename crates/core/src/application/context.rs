// Handler Call Context

use super::correlator::{CallQueue, Correlator, QueuedCall, RequestHandle};
use crate::domain::{Args, Call, Id};
use crate::error::Result;
use std::sync::Arc;

/// Context handed to every handler invocation.
///
/// Calls made through it are queued and travel together with the reply to
/// the call being handled.
#[derive(Clone)]
pub struct CallContext {
    id: Option<Id>,
    method: String,
    correlator: Arc<Correlator>,
    followups: Arc<CallQueue>,
}

impl CallContext {
    pub(crate) fn new(id: Option<Id>, method: String, correlator: Arc<Correlator>) -> Self {
        Self {
            id,
            method,
            correlator,
            followups: Arc::new(CallQueue::default()),
        }
    }

    /// Id of the call being handled, `None` for notifications
    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Queue a follow-up notification
    ///
    /// # Errors
    /// - EngineError::MissingMethod if `method` is empty
    pub fn notification(&self, method: impl Into<String>, args: impl Into<Args>) -> Result<()> {
        self.followups.push_notification(Call::new(method, args)?);
        Ok(())
    }

    /// Queue a follow-up request; the handle settles once the peer answers it
    ///
    /// # Errors
    /// - EngineError::MissingMethod if `method` is empty
    pub fn request(
        &self,
        method: impl Into<String>,
        args: impl Into<Args>,
    ) -> Result<RequestHandle> {
        let call = Call::new(method, args)?;
        Ok(self.followups.push_request(&self.correlator, call))
    }

    pub(crate) fn take_followups(&self) -> Vec<QueuedCall> {
        self.followups.take()
    }
}
