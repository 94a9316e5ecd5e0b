// Local Error Types
//
// Failures surfaced to the engine's own caller. Errors that travel to the
// peer are `domain::ErrorObject` values instead.

use crate::domain::{ErrorObject, HandlerError, Id};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Engine-level error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("`method` argument is not provided")]
    MissingMethod,

    #[error("`message` argument is not provided")]
    MissingMessage,

    #[error("Received invalid message")]
    InvalidMessage {
        id: Option<Id>,
        error: Option<ErrorObject>,
    },

    /// Response addressed to the null id; carries the peer's error, if any
    #[error("Received response for null id{}", .error.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    MalformedResponse { error: Option<ErrorObject> },

    #[error("Received response for unknown request '{ack}'")]
    UnknownRequest {
        ack: Id,
        outcome: std::result::Result<Value, ErrorObject>,
    },

    /// Error reply for a notification: there is no id to address it to
    #[error("Error response for notification: {0}")]
    NotificationFailed(ErrorObject),

    /// Aggregate of batch elements that failed locally
    #[error("{} message(s) of the batch failed", .0.len())]
    BatchFailed(Vec<EngineError>),

    #[error("Unsupported by this codec: {0}")]
    Unsupported(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Queuing a follow-up from inside a handler fails like any other handler error
impl From<EngineError> for HandlerError {
    fn from(err: EngineError) -> Self {
        HandlerError::from_error(&err)
    }
}

/// Outcome of an outstanding request that did not resolve successfully
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Remote error: {0}")]
    Remote(ErrorObject),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// The pending entry was dropped because its request could not be sent
    #[error("Request abandoned before a response arrived")]
    Abandoned,
}

impl RpcError {
    /// Error object sent by the peer, if this is a remote failure
    pub fn remote(&self) -> Option<&ErrorObject> {
        match self {
            RpcError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
