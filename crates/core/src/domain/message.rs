// Logical Message Model (pre-wire)

use super::{Args, ErrorObject, Id};
use crate::error::EngineError;
use serde_json::Value;

/// Method name plus wire params
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub params: Option<Value>,
}

impl Call {
    /// Build a call, applying the argument calling convention
    pub fn new(method: impl Into<String>, args: impl Into<Args>) -> Result<Self, EngineError> {
        let method = method.into();
        if method.is_empty() {
            return Err(EngineError::MissingMethod);
        }

        Ok(Self {
            method,
            params: args.into().into_params(),
        })
    }

    /// Params as the positional sequence handed to a handler.
    ///
    /// A bare value (object or scalar) becomes a one-element sequence.
    pub fn positional_params(&self) -> Vec<Value> {
        match &self.params {
            None => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        }
    }
}

/// Settlement of a previously sent request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub ack: Id,
    pub outcome: Result<Value, ErrorObject>,
}

/// A classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// One-way call, no reply expected
    Notification(Call),
    /// Call expecting exactly one reply
    Request { id: Id, call: Call },
    /// Reply to one of our own requests
    Response(Response),
    /// Response and new call multiplexed in one wire message
    Mixed {
        response: Response,
        id: Option<Id>,
        call: Call,
    },
}

/// Loosely-typed message as lifted off the wire by a codec.
///
/// Which fields are present decides the message kind; see [`Envelope::classify`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub id: Option<Id>,
    pub ack: Option<Id>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<ErrorObject>,
}

impl Envelope {
    /// Validate the envelope and turn it into a tagged [`Message`].
    ///
    /// # Errors
    /// - `EngineError::InvalidMessage` if there is neither a method nor an ack
    /// - `EngineError::MalformedResponse` if the ack is the null sentinel and
    ///   there is no method; the carried error is rethrown
    pub fn classify(self) -> Result<Message, EngineError> {
        let Envelope {
            id,
            ack,
            method,
            params,
            result,
            mut error,
        } = self;
        let method = method.filter(|m| !m.is_empty());

        let response = match ack {
            Some(Id::Null) if method.is_none() => {
                return Err(EngineError::MalformedResponse { error });
            }
            Some(Id::Null) | None => None,
            Some(ack) => Some(Response {
                ack,
                outcome: match error.take() {
                    Some(err) => Err(err),
                    None => Ok(result.unwrap_or(Value::Null)),
                },
            }),
        };

        match (response, method) {
            (None, None) => Err(EngineError::InvalidMessage { id, error }),
            (Some(response), None) => Ok(Message::Response(response)),
            (None, Some(method)) => {
                let call = Call { method, params };
                Ok(match id {
                    Some(id) => Message::Request { id, call },
                    None => Message::Notification(call),
                })
            }
            (Some(response), Some(method)) => Ok(Message::Mixed {
                response,
                id,
                call: Call { method, params },
            }),
        }
    }
}

/// Result of decoding raw input
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(Envelope),
    /// Multi-message envelope; every element is processed independently
    Batch(Vec<Decoded>),
    /// Structural failure synthesized by the codec, replied without dispatch
    Rejected { ack: Option<Id>, error: ErrorObject },
}

/// Call leaving this engine
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub id: Option<Id>,
    pub call: Call,
}

/// Reply leaving this engine, with follow-up calls queued by the handler
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub ack: Option<Id>,
    pub outcome: Result<Value, ErrorObject>,
    pub followups: Vec<OutboundCall>,
}

impl Reply {
    pub fn failure(ack: Option<Id>, error: ErrorObject) -> Self {
        Self {
            ack,
            outcome: Err(error),
            followups: Vec::new(),
        }
    }
}

/// Anything handed to a codec for encoding
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Call(OutboundCall),
    Reply(Reply),
}
