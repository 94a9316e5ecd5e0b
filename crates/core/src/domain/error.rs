// Wire-visible Error Objects
//
// These are data, not Rust errors: they travel inside replies.
// Local failures of the engine itself live in `crate::error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Reserved error codes
pub mod code {
    /// Unparsable input
    pub const PARSE_ERROR: i64 = -32700;
    /// Invalid envelope, version tag or empty batch
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method or notification
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Parameter validation hook rejected the params
    pub const INVALID_PARAMS: i64 = -32602;
    /// No method registry configured
    pub const NOT_ACCEPTING_REQUESTS: i64 = -32603;
    /// Handler failed without providing its own code
    pub const HANDLER_FAILED: i64 = -32500;
}

/// A rich internal failure: name, message and a trace of causes.
///
/// Faults are candidates for redaction before they cross the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub trace: Vec<String>,
}

impl Fault {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, line: impl Into<String>) -> Self {
        self.trace.push(line.into());
        self
    }

    /// Capture an error and its chain of sources
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }

        Self {
            name: "Error".to_string(),
            message: err.to_string(),
            trace,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Payload of the `data` member of an error object
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorData {
    /// Caller supplied context, sent as-is
    Value(Value),
    /// Internal failure detail, redacted unless full errors are enabled
    Fault(Fault),
}

impl From<Value> for ErrorData {
    fn from(value: Value) -> Self {
        ErrorData::Value(value)
    }
}

impl From<Fault> for ErrorData {
    fn from(fault: Fault) -> Self {
        ErrorData::Fault(fault)
    }
}

/// `{code, message, data}` error object
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<ErrorData>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<ErrorData>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(code::PARSE_ERROR, "Invalid JSON").with_data(Value::String(detail.into()))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str, is_request: bool) -> Self {
        let kind = if is_request { "method" } else { "notification" };
        Self::new(code::METHOD_NOT_FOUND, format!("Unknown {} '{}'", kind, method))
            .with_data(Value::String(method.to_string()))
    }

    pub fn not_accepting_requests() -> Self {
        Self::new(code::NOT_ACCEPTING_REQUESTS, "Client doesn't accept requests")
    }

    /// Plain JSON view of `data`, if it is not a fault
    pub fn data_value(&self) -> Option<&Value> {
        match &self.data {
            Some(ErrorData::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match &self.data {
            Some(ErrorData::Fault(f)) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Failure raised by a handler or a parameter validator.
///
/// The discriminant is chosen where the failure is raised: `Coded` is
/// forwarded verbatim, `Failed` is wrapped with the code of the stage that
/// raised it (`-32602` for validation, `-32500` for execution).
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    Coded(ErrorObject),
    Failed(Fault),
}

impl HandlerError {
    pub fn coded(code: i64, message: impl Into<String>) -> Self {
        HandlerError::Coded(ErrorObject::new(code, message))
    }

    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(Fault::new("Error", message))
    }

    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        HandlerError::Failed(Fault::from_error(err))
    }

    /// Resolve into a wire error object, wrapping uncoded failures
    pub fn into_error_object(self, fallback_code: i64) -> ErrorObject {
        match self {
            HandlerError::Coded(err) => err,
            HandlerError::Failed(fault) => ErrorObject {
                code: fallback_code,
                message: fault.message.clone(),
                data: Some(ErrorData::Fault(fault)),
            },
        }
    }
}

impl From<ErrorObject> for HandlerError {
    fn from(err: ErrorObject) -> Self {
        HandlerError::Coded(err)
    }
}

impl From<Fault> for HandlerError {
    fn from(fault: Fault) -> Self {
        HandlerError::Failed(fault)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Coded(
            ErrorObject::new(code::INVALID_PARAMS, "Invalid params")
                .with_data(Value::String(err.to_string())),
        )
    }
}
