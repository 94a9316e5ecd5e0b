//! JSON-RPC Wire Types
//!
//! Serialized field order is alphabetical, so equal messages always render
//! to the same text.

use serde::Serialize;
use serde_json::Value;
use tether_core::Id;

/// Value of the mandatory `jsonrpc` member
pub const JSONRPC_VERSION: &str = "2.0";

/// `{code, data, message}` as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireError {
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub message: String,
}

/// One JSON-RPC envelope (call or reply)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl WireMessage {
    pub fn call(id: Option<Id>, method: String, params: Option<Value>) -> Self {
        Self {
            error: None,
            id,
            jsonrpc: JSONRPC_VERSION,
            method: Some(method),
            params,
            result: None,
        }
    }

    pub fn success(id: Id, result: Value) -> Self {
        Self {
            error: None,
            id: Some(id),
            jsonrpc: JSONRPC_VERSION,
            method: None,
            params: None,
            result: Some(result),
        }
    }

    pub fn failure(id: Id, error: WireError) -> Self {
        Self {
            error: Some(error),
            id: Some(id),
            jsonrpc: JSONRPC_VERSION,
            method: None,
            params: None,
            result: None,
        }
    }
}

/// Encoded form handed to `stringify`: a single envelope or an array of them
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcWire {
    Single(WireMessage),
    Batch(Vec<WireMessage>),
}

impl JsonRpcWire {
    /// Flatten into the envelopes it contains
    pub fn into_messages(self) -> Vec<WireMessage> {
        match self {
            JsonRpcWire::Single(message) => vec![message],
            JsonRpcWire::Batch(messages) => messages,
        }
    }
}
