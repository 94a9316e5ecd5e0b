//! JSON-RPC Codec
//!
//! Decoding is done by hand over `serde_json::Map`: a message with a wrongly
//! typed member must still yield whatever id can be salvaged, so the error
//! reply can be addressed.

use crate::error::{from_wire_error, to_wire_error};
use crate::types::{JsonRpcWire, WireMessage, JSONRPC_VERSION};
use serde_json::Value;
use std::sync::Arc;
use tether_core::domain::{Decoded, Envelope, Outbound, OutboundCall, Reply};
use tether_core::port::aggregate_settled;
use tether_core::{Codec, CodecOptions, EngineError, ErrorObject, Id, Result, TokenProvider, UuidTokenProvider};

const NULL_ID_WARNING: &str = "Using `null` as requests `id` is discouraged";

/// JSON-RPC 2.0 codec
#[derive(Clone)]
pub struct JsonRpcCodec {
    options: CodecOptions,
    tokens: Arc<dyn TokenProvider>,
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl JsonRpcCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self {
            options,
            tokens: Arc::new(UuidTokenProvider),
        }
    }

    /// Source of redaction tokens (UUID v4 by default)
    pub fn with_token_provider(mut self, tokens: impl TokenProvider + 'static) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    fn decode_message(&self, value: Value, ack_hint: Option<&Id>) -> Decoded {
        let Value::Object(mut fields) = value else {
            return rejected(Id::Null, ErrorObject::invalid_request("Invalid request"));
        };

        let id = match fields.remove("id") {
            None => None,
            Some(raw) => match Id::from_value(&raw) {
                Some(id) => Some(id),
                None => {
                    return rejected(
                        Id::Null,
                        ErrorObject::invalid_request("Invalid request").with_data(raw),
                    )
                }
            },
        };
        let salvaged = id.clone().unwrap_or(Id::Null);

        // Version first: nothing else is looked at on a foreign envelope
        match fields.remove("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            other => return rejected(salvaged, invalid_version(other)),
        }

        let method = match fields.remove("method") {
            None | Some(Value::Null) => None,
            Some(Value::String(method)) => Some(method),
            Some(other) => {
                return rejected(
                    salvaged,
                    ErrorObject::invalid_request("Invalid request").with_data(other),
                )
            }
        };

        let error = match fields.remove("error") {
            None | Some(Value::Null) => None,
            Some(raw) => match from_wire_error(&raw) {
                Some(error) => Some(error),
                None => {
                    return rejected(
                        salvaged,
                        ErrorObject::invalid_request("Invalid request").with_data(raw),
                    )
                }
            },
        };

        let has_method = method.as_deref().is_some_and(|m| !m.is_empty());
        if has_method && matches!(id, Some(Id::Null)) {
            self.options.warn(NULL_ID_WARNING);
        }

        // A JSON-RPC `id` names a new call when there is a method, else the
        // request being answered
        let (id, ack) = if has_method {
            (id, None)
        } else {
            (None, id.or_else(|| ack_hint.cloned()))
        };

        Decoded::Message(Envelope {
            id,
            ack,
            method,
            params: fields.remove("params"),
            result: fields.remove("result"),
            error,
        })
    }

    fn encode_reply(&self, reply: Reply) -> Result<JsonRpcWire> {
        let Reply {
            ack,
            outcome,
            followups,
        } = reply;

        let message = match (ack, outcome) {
            (None, Err(error)) => return Err(EngineError::NotificationFailed(error)),
            (None, Ok(_)) => {
                return Err(EngineError::Encoding(
                    "successful reply needs an id".to_string(),
                ))
            }
            (Some(id), Ok(result)) => WireMessage::success(id, result),
            (Some(id), Err(error)) => {
                WireMessage::failure(id, to_wire_error(error, &self.options, self.tokens.as_ref()))
            }
        };

        if followups.is_empty() {
            return Ok(JsonRpcWire::Single(message));
        }

        let mut messages = vec![message];
        messages.extend(followups.into_iter().map(encode_call));
        Ok(JsonRpcWire::Batch(messages))
    }
}

impl Codec for JsonRpcCodec {
    type Wire = JsonRpcWire;

    fn decode(&self, raw: &str, ack: Option<&Id>) -> Decoded {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => return rejected(Id::Null, ErrorObject::parse_error(err.to_string())),
        };

        match value {
            Value::Array(items) if items.is_empty() => {
                rejected(Id::Null, ErrorObject::invalid_request("Empty batch"))
            }
            Value::Array(items) => Decoded::Batch(
                items
                    .into_iter()
                    .map(|item| self.decode_message(item, ack))
                    .collect(),
            ),
            value => self.decode_message(value, ack),
        }
    }

    fn encode(&self, outbound: Outbound) -> Result<JsonRpcWire> {
        match outbound {
            Outbound::Call(call) => Ok(JsonRpcWire::Single(encode_call(call))),
            Outbound::Reply(reply) => self.encode_reply(reply),
        }
    }

    fn encode_batch(&self, items: Vec<JsonRpcWire>) -> Result<JsonRpcWire> {
        Ok(JsonRpcWire::Batch(
            items.into_iter().flat_map(JsonRpcWire::into_messages).collect(),
        ))
    }

    fn stringify(&self, wire: &JsonRpcWire) -> Result<String> {
        Ok(serde_json::to_string(wire)?)
    }

    fn aggregate_results(
        &self,
        settled: Vec<Result<Option<JsonRpcWire>>>,
    ) -> Result<Option<JsonRpcWire>> {
        match aggregate_settled(settled)? {
            Some(replies) => self.encode_batch(replies).map(Some),
            None => Ok(None),
        }
    }
}

fn encode_call(outbound: OutboundCall) -> WireMessage {
    let OutboundCall { id, call } = outbound;
    WireMessage::call(id, call.method, call.params)
}

fn rejected(ack: Id, error: ErrorObject) -> Decoded {
    Decoded::Rejected {
        ack: Some(ack),
        error,
    }
}

fn invalid_version(found: Option<Value>) -> ErrorObject {
    match found {
        None => ErrorObject::invalid_request("Invalid JsonRPC version 'undefined'"),
        Some(value) => {
            let shown = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            ErrorObject::invalid_request(format!("Invalid JsonRPC version '{}'", shown))
                .with_data(value)
        }
    }
}
