// Logical Codec
//
// The engine's own message shape as JSON. Responses name the request they
// settle in `ack`, new calls carry their own `id`, so one object can do both.
//
//   {"id": 3, "method": "sum", "params": [1, 2]}
//   {"ack": 3, "result": 3}
//   {"ack": 3, "result": 3, "id": 0, "method": "progress"}

use crate::domain::{
    Decoded, Envelope, ErrorData, ErrorObject, Id, Outbound, OutboundCall, Reply,
};
use crate::error::Result;
use crate::port::{aggregate_settled, Codec};
use serde_json::{json, Map, Value};

/// Engine-to-engine codec supporting multiplexed response + call messages
#[derive(Debug, Clone, Default)]
pub struct LogicalCodec;

impl LogicalCodec {
    pub fn new() -> Self {
        Self
    }

    fn decode_value(&self, value: Value, ack_hint: Option<&Id>) -> Decoded {
        let Value::Object(mut fields) = value else {
            return Decoded::Rejected {
                ack: None,
                error: ErrorObject::invalid_request("Message is not an object"),
            };
        };

        let id = match take_id(&mut fields, "id") {
            Ok(id) => id,
            Err(error) => return Decoded::Rejected { ack: None, error },
        };
        let ack = match take_id(&mut fields, "ack") {
            Ok(ack) => ack.or_else(|| ack_hint.cloned()),
            Err(error) => return Decoded::Rejected { ack: id, error },
        };

        let method = match fields.remove("method") {
            None | Some(Value::Null) => None,
            Some(Value::String(method)) => Some(method),
            Some(_) => {
                return Decoded::Rejected {
                    ack: id,
                    error: ErrorObject::invalid_request("`method` must be a string"),
                }
            }
        };

        let error = match fields.remove("error") {
            None | Some(Value::Null) => None,
            Some(value) => match error_from_value(value) {
                Some(error) => Some(error),
                None => {
                    return Decoded::Rejected {
                        ack: id,
                        error: ErrorObject::invalid_request("Malformed `error` member"),
                    }
                }
            },
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

    fn encode_call(&self, outbound: OutboundCall) -> Map<String, Value> {
        let OutboundCall { id, call } = outbound;
        let mut fields = Map::new();
        if let Some(id) = id {
            fields.insert("id".into(), id.to_value());
        }
        fields.insert("method".into(), Value::String(call.method));
        if let Some(params) = call.params {
            fields.insert("params".into(), params);
        }
        fields
    }

    fn encode_reply(&self, reply: Reply) -> Value {
        let Reply {
            ack,
            outcome,
            followups,
        } = reply;

        let mut fields = Map::new();
        fields.insert("ack".into(), ack.unwrap_or(Id::Null).to_value());
        match outcome {
            Ok(result) => fields.insert("result".into(), result),
            Err(error) => fields.insert("error".into(), error_to_value(error)),
        };

        // The first follow-up rides in the reply itself, the rest alongside
        let mut followups = followups.into_iter();
        if let Some(first) = followups.next() {
            fields.extend(self.encode_call(first));
        }

        let rest: Vec<Value> = followups
            .map(|call| Value::Object(self.encode_call(call)))
            .collect();
        if rest.is_empty() {
            Value::Object(fields)
        } else {
            let mut items = vec![Value::Object(fields)];
            items.extend(rest);
            Value::Array(items)
        }
    }
}

impl Codec for LogicalCodec {
    type Wire = Value;

    fn decode(&self, raw: &str, ack: Option<&Id>) -> Decoded {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                return Decoded::Rejected {
                    ack: Some(Id::Null),
                    error: ErrorObject::parse_error(err.to_string()),
                }
            }
        };

        match value {
            Value::Array(items) if items.is_empty() => Decoded::Rejected {
                ack: Some(Id::Null),
                error: ErrorObject::invalid_request("Empty batch"),
            },
            Value::Array(items) => Decoded::Batch(
                items
                    .into_iter()
                    .map(|item| self.decode_value(item, ack))
                    .collect(),
            ),
            value => self.decode_value(value, ack),
        }
    }

    fn encode(&self, outbound: Outbound) -> Result<Value> {
        Ok(match outbound {
            Outbound::Call(call) => Value::Object(self.encode_call(call)),
            Outbound::Reply(reply) => self.encode_reply(reply),
        })
    }

    fn encode_batch(&self, items: Vec<Value>) -> Result<Value> {
        Ok(Value::Array(flatten(items)))
    }

    fn stringify(&self, wire: &Value) -> Result<String> {
        Ok(serde_json::to_string(wire)?)
    }

    fn aggregate_results(&self, settled: Vec<Result<Option<Value>>>) -> Result<Option<Value>> {
        Ok(aggregate_settled(settled)?.map(|replies| Value::Array(flatten(replies))))
    }
}

fn flatten(items: Vec<Value>) -> Vec<Value> {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    flat
}

fn take_id(fields: &mut Map<String, Value>, key: &str) -> std::result::Result<Option<Id>, ErrorObject> {
    match fields.remove(key) {
        None => Ok(None),
        Some(value) => Id::from_value(&value)
            .map(Some)
            .ok_or_else(|| ErrorObject::invalid_request(format!("`{}` must be a string, integer or null", key))),
    }
}

fn error_from_value(value: Value) -> Option<ErrorObject> {
    let Value::Object(mut fields) = value else {
        return None;
    };
    let code = fields.get("code")?.as_i64()?;
    let message = fields.get("message")?.as_str()?.to_string();

    let error = ErrorObject::new(code, message);
    Some(match fields.remove("data") {
        None => error,
        Some(data) => error.with_data(data),
    })
}

// Peers on a logical link are trusted: faults go out in full
fn error_to_value(error: ErrorObject) -> Value {
    let mut fields = Map::new();
    fields.insert("code".into(), Value::from(error.code));
    fields.insert("message".into(), Value::String(error.message));
    match error.data {
        None => {}
        Some(ErrorData::Value(data)) => {
            fields.insert("data".into(), data);
        }
        Some(ErrorData::Fault(fault)) => {
            fields.insert(
                "data".into(),
                json!({"name": fault.name, "message": fault.message, "trace": fault.trace}),
            );
        }
    }
    Value::Object(fields)
}
