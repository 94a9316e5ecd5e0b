//! Wire Error Mapping
//!
//! Converts engine error objects to JSON-RPC error members, applying the
//! redaction policy to internal faults.

use crate::types::WireError;
use serde_json::{json, Map, Value};
use tether_core::{CodecOptions, ErrorData, ErrorObject, Fault, TokenProvider};
use tracing::error;

/// Convert an ErrorObject to its wire form.
///
/// Fault detail is sent only in full-error mode; otherwise it is replaced by
/// a fresh token, and the fault is logged under that token.
pub fn to_wire_error(err: ErrorObject, options: &CodecOptions, tokens: &dyn TokenProvider) -> WireError {
    let ErrorObject {
        code,
        message,
        data,
    } = err;

    let data = data.map(|data| match data {
        ErrorData::Value(value) => value,
        ErrorData::Fault(fault) if options.send_full_errors => fault_to_value(fault),
        ErrorData::Fault(fault) => {
            let token = tokens.mint();
            error!(
                token = %token,
                code,
                name = %fault.name,
                reason = %fault.message,
                trace = ?fault.trace,
                "Redacted failure sent to peer"
            );
            Value::String(token)
        }
    });

    WireError {
        code,
        data,
        message,
    }
}

/// Parse an incoming `error` member.
///
/// `code` must be an integer and `message` a string.
pub fn from_wire_error(value: &Value) -> Option<ErrorObject> {
    let fields = value.as_object()?;
    let code = fields.get("code")?.as_i64()?;
    let message = fields.get("message")?.as_str()?;

    let error = ErrorObject::new(code, message);
    Some(match fields.get("data") {
        None => error,
        Some(data) => error.with_data(data.clone()),
    })
}

fn fault_to_value(fault: Fault) -> Value {
    let Fault {
        name,
        message,
        trace,
    } = fault;
    let mut fields = Map::new();
    fields.insert("message".into(), json!(message));
    fields.insert("name".into(), json!(name));
    fields.insert("trace".into(), json!(trace));
    Value::Object(fields)
}
