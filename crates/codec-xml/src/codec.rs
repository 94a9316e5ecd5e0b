//! XML-RPC Codec
//!
//! Every XML-RPC call gets a response, so inbound calls are always decoded
//! as requests: keyed by the transport's ack hint, or by the null id.

use crate::error::StructureError;
use crate::node::{DocumentParser, QuickXmlParser, XmlNode};
use crate::value::{from_xml, write_value};
use quick_xml::escape::escape;
use serde_json::{json, Value};
use std::sync::Arc;
use tether_core::domain::{code, Decoded, Envelope, Outbound, OutboundCall, Reply};
use tether_core::port::aggregate_settled;
use tether_core::{Codec, EngineError, ErrorObject, Id, Result};
use tracing::debug;

const XML_DECLARATION: &str = r#"<?xml version="1.0"?>"#;
const MULTICALL: &str = "system.multicall";

const PARSE_ERROR_MESSAGE: &str = "parse error. not well formed";
const INVALID_MESSAGE: &str = "server error. invalid xml-rpc. not conforming to spec.";

/// Encoded XML-RPC document, rendered by `stringify`
#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcMessage {
    Call { method: String, params: Vec<Value> },
    Success(Value),
    Fault { code: i64, message: String },
}

impl XmlRpcMessage {
    fn render(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        match self {
            XmlRpcMessage::Call { method, params } => {
                out.push_str("<methodCall><methodName>");
                out.push_str(&escape(method.as_str()));
                out.push_str("</methodName>");
                if !params.is_empty() {
                    out.push_str("<params>");
                    for param in params {
                        out.push_str("<param>");
                        write_value(&mut out, param);
                        out.push_str("</param>");
                    }
                    out.push_str("</params>");
                }
                out.push_str("</methodCall>");
            }
            XmlRpcMessage::Success(result) => {
                out.push_str("<methodResponse><params><param>");
                write_value(&mut out, result);
                out.push_str("</param></params></methodResponse>");
            }
            XmlRpcMessage::Fault { code, message } => {
                out.push_str("<methodResponse><fault>");
                write_value(&mut out, &fault_struct(*code, message));
                out.push_str("</fault></methodResponse>");
            }
        }
        out
    }
}

/// XML-RPC codec
#[derive(Clone)]
pub struct XmlRpcCodec {
    parser: Arc<dyn DocumentParser>,
}

impl Default for XmlRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlRpcCodec {
    pub fn new() -> Self {
        Self::with_parser(QuickXmlParser)
    }

    pub fn with_parser(parser: impl DocumentParser + 'static) -> Self {
        Self {
            parser: Arc::new(parser),
        }
    }

    fn decode_document(&self, root: &XmlNode, ack: Id) -> std::result::Result<Decoded, StructureError> {
        match root.name.as_str() {
            "methodCall" => {
                let method = root
                    .child("methodName")
                    .ok_or(StructureError::MissingNode("methodName"))?
                    .text
                    .trim()
                    .to_string();
                let params = decode_params(root)?;

                if method == MULTICALL {
                    return decode_multicall(params);
                }
                Ok(Decoded::Message(call_envelope(ack, method, params)))
            }
            "methodResponse" => {
                let mut envelope = Envelope {
                    ack: Some(ack),
                    ..Envelope::default()
                };
                if let Some(fault) = root.child("fault") {
                    envelope.error = Some(decode_fault(fault)?);
                } else {
                    let mut params = decode_params(root)?;
                    if params.len() != 1 {
                        return Err(StructureError::MissingNode("param"));
                    }
                    envelope.result = params.pop();
                }
                Ok(Decoded::Message(envelope))
            }
            other => Err(StructureError::UnknownNode(other.to_string())),
        }
    }
}

impl Codec for XmlRpcCodec {
    type Wire = XmlRpcMessage;

    fn decode(&self, raw: &str, ack: Option<&Id>) -> Decoded {
        let ack = ack.cloned().unwrap_or(Id::Null);

        let root = match self.parser.parse(raw) {
            Ok(root) => root,
            Err(err) => {
                return Decoded::Rejected {
                    ack: Some(ack),
                    error: ErrorObject::new(code::PARSE_ERROR, PARSE_ERROR_MESSAGE)
                        .with_data(Value::String(err.to_string())),
                }
            }
        };

        self.decode_document(&root, ack.clone())
            .unwrap_or_else(|err| Decoded::Rejected {
                ack: Some(ack),
                error: ErrorObject::new(code::INVALID_REQUEST, INVALID_MESSAGE)
                    .with_data(Value::String(err.to_string())),
            })
    }

    fn encode(&self, outbound: Outbound) -> Result<XmlRpcMessage> {
        match outbound {
            Outbound::Call(OutboundCall { call, .. }) => Ok(XmlRpcMessage::Call {
                params: call.positional_params(),
                method: call.method,
            }),
            Outbound::Reply(Reply { followups, .. }) if !followups.is_empty() => Err(
                EngineError::Unsupported("follow-up calls in an XML-RPC response".into()),
            ),
            Outbound::Reply(Reply { outcome, .. }) => Ok(match outcome {
                Ok(result) => XmlRpcMessage::Success(result),
                Err(error) => {
                    if let Some(fault) = error.fault() {
                        debug!(code = error.code, fault = %fault, "Fault detail not sent over XML-RPC");
                    }
                    XmlRpcMessage::Fault {
                        code: error.code,
                        message: error.message,
                    }
                }
            }),
        }
    }

    fn encode_batch(&self, _items: Vec<XmlRpcMessage>) -> Result<XmlRpcMessage> {
        Err(EngineError::Unsupported(
            "generic batches in XML-RPC, use MulticallBatch".into(),
        ))
    }

    fn stringify(&self, wire: &XmlRpcMessage) -> Result<String> {
        Ok(wire.render())
    }

    /// Render the `system.multicall` response: `[result]` per successful
    /// call, a fault struct per failed one
    fn aggregate_results(
        &self,
        settled: Vec<Result<Option<XmlRpcMessage>>>,
    ) -> Result<Option<XmlRpcMessage>> {
        let settled = settled
            .into_iter()
            .map(|outcome| match outcome {
                Ok(Some(XmlRpcMessage::Success(result))) => Ok(Some(json!([result]))),
                Ok(Some(XmlRpcMessage::Fault { code, message })) => Ok(Some(fault_struct(code, &message))),
                Ok(Some(XmlRpcMessage::Call { .. })) => Err(EngineError::Unsupported(
                    "calls inside a multicall response".into(),
                )),
                Ok(None) => Ok(None),
                Err(err) => Ok(Some(fault_struct(code::INVALID_REQUEST, &err.to_string()))),
            })
            .collect();

        Ok(aggregate_settled(settled)?.map(|results| XmlRpcMessage::Success(Value::Array(results))))
    }
}

fn call_envelope(id: Id, method: String, params: Vec<Value>) -> Envelope {
    Envelope {
        id: Some(id),
        method: Some(method),
        params: (!params.is_empty()).then_some(Value::Array(params)),
        ..Envelope::default()
    }
}

fn decode_params(parent: &XmlNode) -> std::result::Result<Vec<Value>, StructureError> {
    let Some(params) = parent.child("params") else {
        return Ok(Vec::new());
    };

    params
        .children
        .iter()
        .map(|param| {
            if param.name != "param" {
                return Err(StructureError::UnknownNode(param.name.clone()));
            }
            let value = param
                .child("value")
                .ok_or(StructureError::MissingNode("value"))?;
            from_xml(value)
        })
        .collect()
}

fn decode_fault(fault: &XmlNode) -> std::result::Result<ErrorObject, StructureError> {
    let value = fault
        .child("value")
        .ok_or(StructureError::MissingNode("value"))?;
    let fields = from_xml(value)?;

    let code = fields
        .get("faultCode")
        .and_then(Value::as_i64)
        .ok_or(StructureError::MissingNode("faultCode"))?;
    let message = fields
        .get("faultString")
        .and_then(Value::as_str)
        .ok_or(StructureError::MissingNode("faultString"))?;
    Ok(ErrorObject::new(code, message))
}

/// Each entry of the single array param becomes one batch element keyed by
/// the null id, so every entry is answered in order
fn decode_multicall(params: Vec<Value>) -> std::result::Result<Decoded, StructureError> {
    let entries = match params.as_slice() {
        [Value::Array(entries)] => entries,
        _ => {
            return Err(StructureError::InvalidMulticall(
                "expected one array param".into(),
            ))
        }
    };

    let items = entries
        .iter()
        .map(|entry| match multicall_entry(entry) {
            Ok((method, params)) => Decoded::Message(call_envelope(Id::Null, method, params)),
            Err(err) => Decoded::Rejected {
                ack: Some(Id::Null),
                error: ErrorObject::new(code::INVALID_REQUEST, INVALID_MESSAGE)
                    .with_data(Value::String(err.to_string())),
            },
        })
        .collect();
    Ok(Decoded::Batch(items))
}

fn multicall_entry(entry: &Value) -> std::result::Result<(String, Vec<Value>), StructureError> {
    let method = entry
        .get("methodName")
        .and_then(Value::as_str)
        .ok_or_else(|| StructureError::InvalidMulticall("missing methodName".into()))?;
    let params = match entry.get("params") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(params)) => params.clone(),
        Some(_) => {
            return Err(StructureError::InvalidMulticall(
                "params must be an array".into(),
            ))
        }
    };
    Ok((method.to_string(), params))
}

fn fault_struct(code: i64, message: &str) -> Value {
    json!({"faultCode": code, "faultString": message})
}
