//! XML-RPC Values
//!
//! `<value>` elements map onto JSON values. Types with no JSON counterpart
//! (`dateTime.iso8601`, `base64`) are kept as their text.

use crate::error::StructureError;
use crate::node::XmlNode;
use quick_xml::escape::escape;
use serde_json::{Map, Number, Value};

/// Decode the content of a `<value>` element
pub fn from_xml(value: &XmlNode) -> Result<Value, StructureError> {
    if value.name != "value" {
        return Err(StructureError::UnknownNode(value.name.clone()));
    }

    let typed = match value.children.as_slice() {
        // Untyped content is a string
        [] => return Ok(Value::String(value.text.clone())),
        [typed] => typed,
        [_, extra, ..] => return Err(StructureError::UnknownNode(extra.name.clone())),
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("int", text)),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean", text)),
        },
        "double" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("double", text)),
        "string" => Ok(Value::String(typed.text.clone())),
        "dateTime.iso8601" | "base64" => Ok(Value::String(text.to_string())),
        "nil" => Ok(Value::Null),
        "array" => {
            let data = typed
                .child("data")
                .ok_or(StructureError::MissingNode("data"))?;
            data.children
                .iter()
                .map(from_xml)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut fields = Map::new();
            for member in &typed.children {
                if member.name != "member" {
                    return Err(StructureError::UnknownNode(member.name.clone()));
                }
                let name = member
                    .child("name")
                    .ok_or(StructureError::MissingNode("name"))?;
                let value = member
                    .child("value")
                    .ok_or(StructureError::MissingNode("value"))?;
                fields.insert(name.text.clone(), from_xml(value)?);
            }
            Ok(Value::Object(fields))
        }
        other => Err(StructureError::UnknownNode(other.to_string())),
    }
}

/// Render `value` as a `<value>` element
pub fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => push_element(out, "i4", &i.to_string()),
            Some(i) => push_element(out, "i8", &i.to_string()),
            None => push_element(out, "double", &n.to_string()),
        },
        Value::String(s) => push_element(out, "string", &escape(s.as_str())),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Object(fields) => {
            out.push_str("<struct>");
            for (name, item) in fields {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                write_value(out, item);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn push_element(out: &mut String, name: &str, text: &str) {
    out.push('<');
    out.push_str(name);
    out.push('>');
    out.push_str(text);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn invalid(kind: &'static str, text: &str) -> StructureError {
    StructureError::InvalidValue {
        kind,
        text: text.to_string(),
    }
}
