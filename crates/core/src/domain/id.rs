// Message Identifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id of a request and of the response acknowledging it.
///
/// Ids allocated by the engine are always `Number`; peers may use strings.
/// `Null` is the null-id sentinel used when no id could be salvaged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Str(String),
    Null,
}

impl Id {
    pub fn is_null(&self) -> bool {
        matches!(self, Id::Null)
    }

    /// Interpret a loosely-typed JSON value as an id.
    ///
    /// Returns `None` for values that cannot address a request
    /// (floats, booleans, arrays, objects).
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Id::Null),
            serde_json::Value::String(s) => Some(Id::Str(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(Id::Number),
            _ => None,
        }
    }

    /// Numeric reading of a string id: peers may echo `0` back as `"0"`
    pub fn as_numeric(&self) -> Option<Id> {
        match self {
            Id::Str(s) => s.trim().parse().ok().map(Id::Number),
            _ => None,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Id::Number(n) => serde_json::Value::from(*n),
            Id::Str(s) => serde_json::Value::String(s.clone()),
            Id::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{}", n),
            Id::Str(s) => write!(f, "{}", s),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Str(s.to_string())
    }
}
