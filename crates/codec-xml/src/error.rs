//! XML-RPC Error Types

use thiserror::Error;

/// The document itself could not be read
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlParseError {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Document has no root element")]
    MissingRoot,

    #[error("Unexpected content outside the root element")]
    TrailingContent,
}

impl From<quick_xml::Error> for XmlParseError {
    fn from(err: quick_xml::Error) -> Self {
        XmlParseError::Malformed(err.to_string())
    }
}

/// Well-formed XML that is not a valid XML-RPC message
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Missing node '{0}'")]
    MissingNode(&'static str),

    #[error("Invalid {kind} value '{text}'")]
    InvalidValue { kind: &'static str, text: String },

    #[error("Invalid system.multicall entry: {0}")]
    InvalidMulticall(String),
}
