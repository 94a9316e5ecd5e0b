// Domain Layer - logical messages, ids and error objects

pub mod args;
pub mod error;
pub mod id;
pub mod message;

// Re-exports
pub use args::Args;
pub use error::{code, ErrorData, ErrorObject, Fault, HandlerError};
pub use id::Id;
pub use message::{Call, Decoded, Envelope, Message, Outbound, OutboundCall, Reply, Response};
