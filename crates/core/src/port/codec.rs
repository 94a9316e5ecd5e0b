// Codec Port
//
// The engine's dispatch is wire-format independent; everything that knows
// about a concrete encoding lives behind this trait.

use crate::domain::{Decoded, Envelope, Id, Message, Outbound};
use crate::error::{EngineError, Result};
use tracing::warn;

/// Wire format contract
///
/// Implementations:
/// - `LogicalCodec`: the engine's native shape as JSON (this crate)
/// - `JsonRpcCodec`: JSON-RPC 2.0 (tether-codec-json)
/// - `XmlRpcCodec`: XML-RPC (tether-codec-xml)
pub trait Codec: Send + Sync + 'static {
    /// Encoded, not yet stringified message
    type Wire: Send + 'static;

    /// Lift raw input into envelopes.
    ///
    /// `ack` is an out-of-band correlation hint for wire formats that do not
    /// carry ids (e.g. one response per HTTP exchange). Structural failures
    /// are returned as `Decoded::Rejected`, never as errors.
    fn decode(&self, raw: &str, ack: Option<&Id>) -> Decoded;

    /// Check an envelope and classify it
    ///
    /// # Errors
    /// - EngineError::InvalidMessage if it has neither method nor ack
    /// - EngineError::MalformedResponse for a null-id response
    fn validate(&self, envelope: Envelope) -> Result<Message> {
        envelope.classify()
    }

    /// Encode one logical message
    ///
    /// # Errors
    /// - EngineError::NotificationFailed if the wire format cannot address
    ///   an error reply without an id
    fn encode(&self, outbound: Outbound) -> Result<Self::Wire>;

    /// Combine encoded calls into one multi-call envelope
    fn encode_batch(&self, items: Vec<Self::Wire>) -> Result<Self::Wire>;

    /// Render an encoded message as text
    fn stringify(&self, wire: &Self::Wire) -> Result<String>;

    /// Decide the reply for an inbound batch once every element settled.
    ///
    /// Each element is `Ok(Some(_))` for a reply to send, `Ok(None)` for a
    /// silently processed notification, `Err(_)` for a local failure.
    fn aggregate_results(&self, settled: Vec<Result<Option<Self::Wire>>>)
        -> Result<Option<Self::Wire>>;
}

/// Standard aggregation policy for array-shaped batches
///
/// - any element produced a reply: the ordered replies only
/// - otherwise, any element failed: one local `BatchFailed` error
/// - otherwise: no reply
pub fn aggregate_settled<W>(settled: Vec<Result<Option<W>>>) -> Result<Option<Vec<W>>> {
    let mut replies = Vec::new();
    let mut failures = Vec::new();

    for outcome in settled {
        match outcome {
            Ok(Some(reply)) => replies.push(reply),
            Ok(None) => {}
            Err(err) => failures.push(err),
        }
    }

    if !replies.is_empty() {
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                replied = replies.len(),
                "Dropping local failures of batch elements"
            );
        }
        return Ok(Some(replies));
    }

    if !failures.is_empty() {
        return Err(EngineError::BatchFailed(failures));
    }

    Ok(None)
}
