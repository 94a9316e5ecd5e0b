// Port Layer - Interfaces for external collaborators

pub mod codec;
pub mod token_provider;
pub mod transport;

// Re-exports
pub use codec::{aggregate_settled, Codec};
pub use token_provider::{TokenProvider, UuidTokenProvider};
pub use transport::Transport;

#[cfg(test)]
pub use transport::MockTransport;
