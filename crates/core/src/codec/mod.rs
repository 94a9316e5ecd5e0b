// Built-in Codecs

pub mod logical;

pub use logical::LogicalCodec;
