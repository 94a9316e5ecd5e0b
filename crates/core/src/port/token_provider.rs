// Token Provider Port (redaction correlation tokens)

/// Mints opaque tokens that replace redacted error detail on the wire
pub trait TokenProvider: Send + Sync {
    fn mint(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidTokenProvider;

impl TokenProvider for UuidTokenProvider {
    fn mint(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
