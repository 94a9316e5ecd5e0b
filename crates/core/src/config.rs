// Engine & Codec Configuration

use std::fmt;
use std::sync::Arc;

const ENV_LOG_MESSAGES: &str = "TETHER_LOG_MESSAGES";
const ENV_SEND_FULL_ERRORS: &str = "TETHER_SEND_FULL_ERRORS";

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Echo every inbound and outbound payload at info level
    pub log_messages: bool,
}

impl EngineConfig {
    /// Read configuration from the environment
    ///
    /// # Environment Variables
    /// - `TETHER_LOG_MESSAGES`: `1|true|yes|on` enables payload echo
    pub fn from_env() -> Self {
        Self {
            log_messages: env_flag(ENV_LOG_MESSAGES).unwrap_or(false),
        }
    }
}

/// Sink for discouraged-but-accepted protocol patterns
pub type WarnHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Options shared by wire codecs
#[derive(Clone)]
pub struct CodecOptions {
    /// Send internal failure detail instead of a correlation token
    pub send_full_errors: bool,
    pub on_warn: WarnHook,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            send_full_errors: false,
            on_warn: Arc::new(|message| tracing::warn!("{}", message)),
        }
    }
}

impl CodecOptions {
    /// Read configuration from the environment
    ///
    /// # Environment Variables
    /// - `TETHER_SEND_FULL_ERRORS`: `1|true|yes|on` disables redaction
    pub fn from_env() -> Self {
        Self {
            send_full_errors: env_flag(ENV_SEND_FULL_ERRORS).unwrap_or(false),
            ..Self::default()
        }
    }

    pub fn send_full_errors(mut self, enabled: bool) -> Self {
        self.send_full_errors = enabled;
        self
    }

    pub fn on_warn(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_warn = Arc::new(hook);
        self
    }

    pub fn warn(&self, message: &str) {
        (self.on_warn)(message)
    }
}

impl fmt::Debug for CodecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecOptions")
            .field("send_full_errors", &self.send_full_errors)
            .finish_non_exhaustive()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|value| parse_flag(&value))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
