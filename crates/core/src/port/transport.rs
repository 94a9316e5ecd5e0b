// Transport Port
//
// The engine never opens sockets: it hands fully stringified payloads to
// whatever delivers them and ignores the outcome.

/// Outbound delivery of serialized messages
///
/// Implemented for any `Fn(&str) + Send + Sync` closure.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    fn send(&self, payload: &str);
}

impl<F> Transport for F
where
    F: Fn(&str) + Send + Sync,
{
    fn send(&self, payload: &str) {
        self(payload)
    }
}
