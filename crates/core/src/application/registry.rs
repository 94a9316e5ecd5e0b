// Method Registry
//
// Name-keyed table of handlers. Nested namespaces form a tree; dotted names
// resolve through it.

use super::CallContext;
use crate::domain::HandlerError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A callable exposed to the peer
///
/// Implementations:
/// - FnMethod: wraps an async closure (see [`method_fn`])
/// - any user type with custom validation
#[async_trait]
pub trait Method: Send + Sync {
    /// Execute the method with positional params
    ///
    /// # Errors
    /// - HandlerError::Coded is forwarded verbatim
    /// - HandlerError::Failed is replied with code -32500
    async fn call(&self, cx: CallContext, params: Vec<Value>) -> Result<Value, HandlerError>;

    /// Pre-execution parameter check
    ///
    /// # Errors
    /// - HandlerError::Failed is replied with code -32602
    async fn validate_params(&self, _params: &[Value]) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Synchronous parameter validator attached to a [`FnMethod`]
pub type Validator = Box<dyn Fn(&[Value]) -> Result<(), HandlerError> + Send + Sync>;

/// Closure-backed [`Method`]
pub struct FnMethod<F> {
    handler: F,
    validator: Option<Validator>,
}

/// Wrap an async closure as a method
///
/// # Example
/// ```
/// use tether_core::application::{method_fn, Registry};
/// use serde_json::json;
///
/// let methods = Registry::new()
///     .register("foo", method_fn(|_cx, _params| async { Ok(json!("bar")) }));
/// assert!(methods.resolve("foo").is_some());
/// ```
pub fn method_fn<F, Fut>(handler: F) -> FnMethod<F>
where
    F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnMethod {
        handler,
        validator: None,
    }
}

impl<F> FnMethod<F> {
    pub fn with_validator(
        mut self,
        validator: impl Fn(&[Value]) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }
}

#[async_trait]
impl<F, Fut> Method for FnMethod<F>
where
    F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn call(&self, cx: CallContext, params: Vec<Value>) -> Result<Value, HandlerError> {
        (self.handler)(cx, params).await
    }

    async fn validate_params(&self, params: &[Value]) -> Result<(), HandlerError> {
        match &self.validator {
            Some(validator) => validator(params),
            None => Ok(()),
        }
    }
}

/// Deserialize positional params into a typed value (tuple or struct).
///
/// Deserialization failures become `-32602 Invalid params`.
pub fn parse_params<T: DeserializeOwned>(params: Vec<Value>) -> Result<T, HandlerError> {
    Ok(serde_json::from_value(Value::Array(params))?)
}

#[derive(Clone)]
enum Entry {
    Method(Arc<dyn Method>),
    Namespace(Registry),
}

/// Nested method registry
#[derive(Clone, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method under `name` (builder style)
    pub fn register(mut self, name: impl Into<String>, method: impl Method + 'static) -> Self {
        self.insert(name, Arc::new(method));
        self
    }

    /// Add a nested registry resolved through `name.` prefixes
    pub fn namespace(mut self, name: impl Into<String>, registry: Registry) -> Self {
        self.entries.insert(name.into(), Entry::Namespace(registry));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, method: Arc<dyn Method>) {
        self.entries.insert(name.into(), Entry::Method(method));
    }

    /// Resolve a possibly dotted name.
    ///
    /// An exact key wins; otherwise each `.` is tried as the boundary
    /// between a namespace key and the rest of the name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Method>> {
        if let Some(Entry::Method(method)) = self.entries.get(name) {
            return Some(method.clone());
        }

        name.match_indices('.').find_map(|(at, _)| {
            match self.entries.get(&name[..at]) {
                Some(Entry::Namespace(nested)) => nested.resolve(&name[at + 1..]),
                _ => None,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("entries", &names).finish()
    }
}
