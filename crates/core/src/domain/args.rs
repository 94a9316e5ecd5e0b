// Call Arguments (caller side)

use serde_json::Value;

/// Positional arguments of an outbound call.
///
/// `None` marks an undefined argument. Trailing undefined arguments are
/// stripped before the call is encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Option<Value>>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.0.push(Some(value.into()));
        self
    }

    /// Append an undefined argument
    pub fn undefined(mut self) -> Self {
        self.0.push(None);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply the object/array calling convention and produce wire params.
    ///
    /// - no arguments: no params at all
    /// - a single object or array argument: passed through unwrapped
    /// - anything else: the arguments as an array (inner undefined become null)
    pub fn into_params(self) -> Option<Value> {
        let mut args = self.0;
        while matches!(args.last(), Some(None)) {
            args.pop();
        }

        match args.len() {
            0 => None,
            1 if matches!(args[0], Some(Value::Object(_)) | Some(Value::Array(_))) => {
                args.pop().flatten()
            }
            _ => Some(Value::Array(
                args.into_iter().map(|a| a.unwrap_or(Value::Null)).collect(),
            )),
        }
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<Value>>> for Args {
    fn from(values: Vec<Option<Value>>) -> Self {
        Self(values)
    }
}

impl From<Value> for Args {
    fn from(value: Value) -> Self {
        Self(vec![Some(value)])
    }
}

impl From<()> for Args {
    fn from(_: ()) -> Self {
        Self::new()
    }
}

/// Build [`Args`] from JSON-convertible expressions.
///
/// ```
/// use tether_core::args;
/// use serde_json::json;
///
/// let args = args![1, "two", json!({"three": 3})];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::domain::Args::new()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::domain::Args::from(vec![$(::serde_json::json!($arg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_args_means_no_params() {
        assert_eq!(Args::new().into_params(), None);
    }

    #[test]
    fn test_trailing_undefined_are_stripped() {
        let args = Args::new().arg("a").undefined().undefined();
        assert_eq!(args.into_params(), Some(json!(["a"])));

        let args = Args::new().undefined();
        assert_eq!(args.into_params(), None);
    }

    #[test]
    fn test_inner_undefined_becomes_null() {
        let args = Args::new().arg(1).undefined().arg(3);
        assert_eq!(args.into_params(), Some(json!([1, null, 3])));
    }

    #[test]
    fn test_single_object_or_array_is_unwrapped() {
        assert_eq!(
            Args::from(json!({"a": 1})).into_params(),
            Some(json!({"a": 1}))
        );
        assert_eq!(Args::from(json!(["bar"])).into_params(), Some(json!(["bar"])));
    }

    #[test]
    fn test_single_scalar_is_wrapped() {
        assert_eq!(Args::from(json!("bar")).into_params(), Some(json!(["bar"])));
        assert_eq!(Args::from(json!(null)).into_params(), Some(json!([null])));
    }

    #[test]
    fn test_args_macro() {
        let args = crate::args![1, "x", json!({"k": true})];
        assert_eq!(args.into_params(), Some(json!([1, "x", {"k": true}])));
        assert!(crate::args![].is_empty());
    }
}
