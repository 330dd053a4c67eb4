//! The dynamic data model templates are evaluated against.
//!
//! [`Value`] is used both as the input context and as every intermediate and
//! final result of evaluation. Coercions are deliberately fuzzy: templates are
//! written against loosely-typed data, so `1`, `"1"` and `true` compare equal.

use core::fmt;
use core::future::Future;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};

use crate::error::Result;

/// Map payload of [`Value::Map`]. Insertion order is irrelevant.
pub type Map = HashMap<String, Value>;

/// A runtime value in the template
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    Map(Map),
    /// A value that is still being computed, typically by a tag handler.
    Pending(PendingValue),
    /// A value computed on first resolution.
    Lazy(LazyValue),
}

/// Handle to a value that is not available yet.
///
/// The handle is cheap to clone; every clone observes the same result.
#[derive(Clone)]
pub struct PendingValue {
    future: Shared<BoxFuture<'static, Result<Value>>>,
}

impl PendingValue {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            future: future.boxed().shared(),
        }
    }

    /// Wait for the value. Suspends the calling task; never blocks a thread.
    pub async fn resolve(&self) -> Result<Value> {
        self.future.clone().await
    }

    /// Whether both handles point at the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.future.ptr_eq(&other.future)
    }
}

impl fmt::Debug for PendingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingValue(..)")
    }
}

/// A value produced by a callback when it is resolved.
#[derive(Clone)]
pub struct LazyValue(Arc<dyn Fn() -> Value + Send + Sync>);

impl LazyValue {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn evaluate(&self) -> Value {
        (self.0)()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyValue(..)")
    }
}

impl Value {
    /// Wrap a future as a [`Value::Pending`].
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        Value::Pending(PendingValue::new(future))
    }

    pub fn lazy(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Value::Lazy(LazyValue::new(f))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Pending(_) => "pending",
            Value::Lazy(_) => "lazy",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true unless the value is one of the "falsey" values: `false`,
    /// numeric zero, null, an empty array or map, or one of the strings `"0"`,
    /// `"false"` and `"no"`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !matches!(s.as_str(), "0" | "false" | "no"),
            Value::Null => false,
            Value::Array(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Bytes(_) | Value::Pending(_) | Value::Lazy(_) => true,
        }
    }

    pub fn as_string(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Value::Int(i) => Some(Cow::Owned(i.to_string())),
            Value::Float(f) => Some(Cow::Owned(f.to_string())),
            Value::String(s) => Some(Cow::Borrowed(s)),
            Value::Bytes(b) => core::str::from_utf8(b).ok().map(Cow::Borrowed),
            _ => None,
        }
    }

    /// Integer projection. Floats deliberately do not coerce, so mixed
    /// arithmetic falls back to floating point.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::Float(f) if *f == 0.0 => Some(false),
            Value::Float(f) if *f == 1.0 => Some(true),
            Value::String(s) => match s.as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether anything inside this value still has to be awaited or computed.
    pub fn needs_resolution(&self) -> bool {
        match self {
            Value::Pending(_) | Value::Lazy(_) => true,
            Value::Array(items) => items.iter().any(Value::needs_resolution),
            Value::Map(map) => map.values().any(Value::needs_resolution),
            _ => false,
        }
    }

    /// Resolve every pending and lazy value nested in `self`.
    ///
    /// Siblings are awaited together and keep their original order, so a slow
    /// first element never reorders the output.
    pub fn resolve(self) -> BoxFuture<'static, Result<Value>> {
        if !self.needs_resolution() {
            return future::ready(Ok(self)).boxed();
        }
        async move {
            match self {
                Value::Pending(pending) => pending.resolve().await?.resolve().await,
                Value::Lazy(lazy) => lazy.evaluate().resolve().await,
                Value::Array(items) => {
                    let items = future::try_join_all(items.into_iter().map(Value::resolve)).await?;
                    Ok(Value::Array(items))
                }
                Value::Map(map) => {
                    let (keys, values): (Vec<_>, Vec<_>) = map.into_iter().unzip();
                    let values =
                        future::try_join_all(values.into_iter().map(Value::resolve)).await?;
                    Ok(Value::Map(keys.into_iter().zip(values).collect()))
                }
                other => Ok(other),
            }
        }
        .boxed()
    }

    fn structurally_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w))
            }
            (Value::Pending(a), Value::Pending(b)) => a.ptr_eq(b),
            (Value::Lazy(a), Value::Lazy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Fuzzy-first equality: two values are equal when any of their string, int,
/// float or bool projections agree, otherwise when they are structurally equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        fn agree<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            matches!((a, b), (Some(a), Some(b)) if a == b)
        }

        agree(self.as_string(), other.as_string())
            || agree(self.as_int(), other.as_int())
            || agree(self.as_float(), other.as_float())
            || agree(self.as_bool(), other.as_bool())
            || self.structurally_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {}", map[key])?;
                }
                f.write_str("}")
            }
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Pending(_) => f.write_str("<pending>"),
            Value::Lazy(_) => f.write_str("<lazy>"),
            other => match other.as_string() {
                Some(s) => f.write_str(&s),
                None => Ok(()),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Int(i64::from(n))
                }
            }
        )*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! from_wide_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    match i64::try_from(n) {
                        Ok(n) => Value::Int(n),
                        Err(_) => Value::String(n.to_string()),
                    }
                }
            }
        )*
    };
}

from_wide_int!(u64, usize, isize, i128, u128);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(map: HashMap<K, V>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::Array(iter.into_iter().map(Into::into).collect())
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::{Error, SerializeMap, SerializeSeq};

        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Lazy(lazy) => lazy.evaluate().serialize(serializer),
            Value::Pending(_) => Err(S::Error::custom(
                "pending values must be resolved before serialization",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_table() {
        templatekit_testhelpers::setup();
        assert!(!Value::from("0").is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(!Value::from("no").is_truthy());
        assert!(Value::from("anything-else").is_truthy());
        assert!(Value::from("").is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(0.0).is_truthy());
        assert!(Value::from(-3).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(Value::from(vec![1]).is_truthy());
        assert!(!Value::Map(Map::new()).is_truthy());
        assert!(Value::lazy(|| Value::Null).is_truthy());
    }

    #[test]
    fn equality_is_fuzzy_first() {
        templatekit_testhelpers::setup();
        assert_eq!(Value::from(1), Value::from("1"));
        assert_eq!(Value::from(1), Value::from(true));
        assert_eq!(Value::from("1"), Value::from(true));
        assert_eq!(Value::from(2), Value::from(2.0));
        assert_ne!(Value::from("abc"), Value::from("ABC"));
        assert_ne!(Value::Null, Value::from(""));
        assert_eq!(Value::from(vec!["a", "b"]), Value::from(vec!["a", "b"]));
        assert_ne!(Value::from(vec!["a"]), Value::from(vec!["a", "b"]));
    }

    #[test]
    fn floats_do_not_coerce_to_int() {
        templatekit_testhelpers::setup();
        assert_eq!(Value::from(1.5).as_int(), None);
        assert_eq!(Value::from("42").as_int(), Some(42));
        assert_eq!(Value::from("4.5").as_float(), Some(4.5));
        assert_eq!(Value::from(true).as_float(), Some(1.0));
    }

    #[tokio::test]
    async fn resolves_nested_pending_values_in_order() {
        templatekit_testhelpers::setup();
        let value = Value::from(vec![
            Value::pending(async { Ok(Value::from("a")) }),
            Value::lazy(|| Value::from("b")),
            Value::from("c"),
        ]);
        assert!(value.needs_resolution());
        let resolved = value.resolve().await.unwrap();
        assert_eq!(resolved.to_string(), "[a, b, c]");
    }

    #[tokio::test]
    async fn pending_clones_share_one_result() {
        templatekit_testhelpers::setup();
        let pending = PendingValue::new(async { Ok(Value::from(7)) });
        let other = pending.clone();
        assert!(pending.ptr_eq(&other));
        assert_eq!(pending.resolve().await.unwrap(), Value::from(7));
        assert_eq!(other.resolve().await.unwrap(), Value::from(7));
    }
}
