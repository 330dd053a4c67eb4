//! Evaluation context: the data a template renders against.

use core::any::Any;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::path::{SetError, TemplatePath};
use crate::value::{Map, Value};

type Entry = Arc<dyn Any + Send + Sync>;

/// Typed extension storage shared by every context derived during one render.
///
/// Tags use it to memoize expensive state (the `date` tag keeps its parsed
/// format descriptions here). Entries are keyed by a stable string; the stored
/// type is checked on every read.
#[derive(Clone, Default)]
pub struct UserInfo {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl UserInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.entries.lock().insert(key.into(), Arc::new(value));
    }

    /// The entry at `key`, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let entry = self.entries.lock().get(key)?.clone();
        entry.downcast::<T>().ok()
    }

    /// The entry at `key`, initializing it with `init` when absent or when it
    /// holds a different type.
    pub fn get_or_insert_with<T: Any + Send + Sync>(
        &self,
        key: &str,
        init: impl FnOnce() -> T,
    ) -> Arc<T> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key).cloned() {
            if let Ok(existing) = existing.downcast::<T>() {
                return existing;
            }
        }
        let value = Arc::new(init());
        entries.insert(key.to_owned(), value.clone());
        value
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        let mut keys: Vec<_> = entries.keys().collect();
        keys.sort();
        f.debug_struct("UserInfo").field("keys", &keys).finish()
    }
}

/// A shared handle over the current data and the render's [`UserInfo`].
///
/// Clones see the same data. Loop and conditional bodies get their own
/// snapshot through [`derive`](Self::derive), so writes inside a body never
/// leak into the parent.
#[derive(Clone, Default)]
pub struct TemplateContext {
    data: Arc<RwLock<Value>>,
    user_info: UserInfo,
}

impl TemplateContext {
    pub fn new(data: impl Into<Value>) -> Self {
        Self::with_user_info(data, UserInfo::default())
    }

    pub fn with_user_info(data: impl Into<Value>, user_info: UserInfo) -> Self {
        Self {
            data: Arc::new(RwLock::new(data.into())),
            user_info,
        }
    }

    /// A copy of the current data.
    pub fn data(&self) -> Value {
        self.data.read().clone()
    }

    pub fn set_data(&self, data: Value) {
        *self.data.write() = data;
    }

    /// The value at `path`, or `Null`.
    pub fn get(&self, path: &TemplatePath) -> Value {
        self.data.read().get(path).clone()
    }

    pub fn set(&self, path: &TemplatePath, value: Value) {
        self.data.write().set(path, value);
    }

    /// See [`Value::try_set`].
    pub fn try_set(&self, path: &TemplatePath, value: Value) -> Result<(), SetError> {
        self.data.write().try_set(path, value)
    }

    pub fn user_info(&self) -> &UserInfo {
        &self.user_info
    }

    /// A new context over a copy of the current data with `bindings` added.
    ///
    /// Non-map data is replaced by a fresh map holding only the bindings.
    pub fn derive<K, V>(&self, bindings: impl IntoIterator<Item = (K, V)>) -> TemplateContext
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut map = match &*self.data.read() {
            Value::Map(map) => map.clone(),
            _ => Map::new(),
        };
        for (key, value) in bindings {
            map.insert(key.into(), value.into());
        }
        Self::with_user_info(Value::Map(map), self.user_info.clone())
    }

    /// [`derive`](Self::derive) without new bindings.
    pub fn fork(&self) -> TemplateContext {
        self.derive(core::iter::empty::<(String, Value)>())
    }
}

impl fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateContext")
            .field("data", &*self.data.read())
            .field("user_info", &self.user_info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_contexts_do_not_leak_writes() {
        templatekit_testhelpers::setup();
        let mut data = Map::new();
        data.insert("name".into(), Value::from("Ada"));
        let parent = TemplateContext::new(Value::Map(data));

        let child = parent.derive([("index", 3)]);
        child.set(&"name".into(), Value::from("Grace"));

        assert_eq!(child.get(&"index".into()), Value::from(3));
        assert_eq!(child.get(&"name".into()), Value::from("Grace"));
        assert_eq!(parent.get(&"name".into()), Value::from("Ada"));
        assert!(parent.get(&"index".into()).is_null());
    }

    #[test]
    fn derive_from_scalar_data_starts_fresh() {
        templatekit_testhelpers::setup();
        let parent = TemplateContext::new("just text");
        let child = parent.derive([("item", "x")]);
        assert_eq!(child.data().as_map().map(|m| m.len()), Some(1));
    }

    #[test]
    fn user_info_is_shared_and_typed() {
        templatekit_testhelpers::setup();
        let parent = TemplateContext::new(Value::Null);
        let child = parent.fork();

        let mut calls = 0;
        let first = child.user_info().get_or_insert_with("counter", || {
            calls += 1;
            41_u32
        });
        let second = parent.user_info().get_or_insert_with("counter", || {
            calls += 1;
            0_u32
        });
        assert_eq!(calls, 1);
        assert_eq!(*first, 41);
        assert!(Arc::ptr_eq(&first, &second));

        assert!(parent.user_info().get::<String>("counter").is_none());
        let replaced = parent
            .user_info()
            .get_or_insert_with("counter", || String::from("now a string"));
        assert_eq!(replaced.as_str(), "now a string");
    }
}
