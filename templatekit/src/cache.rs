//! Parsed-template cache keyed by resolved path.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ast::Syntax;

/// Concurrent map from template path to its parsed nodes.
///
/// Two tasks missing on the same path may both parse it; the second insert
/// simply replaces an identical entry.
#[derive(Debug, Default)]
pub struct AstCache {
    entries: RwLock<HashMap<String, Arc<[Syntax]>>>,
}

impl AstCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<[Syntax]>> {
        self.entries.read().get(path).cloned()
    }

    pub fn put(&self, path: impl Into<String>, nodes: Arc<[Syntax]>) {
        self.entries.write().insert(path.into(), nodes);
    }

    pub fn remove(&self, path: &str) -> Option<Arc<[Syntax]>> {
        self.entries.write().remove(path)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::source::TemplateSource;

    #[test]
    fn put_get_clear() {
        templatekit_testhelpers::setup();
        let cache = AstCache::new();
        assert!(cache.get("a.kit").is_none());

        let nodes: Arc<[Syntax]> = vec![Syntax::raw(
            Bytes::from_static(b"hi"),
            TemplateSource::detached("a.kit"),
        )]
        .into();
        cache.put("a.kit", nodes.clone());
        cache.put("a.kit", nodes.clone());
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get("a.kit").unwrap(), &nodes));

        cache.clear();
        assert!(cache.is_empty());
    }
}
