//! Where template bytes come from.

use std::collections::HashMap;
use std::io;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, TemplateKitError};

/// Supplies raw template bytes for a resolved path.
pub trait TemplateLoader: Send + Sync {
    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Bytes>>;
}

/// Reads templates from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemLoader;

impl TemplateLoader for FileSystemLoader {
    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Bytes>> {
        async move {
            debug!(path, "reading template");
            let data = tokio::fs::read(path)
                .await
                .map_err(|err| TemplateKitError::load(path, err))?;
            Ok(Bytes::from(data))
        }
        .boxed()
    }
}

/// Serves templates registered up front, keyed by their full path.
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    templates: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, template: impl Into<Bytes>) {
        self.templates.write().insert(path.into(), template.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, path: impl Into<String>, template: impl Into<Bytes>) -> Self {
        self.insert(path, template);
        self
    }
}

impl TemplateLoader for InMemoryLoader {
    fn load<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Bytes>> {
        let found = self.templates.read().get(path).cloned();
        async move {
            found.ok_or_else(|| {
                TemplateKitError::load(
                    path,
                    io::Error::new(io::ErrorKind::NotFound, "no template registered at this path"),
                )
            })
        }
        .boxed()
    }
}
