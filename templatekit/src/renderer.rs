//! The host-facing entry point: load, parse, cache and serialize.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::Syntax;
use crate::cache::AstCache;
use crate::context::{TemplateContext, UserInfo};
use crate::encode;
use crate::error::Result;
use crate::kit::KitParser;
use crate::loader::{FileSystemLoader, TemplateLoader};
use crate::parser::{PlaintextParser, TemplateParser};
use crate::scanner::TemplateByteScanner;
use crate::serializer::TemplateSerializer;
use crate::tag::TagRegistry;
use crate::tags::default_tags;
use crate::value::Value;

/// Path handling and caching knobs of a [`TemplateRenderer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Appended to every rendered path that does not already end with it.
    pub file_ending: String,
    /// Prepended to every path that is not absolute.
    pub relative_directory: String,
    /// Whether parsed templates are kept in the [`AstCache`].
    pub should_cache: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            file_ending: String::new(),
            relative_directory: String::new(),
            should_cache: true,
        }
    }
}

struct Inner {
    parser: Box<dyn TemplateParser>,
    tags: Arc<TagRegistry>,
    loader: Arc<dyn TemplateLoader>,
    cache: AstCache,
    file_ending: String,
    relative_directory: String,
    should_cache: AtomicBool,
}

/// Renders templates by path or from bytes.
///
/// Cloning is cheap; clones share the parser, tags, loader and cache.
#[derive(Clone)]
pub struct TemplateRenderer {
    inner: Arc<Inner>,
}

/// Assembles a [`TemplateRenderer`].
pub struct TemplateRendererBuilder {
    parser: Box<dyn TemplateParser>,
    tags: TagRegistry,
    loader: Arc<dyn TemplateLoader>,
    config: RendererConfig,
}

impl TemplateRendererBuilder {
    pub fn tags(mut self, tags: TagRegistry) -> Self {
        self.tags = tags;
        self
    }

    pub fn loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn shared_loader(mut self, loader: Arc<dyn TemplateLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TemplateRenderer {
        TemplateRenderer {
            inner: Arc::new(Inner {
                parser: self.parser,
                tags: Arc::new(self.tags),
                loader: self.loader,
                cache: AstCache::new(),
                file_ending: self.config.file_ending,
                relative_directory: self.config.relative_directory,
                should_cache: AtomicBool::new(self.config.should_cache),
            }),
        }
    }
}

impl TemplateRenderer {
    /// Start building a renderer around `parser`, with the default tags, the
    /// file system loader and the default configuration.
    pub fn builder(parser: impl TemplateParser + 'static) -> TemplateRendererBuilder {
        TemplateRendererBuilder {
            parser: Box::new(parser),
            tags: default_tags(),
            loader: Arc::new(FileSystemLoader),
            config: RendererConfig::default(),
        }
    }

    /// A renderer for the kit syntax reading `.kit` files from disk.
    pub fn kit() -> Self {
        Self::builder(KitParser)
            .config(RendererConfig {
                file_ending: ".kit".into(),
                ..RendererConfig::default()
            })
            .build()
    }

    /// A renderer that outputs files verbatim.
    pub fn plaintext() -> Self {
        Self::builder(PlaintextParser).build()
    }

    pub fn tags(&self) -> &Arc<TagRegistry> {
        &self.inner.tags
    }

    pub fn cache(&self) -> &AstCache {
        &self.inner.cache
    }

    pub fn config(&self) -> RendererConfig {
        RendererConfig {
            file_ending: self.inner.file_ending.clone(),
            relative_directory: self.inner.relative_directory.clone(),
            should_cache: self.should_cache(),
        }
    }

    pub fn should_cache(&self) -> bool {
        self.inner.should_cache.load(Ordering::Relaxed)
    }

    /// Turning caching off also drops everything cached so far.
    pub fn set_should_cache(&self, should_cache: bool) {
        self.inner
            .should_cache
            .store(should_cache, Ordering::Relaxed);
        if !should_cache {
            self.inner.cache.clear();
        }
    }

    /// Apply the configured file ending and relative directory to `path`.
    pub fn resolve_path(&self, path: &str) -> String {
        let mut resolved = path.to_owned();
        let ending = &self.inner.file_ending;
        if !ending.is_empty() && !resolved.ends_with(ending.as_str()) {
            resolved.push_str(ending);
        }

        let directory = &self.inner.relative_directory;
        if directory.is_empty() || resolved.starts_with('/') {
            return resolved;
        }
        if directory.ends_with('/') {
            format!("{directory}{resolved}")
        } else {
            format!("{directory}/{resolved}")
        }
    }

    /// Parse `template` with this renderer's parser. Nothing is cached.
    pub fn parse(&self, template: impl Into<Bytes>, file: &str) -> Result<Vec<Syntax>> {
        let mut scanner = TemplateByteScanner::new(template, file);
        let nodes = self.inner.parser.parse(&mut scanner)?;
        debug!(file, nodes = nodes.len(), "parsed template");
        Ok(nodes)
    }

    /// Load, parse and render the template at `path`.
    pub async fn render_path(
        &self,
        path: &str,
        data: impl Into<Value>,
        user_info: UserInfo,
    ) -> Result<String> {
        let context = TemplateContext::with_user_info(data, user_info);
        self.render_nested(path, context, 0).await
    }

    /// Parse and render `template` directly. `file` only labels diagnostics.
    pub async fn render_bytes(
        &self,
        template: impl Into<Bytes>,
        data: impl Into<Value>,
        file: &str,
    ) -> Result<String> {
        let nodes = self.parse(template, file)?;
        let context = TemplateContext::new(data);
        TemplateSerializer::for_renderer(self.clone(), 0)
            .serialize(&nodes, &context)
            .await
    }

    /// Encode `data` into a [`Value`] and render the template at `path`.
    pub async fn render_encodable<T>(&self, path: &str, data: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let data = encode::to_value(data)?;
        self.render_path(path, data, UserInfo::default()).await
    }

    pub(crate) fn render_nested<'a>(
        &'a self,
        path: &'a str,
        context: TemplateContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            let path = self.resolve_path(path);
            let nodes = self.load(&path).await?;
            TemplateSerializer::for_renderer(self.clone(), depth)
                .serialize(&nodes, &context)
                .await
        }
        .boxed()
    }

    async fn load(&self, path: &str) -> Result<Arc<[Syntax]>> {
        let caching = self.should_cache();
        if caching {
            if let Some(nodes) = self.inner.cache.get(path) {
                debug!(path, "template cache hit");
                return Ok(nodes);
            }
            debug!(path, "template cache miss");
        }

        let template = self.inner.loader.load(path).await?;
        let nodes: Arc<[Syntax]> = self.parse(template, path)?.into();
        if caching {
            self.inner.cache.put(path, nodes.clone());
        }
        Ok(nodes)
    }
}

impl fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("tags", &self.inner.tags)
            .field("config", &self.config())
            .field("cached", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_paths() {
        templatekit_testhelpers::setup();
        let renderer = TemplateRenderer::builder(KitParser)
            .config(RendererConfig {
                file_ending: ".kit".into(),
                relative_directory: "views".into(),
                should_cache: true,
            })
            .build();
        assert_eq!(renderer.resolve_path("home"), "views/home.kit");
        assert_eq!(renderer.resolve_path("home.kit"), "views/home.kit");
        assert_eq!(renderer.resolve_path("/abs/home"), "/abs/home.kit");
    }

    #[test]
    fn disabling_the_cache_clears_it() {
        templatekit_testhelpers::setup();
        let renderer = TemplateRenderer::kit();
        renderer.cache().put("x", Vec::<Syntax>::new().into());
        assert_eq!(renderer.cache().len(), 1);
        renderer.set_should_cache(false);
        assert!(renderer.cache().is_empty());
        assert!(!renderer.config().should_cache);
    }
}
