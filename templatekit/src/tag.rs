//! Extension seam: named handlers invoked by `Tag` nodes.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::ast::Syntax;
use crate::context::TemplateContext;
use crate::error::{Result, TemplateKitError};
use crate::serializer::TemplateSerializer;
use crate::source::TemplateSource;
use crate::value::Value;

/// What a tag handler produces.
pub type TagFuture<'a> = BoxFuture<'a, Result<Value>>;

/// A handler for one tag name.
///
/// Handlers may return [`Value::Pending`] to let the serializer join them
/// with their siblings, or await their own work before returning.
pub trait TagRenderer: Send + Sync {
    fn render<'a>(&'a self, tag: &'a TagContext) -> TagFuture<'a>;
}

impl<F> TagRenderer for F
where
    F: Fn(&TagContext) -> Result<Value> + Send + Sync,
{
    fn render<'a>(&'a self, tag: &'a TagContext) -> TagFuture<'a> {
        ready(self(tag))
    }
}

/// Box an already computed result as a [`TagFuture`].
pub fn ready<'a>(result: Result<Value>) -> TagFuture<'a> {
    future::ready(result).boxed()
}

/// Everything a handler gets to see about one tag invocation.
pub struct TagContext {
    /// Name the tag was invoked with.
    pub name: String,
    /// Parameters, evaluated left to right and fully resolved.
    pub parameters: Vec<Value>,
    pub body: Option<Vec<Syntax>>,
    pub source: TemplateSource,
    pub context: TemplateContext,
    /// The serializer rendering this tag, for handlers that render their body.
    pub serializer: TemplateSerializer,
}

impl TagContext {
    /// A [`TemplateKitError::Tag`] pointing at this invocation.
    pub fn error(&self, reason: impl Into<String>) -> TemplateKitError {
        TemplateKitError::Tag {
            tag: self.name.clone(),
            reason: reason.into(),
            location: self.source.clone(),
        }
    }

    pub fn require_parameter_count(&self, expected: usize) -> Result<()> {
        if self.parameters.len() != expected {
            return Err(self.error(format!(
                "Invalid parameter count: {}/{expected}",
                self.parameters.len()
            )));
        }
        Ok(())
    }

    pub fn require_body(&self) -> Result<&[Syntax]> {
        self.body
            .as_deref()
            .ok_or_else(|| self.error("Missing body"))
    }

    pub fn require_no_body(&self) -> Result<()> {
        match self.body {
            Some(_) => Err(self.error("Extraneous body")),
            None => Ok(()),
        }
    }

    /// The parameter at `index`, or `Null` when there are fewer.
    pub fn parameter(&self, index: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.parameters.get(index).unwrap_or(&NULL)
    }

    /// Render the body against this tag's context.
    pub async fn serialize_body(&self) -> Result<String> {
        let body = self.require_body()?;
        self.serializer.serialize(body, &self.context).await
    }
}

impl fmt::Debug for TagContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagContext")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("body", &self.body.as_ref().map(Vec::len))
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Tag name to handler.
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Arc<dyn TagRenderer>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tag` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, tag: impl TagRenderer + 'static) -> &mut Self {
        self.tags.insert(name.into(), Arc::new(tag));
        self
    }

    /// Register a synchronous closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&TagContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, f)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TagRenderer>> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn TagRenderer>> {
        self.tags.remove(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
