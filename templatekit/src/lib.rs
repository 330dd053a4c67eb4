#![warn(clippy::std_instead_of_core)]
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod source;
pub use source::{SourceStart, TemplateSource};

mod error;
pub use error::{Result, TemplateKitError};

pub mod scanner;
pub use scanner::TemplateByteScanner;

mod value;
pub use value::{LazyValue, Map, PendingValue, Value};

pub mod path;
pub use path::{MAX_ARRAY_PADDING, PathSegment, SetError, TemplatePath};

pub mod ast;
pub use ast::{Syntax, SyntaxKind};

mod context;
pub use context::{TemplateContext, UserInfo};

mod parser;
pub use parser::{PlaintextParser, TemplateParser};

mod kit;
pub use kit::KitParser;

mod serializer;
pub use serializer::{MAX_EMBED_DEPTH, TemplateSerializer, evaluate_infix};

mod tag;
pub use tag::{TagContext, TagFuture, TagRegistry, TagRenderer, ready};

pub mod tags;
pub use tags::default_tags;

mod cache;
pub use cache::AstCache;

mod loader;
pub use loader::{FileSystemLoader, InMemoryLoader, TemplateLoader};

mod renderer;
pub use renderer::{RendererConfig, TemplateRenderer, TemplateRendererBuilder};

pub mod encode;
pub use encode::{TemplateDataConvertible, to_value};

pub mod escape;
