//! Error types for parsing, serializing and loading templates.
//!
//! Every failure carries the [`TemplateSource`] of the node that caused it when
//! one exists, so hosts can point at the offending template text.

use core::fmt::Display;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, SourceCode};
use thiserror::Error;

use crate::source::TemplateSource;

/// Result alias used across the crate.
pub type Result<T, E = TemplateKitError> = core::result::Result<T, E>;

/// All template errors
#[derive(Error, Debug, Clone)]
pub enum TemplateKitError {
    /// Malformed template text; parsing stops at the first one.
    #[error("Parse error: {reason} ({location})")]
    Parse {
        reason: String,
        location: TemplateSource,
    },

    /// Evaluation failed; the render is aborted and no output is produced.
    #[error("Serialize error: {reason}")]
    Serialize {
        reason: String,
        location: Option<TemplateSource>,
    },

    #[error("No tag named `{name}` is registered ({location})")]
    MissingTag {
        name: String,
        location: TemplateSource,
    },

    /// A tag rejected its invocation (arity, body shape or a handler reason).
    #[error("Tag `{tag}`: {reason} ({location})")]
    Tag {
        tag: String,
        reason: String,
        location: TemplateSource,
    },

    /// The host could not supply template bytes.
    #[error("Unable to load template at `{path}`")]
    Load {
        path: String,
        #[source]
        cause: Arc<dyn core::error::Error + Send + Sync>,
    },

    #[error("Unable to encode value: {reason}")]
    Encode { reason: String },
}

impl TemplateKitError {
    pub fn parse(reason: impl Into<String>, location: TemplateSource) -> Self {
        Self::Parse {
            reason: reason.into(),
            location,
        }
    }

    pub fn serialize(reason: impl Into<String>, location: &TemplateSource) -> Self {
        Self::Serialize {
            reason: reason.into(),
            location: Some(location.clone()),
        }
    }

    pub fn load(
        path: impl Into<String>,
        cause: impl core::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Load {
            path: path.into(),
            cause: Arc::new(cause),
        }
    }

    /// The template location this error points at, if any.
    pub fn location(&self) -> Option<&TemplateSource> {
        match self {
            Self::Parse { location, .. }
            | Self::MissingTag { location, .. }
            | Self::Tag { location, .. } => Some(location),
            Self::Serialize { location, .. } => location.as_ref(),
            Self::Load { .. } | Self::Encode { .. } => None,
        }
    }
}

impl Diagnostic for TemplateKitError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let code = match self {
            Self::Parse { .. } => "templatekit::parse",
            Self::Serialize { .. } => "templatekit::serialize",
            Self::MissingTag { .. } => "templatekit::missing_tag",
            Self::Tag { .. } => "templatekit::tag",
            Self::Load { .. } => "templatekit::load",
            Self::Encode { .. } => "templatekit::encode",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        match self {
            Self::MissingTag { name, .. } => Some(Box::new(format!(
                "Register a handler for `{name}` in the renderer's tag registry"
            ))),
            _ => None,
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        let location = self.location().filter(|location| location.has_text())?;
        Some(location as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let location = self.location().filter(|location| location.has_text())?;
        let label = match self {
            Self::Parse { .. } => "here",
            Self::MissingTag { .. } => "unknown tag",
            Self::Tag { .. } => "rejected here",
            _ => "while evaluating this",
        };
        Some(Box::new(core::iter::once(LabeledSpan::at(
            location.span(),
            label,
        ))))
    }
}
