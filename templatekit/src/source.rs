//! Source locations attached to every parsed node.

use core::fmt;
use core::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use miette::{MietteError, MietteSpanContents, SourceCode, SourceSpan, SpanContents};

/// Location of a piece of syntax in a template's source buffer.
///
/// Lines and columns are zero-based; `range` is the byte range the unit spans.
/// The buffer itself rides along (a cheap [`Bytes`] handle) so diagnostics can
/// quote the offending text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TemplateSource {
    /// Path of the template file, or a description of where the bytes came from.
    pub file: Arc<str>,
    /// Line the unit starts on.
    pub line: usize,
    /// Column the unit starts at.
    pub column: usize,
    /// Byte offsets covered by the unit.
    pub range: Range<usize>,
    /// The whole buffer `range` points into; empty when unknown.
    pub text: Bytes,
}

impl TemplateSource {
    pub fn new(file: impl Into<Arc<str>>, line: usize, column: usize, range: Range<usize>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            range,
            text: Bytes::new(),
        }
    }

    /// Whether the source buffer is known, so the span can be quoted.
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    /// A span for values that never came from template text.
    pub fn detached(file: impl Into<Arc<str>>) -> Self {
        Self::new(file, 0, 0, 0..0)
    }

    /// The span in the form miette labels expect.
    pub fn span(&self) -> SourceSpan {
        (self.range.start, self.range.len()).into()
    }
}

impl SourceCode for TemplateSource {
    fn read_span<'a>(
        &'a self,
        span: &SourceSpan,
        context_lines_before: usize,
        context_lines_after: usize,
    ) -> Result<Box<dyn SpanContents<'a> + 'a>, MietteError> {
        let contents = <[u8] as SourceCode>::read_span(
            &self.text[..],
            span,
            context_lines_before,
            context_lines_after,
        )?;
        Ok(Box::new(MietteSpanContents::new_named(
            self.file.to_string(),
            contents.data(),
            *contents.span(),
            contents.line(),
            contents.column(),
            contents.line_count(),
        )))
    }
}

impl fmt::Debug for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateSource")
            .field("file", &self.file)
            .field("line", &self.line)
            .field("column", &self.column)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line: {} column: {} range: {}..{}",
            self.file, self.line, self.column, self.range.start, self.range.end
        )
    }
}

/// Start of a span, recorded by the scanner before a unit is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStart {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}
