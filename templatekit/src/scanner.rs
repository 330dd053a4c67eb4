//! Byte cursor used by every parser.

use core::ops::Range;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Result, TemplateKitError};
use crate::source::{SourceStart, TemplateSource};

/// Cursor over one immutable template buffer.
///
/// No other component looks at raw template bytes; the grammars are single pass
/// with a few bytes of lookahead, so there is no backtracking buffer.
#[derive(Debug, Clone)]
pub struct TemplateByteScanner {
    file: Arc<str>,
    data: Bytes,
    offset: usize,
    line: usize,
    column: usize,
}

impl TemplateByteScanner {
    /// Create a scanner over `data`. `file` is the path the bytes were loaded
    /// from, or any description of where they came from.
    pub fn new(data: impl Into<Bytes>, file: impl Into<Arc<str>>) -> Self {
        Self {
            file: file.into(),
            data: data.into(),
            offset: 0,
            line: 0,
            column: 0,
        }
    }

    pub fn file(&self) -> &Arc<str> {
        &self.file
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// The byte `by` positions ahead of the cursor, if not past the end.
    pub fn peek(&self, by: usize) -> Option<u8> {
        self.data.get(self.offset.checked_add(by)?).copied()
    }

    /// Consume the current byte.
    pub fn pop(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.offset)?;
        self.offset += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    /// Like [`pop`](Self::pop), failing at the end of input.
    pub fn require_pop(&mut self) -> Result<u8> {
        let start = self.make_source_start();
        self.pop().ok_or_else(|| {
            TemplateKitError::parse("Unexpected end of input", self.make_source(start))
        })
    }

    /// Require `n` more bytes and consume them.
    pub fn require_pop_n(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.require_pop()?;
        }
        Ok(())
    }

    /// Whether the upcoming bytes are exactly `bytes`, without consuming them.
    pub fn peek_matches(&self, bytes: &[u8]) -> bool {
        self.peek_matches_at(0, bytes)
    }

    /// Like [`peek_matches`](Self::peek_matches), starting `offset` bytes ahead.
    pub fn peek_matches_at(&self, offset: usize, bytes: &[u8]) -> bool {
        let Some(start) = self.offset.checked_add(offset) else {
            return false;
        };
        self.data
            .get(start..)
            .is_some_and(|rest| rest.starts_with(bytes))
    }

    /// Count of spaces and tabs starting `by` bytes past the cursor.
    pub fn count_horizontal_whitespace_at(&self, by: usize) -> usize {
        self.data
            .get(self.offset.saturating_add(by)..)
            .map(|rest| rest.iter().take_while(|b| matches!(b, b' ' | b'\t')).count())
            .unwrap_or(0)
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pop();
        }
    }

    /// Zero-copy view of a range of the underlying buffer.
    pub fn slice(&self, range: Range<usize>) -> Bytes {
        self.data.slice(range)
    }

    pub fn make_source_start(&self) -> SourceStart {
        SourceStart {
            line: self.line,
            column: self.column,
            offset: self.offset,
        }
    }

    /// Close a span opened with [`make_source_start`](Self::make_source_start)
    /// at the current cursor position.
    pub fn make_source(&self, start: SourceStart) -> TemplateSource {
        TemplateSource {
            file: self.file.clone(),
            line: start.line,
            column: start.column,
            range: start.offset..self.offset,
            text: self.data.clone(),
        }
    }

    /// Build a parse error spanning from `start` to the cursor.
    pub fn error(&self, reason: impl Into<String>, start: SourceStart) -> TemplateKitError {
        TemplateKitError::parse(reason, self.make_source(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_lines_and_columns() {
        templatekit_testhelpers::setup();
        let mut scanner = TemplateByteScanner::new("ab\ncd", "test");
        assert_eq!(scanner.pop(), Some(b'a'));
        assert_eq!(scanner.column(), 1);
        scanner.pop();
        scanner.pop();
        assert_eq!(scanner.line(), 1);
        assert_eq!(scanner.column(), 0);
        assert_eq!(scanner.offset(), 3);
        assert_eq!(scanner.peek(1), Some(b'd'));
        assert_eq!(scanner.peek(2), None);
    }

    #[test]
    fn require_pop_fails_at_end() {
        templatekit_testhelpers::setup();
        let mut scanner = TemplateByteScanner::new("x", "test");
        assert_eq!(scanner.require_pop().ok(), Some(b'x'));
        let err = scanner.require_pop().unwrap_err();
        assert!(matches!(err, TemplateKitError::Parse { .. }));
        assert!(scanner.require_pop_n(0).is_ok());
    }

    #[test]
    fn peek_matches_does_not_consume() {
        templatekit_testhelpers::setup();
        let scanner = TemplateByteScanner::new("{{name}}", "test");
        assert!(scanner.peek_matches(b"{{"));
        assert!(scanner.peek_matches_at(2, b"name"));
        assert!(!scanner.peek_matches(b"{{{"));
        assert!(!scanner.peek_matches_at(7, b"}}"));
        assert_eq!(scanner.offset(), 0);
    }

    #[test]
    fn spans_cover_consumed_bytes() {
        templatekit_testhelpers::setup();
        let mut scanner = TemplateByteScanner::new("hello world", "greeting.kit");
        scanner.require_pop_n(6).unwrap();
        let start = scanner.make_source_start();
        scanner.require_pop_n(5).unwrap();
        let source = scanner.make_source(start);
        assert_eq!(source.range, 6..11);
        assert_eq!(&*source.file, "greeting.kit");
        assert_eq!(&scanner.slice(source.range)[..], b"world");
    }
}
