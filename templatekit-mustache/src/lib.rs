#![warn(clippy::std_instead_of_core)]
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

use templatekit::ast::{Conditional, SyntaxKind};
use templatekit::{
    RendererConfig, Result, SourceStart, Syntax, TemplateByteScanner, TemplateKitError,
    TemplateParser, TemplatePath, TemplateRenderer, TemplateRendererBuilder,
};
use tracing::trace;

/// File ending appended to paths rendered by [`renderer`].
pub const FILE_ENDING: &str = ".mustache";

/// Internal tag marking a `{{/name}}` section close. Never reaches the
/// serializer: sections consume their own close, and a close with no open
/// section is an error.
const SECTION_END: &str = "_end";

/// Parser for `{{name}}`, `{{{name}}}` and `{{#name}}…{{/name}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MustacheParser;

impl TemplateParser for MustacheParser {
    fn parse(&self, scanner: &mut TemplateByteScanner) -> Result<Vec<Syntax>> {
        let mut parser = Parser { scanner };
        let mut nodes = Vec::new();
        while let Some(node) = parser.unit()? {
            if let Some(path) = section_end(&node) {
                return Err(TemplateKitError::parse(
                    format!("Unmatched section close `{{{{/{path}}}}}`"),
                    node.source,
                ));
            }
            nodes.push(node);
        }
        Ok(nodes)
    }
}

/// Renderer configuration for `.mustache` files.
pub fn config() -> RendererConfig {
    RendererConfig {
        file_ending: FILE_ENDING.into(),
        ..RendererConfig::default()
    }
}

/// A builder preconfigured with [`MustacheParser`] and [`config`]; set a
/// loader or extra tags before building.
pub fn builder() -> TemplateRendererBuilder {
    TemplateRenderer::builder(MustacheParser).config(config())
}

/// A mustache renderer reading templates from disk with the default tags.
pub fn renderer() -> TemplateRenderer {
    builder().build()
}

fn section_end(node: &Syntax) -> Option<&TemplatePath> {
    let SyntaxKind::Tag(tag) = &node.kind else {
        return None;
    };
    if tag.name != SECTION_END {
        return None;
    }
    match tag.parameters.first().map(|p| &p.kind) {
        Some(SyntaxKind::Identifier(identifier)) => Some(&identifier.path),
        _ => None,
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'_'
}

struct Parser<'s> {
    scanner: &'s mut TemplateByteScanner,
}

impl Parser<'_> {
    fn at_tag(&self) -> bool {
        self.scanner.peek_matches(b"{{")
    }

    /// The next node, or `None` at the end of input.
    fn unit(&mut self) -> Result<Option<Syntax>> {
        if self.scanner.is_at_end() {
            return Ok(None);
        }
        if self.at_tag() {
            return self.tag().map(Some);
        }
        Ok(Some(self.raw()))
    }

    fn raw(&mut self) -> Syntax {
        let start = self.scanner.make_source_start();
        // a lone `{` is plain text, so always take the first byte
        self.scanner.pop();
        while !self.scanner.is_at_end() && !self.at_tag() {
            self.scanner.pop();
        }
        let data = self.scanner.slice(start.offset..self.scanner.offset());
        Syntax::raw(data, self.scanner.make_source(start))
    }

    fn tag(&mut self) -> Result<Syntax> {
        let start = self.scanner.make_source_start();
        self.scanner.require_pop_n(2)?;
        match self.scanner.peek(0) {
            Some(b'{') => {
                self.scanner.pop();
                let identifier = self.identifier()?;
                self.close(b"}}}", start)?;
                let source = self.scanner.make_source(start);
                Ok(Syntax::tag("get", vec![identifier], None, source))
            }
            Some(b'#') => {
                self.scanner.pop();
                let identifier = self.identifier()?;
                self.close(b"}}", start)?;
                self.section(identifier, start)
            }
            Some(b'/') => {
                self.scanner.pop();
                let identifier = self.identifier()?;
                self.close(b"}}", start)?;
                let source = self.scanner.make_source(start);
                Ok(Syntax::tag(SECTION_END, vec![identifier], None, source))
            }
            Some(_) => {
                let identifier = self.identifier()?;
                self.close(b"}}", start)?;
                let source = self.scanner.make_source(start);
                Ok(Syntax::tag("", vec![identifier], None, source))
            }
            None => Err(self.scanner.error("Unexpected end of input in tag", start)),
        }
    }

    /// Everything up to the matching `{{/name}}` (or the end of input), as a
    /// conditional on `name`. Closes for other names inside the body are
    /// dropped.
    fn section(&mut self, condition: Syntax, start: SourceStart) -> Result<Syntax> {
        let SyntaxKind::Identifier(open) = &condition.kind else {
            return Err(self.scanner.error("Expected an identifier", start));
        };
        let open = open.path.clone();
        let mut body = Vec::new();
        while let Some(node) = self.unit()? {
            match section_end(&node) {
                Some(path) if *path == open => break,
                Some(path) => trace!(%path, section = %open, "dropping mismatched section close"),
                None => body.push(node),
            }
        }
        let source = self.scanner.make_source(start);
        Ok(Syntax::new(
            SyntaxKind::Conditional(Conditional {
                condition: Box::new(condition),
                body,
                next: None,
            }),
            source,
        ))
    }

    fn identifier(&mut self) -> Result<Syntax> {
        self.scanner.skip_whitespace();
        let start = self.scanner.make_source_start();
        while self.scanner.peek(0).is_some_and(is_identifier_byte) {
            self.scanner.pop();
        }
        if self.scanner.offset() == start.offset {
            return Err(self.scanner.error("Expected an identifier", start));
        }
        let bytes = self.scanner.slice(start.offset..self.scanner.offset());
        let text = String::from_utf8_lossy(&bytes);
        let source = self.scanner.make_source(start);
        self.scanner.skip_whitespace();
        Ok(Syntax::identifier(TemplatePath::parse(&text), source))
    }

    fn close(&mut self, marker: &[u8], start: SourceStart) -> Result<()> {
        if !self.scanner.peek_matches(marker) {
            let marker = String::from_utf8_lossy(marker);
            return Err(self
                .scanner
                .error(format!("Expected `{marker}` to close tag"), start));
        }
        self.scanner.require_pop_n(marker.len())
    }
}
