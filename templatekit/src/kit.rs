//! The kit template grammar.
//!
//! ```text
//! Hello, #(name)!                       print an expression (HTML-escaped)
//! #lowercase(title)                     call a tag
//! #set("greeting") { Hi #(name) }       call a tag with a body
//! #if(count > 1) {…} else if(x) {…} else {…}
//! #for(item in items) { #(index): #(item) }
//! #embed("partials/footer")
//! \#                                    a literal `#`
//! ```
//!
//! Expressions support `|| && == != < > <= >= + - * / %` (lowest to highest
//! precedence) and prefix `!`, over numbers, booleans, string literals,
//! identifier paths, nested tag calls and parenthesized groups.

use crate::ast::{
    Conditional, Constant, Embed, Expression, InfixOperator, Iteration, PrefixOperator, Syntax,
    SyntaxKind,
};
use crate::error::Result;
use crate::parser::TemplateParser;
use crate::path::TemplatePath;
use crate::scanner::TemplateByteScanner;
use crate::source::SourceStart;

/// Parser for the `#tag(...)` syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct KitParser;

impl TemplateParser for KitParser {
    fn parse(&self, scanner: &mut TemplateByteScanner) -> Result<Vec<Syntax>> {
        Parser { scanner }.nodes(None)
    }
}

/// Binary operator levels, lowest precedence first. Longer tokens come before
/// their prefixes so `<=` is never read as `<`.
const LEVELS: &[&[(&str, InfixOperator)]] = &[
    &[("||", InfixOperator::Or)],
    &[("&&", InfixOperator::And)],
    &[("==", InfixOperator::Equal), ("!=", InfixOperator::NotEqual)],
    &[
        ("<=", InfixOperator::LessOrEqual),
        (">=", InfixOperator::GreaterOrEqual),
        ("<", InfixOperator::Less),
        (">", InfixOperator::Greater),
    ],
    &[("+", InfixOperator::Add), ("-", InfixOperator::Subtract)],
    &[
        ("*", InfixOperator::Multiply),
        ("/", InfixOperator::Divide),
        ("%", InfixOperator::Modulo),
    ],
];

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_word_byte(b: u8) -> bool {
    is_name_byte(b) || b == b'.'
}

struct Parser<'s> {
    scanner: &'s mut TemplateByteScanner,
}

impl Parser<'_> {
    /// Parse nodes until end of input, or until the `}` closing a body opened
    /// at `body`.
    fn nodes(&mut self, body: Option<SourceStart>) -> Result<Vec<Syntax>> {
        let mut nodes = Vec::new();
        loop {
            match self.scanner.peek(0) {
                None => {
                    return match body {
                        Some(start) => Err(self.scanner.error("Expected `}` to close body", start)),
                        None => Ok(nodes),
                    };
                }
                Some(b'}') if body.is_some() => {
                    self.scanner.pop();
                    return Ok(nodes);
                }
                Some(b'\\') if self.scanner.peek(1) == Some(b'#') => {
                    let start = self.scanner.make_source_start();
                    self.scanner.pop();
                    let offset = self.scanner.offset();
                    self.scanner.pop();
                    nodes.push(Syntax::raw(
                        self.scanner.slice(offset..offset + 1),
                        self.scanner.make_source(start),
                    ));
                }
                Some(b'#') if self.tag_ahead() => nodes.push(self.tag()?),
                Some(_) => nodes.push(self.raw(body.is_some())),
            }
        }
    }

    /// `#(` or `#name(` at the cursor.
    fn tag_ahead(&self) -> bool {
        match self.scanner.peek(1) {
            Some(b'(') => true,
            Some(b) if b.is_ascii_alphabetic() => {
                let mut by = 2;
                while self.scanner.peek(by).is_some_and(is_name_byte) {
                    by += 1;
                }
                self.scanner.peek(by) == Some(b'(')
            }
            _ => false,
        }
    }

    fn raw(&mut self, in_body: bool) -> Syntax {
        let start = self.scanner.make_source_start();
        let begin = self.scanner.offset();
        self.scanner.pop();
        while let Some(b) = self.scanner.peek(0) {
            let stop = match b {
                b'}' => in_body,
                b'\\' => self.scanner.peek(1) == Some(b'#'),
                b'#' => self.tag_ahead(),
                _ => false,
            };
            if stop {
                break;
            }
            self.scanner.pop();
        }
        Syntax::raw(
            self.scanner.slice(begin..self.scanner.offset()),
            self.scanner.make_source(start),
        )
    }

    fn tag(&mut self) -> Result<Syntax> {
        let start = self.scanner.make_source_start();
        self.scanner.require_pop()?;

        if self.scanner.peek(0) == Some(b'(') {
            let parameter = self.single_argument("", start)?;
            return Ok(Syntax::tag(
                "",
                vec![parameter],
                None,
                self.scanner.make_source(start),
            ));
        }

        let name = self.name();
        match name.as_str() {
            "if" => self.conditional(start),
            "for" => self.iteration(start),
            "embed" => {
                let path = self.single_argument("embed", start)?;
                Ok(Syntax::new(
                    SyntaxKind::Embed(Embed {
                        path: Box::new(path),
                    }),
                    self.scanner.make_source(start),
                ))
            }
            _ => {
                let parameters = self.arguments()?;
                let body = if self.body_ahead() {
                    Some(self.body()?)
                } else {
                    None
                };
                Ok(Syntax::tag(
                    name,
                    parameters,
                    body,
                    self.scanner.make_source(start),
                ))
            }
        }
    }

    fn conditional(&mut self, start: SourceStart) -> Result<Syntax> {
        let condition = self.single_argument("if", start)?;
        let body = self.require_body("#if", start)?;

        let mut branches = Vec::new();
        let mut otherwise = None;
        while let Some(by) = self.else_ahead() {
            self.scanner.require_pop_n(by)?;
            let branch_start = self.scanner.make_source_start();
            if self.scanner.peek_matches(b"if") {
                self.scanner.require_pop_n(2)?;
                self.scanner.skip_whitespace();
                let condition = self.single_argument("else if", branch_start)?;
                let body = self.require_body("else if", branch_start)?;
                branches.push((condition, body));
            } else {
                let body = self.require_body("else", branch_start)?;
                let source = self.scanner.make_source(branch_start);
                otherwise = Some(Conditional {
                    condition: Box::new(Syntax::constant(Constant::Bool(true), source)),
                    body,
                    next: None,
                });
                break;
            }
        }

        let next = branches
            .into_iter()
            .rev()
            .fold(otherwise, |next, (condition, body)| {
                Some(Conditional {
                    condition: Box::new(condition),
                    body,
                    next: next.map(Box::new),
                })
            });
        Ok(Syntax::new(
            SyntaxKind::Conditional(Conditional {
                condition: Box::new(condition),
                body,
                next: next.map(Box::new),
            }),
            self.scanner.make_source(start),
        ))
    }

    fn iteration(&mut self, start: SourceStart) -> Result<Syntax> {
        self.expect(b'(', "`(` after `#for`")?;
        self.scanner.skip_whitespace();

        let key_start = self.scanner.make_source_start();
        let key = self.name();
        if key.is_empty() {
            return Err(self
                .scanner
                .error("Expected a loop variable name in `#for`", key_start));
        }
        let key = Syntax::constant(Constant::String(key), self.scanner.make_source(key_start));

        self.scanner.skip_whitespace();
        let in_start = self.scanner.make_source_start();
        let in_ahead = self.scanner.peek_matches(b"in")
            && self.scanner.peek(2).is_some_and(|b| b.is_ascii_whitespace());
        if !in_ahead {
            return Err(self
                .scanner
                .error("Expected `in` after the loop variable", in_start));
        }
        self.scanner.require_pop_n(2)?;

        let data = self.expression()?;
        self.scanner.skip_whitespace();
        self.expect(b')', "`)` to close `#for`")?;
        let body = self.require_body("#for", start)?;

        Ok(Syntax::new(
            SyntaxKind::Iterator(Iteration {
                key: Box::new(key),
                data: Box::new(data),
                body,
            }),
            self.scanner.make_source(start),
        ))
    }

    fn name(&mut self) -> String {
        let begin = self.scanner.offset();
        while self.scanner.peek(0).is_some_and(is_name_byte) {
            self.scanner.pop();
        }
        String::from_utf8_lossy(&self.scanner.slice(begin..self.scanner.offset())).into_owned()
    }

    fn expect(&mut self, byte: u8, what: &str) -> Result<()> {
        let start = self.scanner.make_source_start();
        match self.scanner.pop() {
            Some(b) if b == byte => Ok(()),
            _ => Err(self.scanner.error(format!("Expected {what}"), start)),
        }
    }

    /// Horizontal whitespace followed by `{`.
    fn body_ahead(&self) -> bool {
        let by = self.scanner.count_horizontal_whitespace_at(0);
        self.scanner.peek(by) == Some(b'{')
    }

    /// Bytes to skip to reach the `{` or `if` of a following `else` branch.
    ///
    /// Only spaces and tabs may sit around `else`, and something that opens a
    /// branch must come next; anything else leaves the word as plain text.
    fn else_ahead(&self) -> Option<usize> {
        let mut by = self.scanner.count_horizontal_whitespace_at(0);
        if !self.scanner.peek_matches_at(by, b"else") {
            return None;
        }
        by += 4;
        by += self.scanner.count_horizontal_whitespace_at(by);
        let else_if = self.scanner.peek_matches_at(by, b"if")
            && matches!(self.scanner.peek(by + 2), Some(b'(' | b' ' | b'\t'));
        (else_if || self.scanner.peek(by) == Some(b'{')).then_some(by)
    }

    fn body(&mut self) -> Result<Vec<Syntax>> {
        let by = self.scanner.count_horizontal_whitespace_at(0);
        self.scanner.require_pop_n(by)?;
        let start = self.scanner.make_source_start();
        self.expect(b'{', "`{`")?;
        self.nodes(Some(start))
    }

    fn require_body(&mut self, keyword: &str, start: SourceStart) -> Result<Vec<Syntax>> {
        if !self.body_ahead() {
            return Err(self.scanner.error(
                format!("Expected `{{` to open the body of `{keyword}`"),
                start,
            ));
        }
        self.body()
    }

    fn arguments(&mut self) -> Result<Vec<Syntax>> {
        let start = self.scanner.make_source_start();
        self.expect(b'(', "`(`")?;
        let mut arguments = Vec::new();
        self.scanner.skip_whitespace();
        if self.scanner.peek(0) == Some(b')') {
            self.scanner.pop();
            return Ok(arguments);
        }
        loop {
            arguments.push(self.expression()?);
            self.scanner.skip_whitespace();
            let at = self.scanner.make_source_start();
            match self.scanner.pop() {
                Some(b',') => {}
                Some(b')') => return Ok(arguments),
                Some(_) => {
                    return Err(self
                        .scanner
                        .error("Expected `,` or `)` in parameter list", at));
                }
                None => {
                    return Err(self
                        .scanner
                        .error("Expected `)` to close parameter list", start));
                }
            }
        }
    }

    fn single_argument(&mut self, keyword: &str, start: SourceStart) -> Result<Syntax> {
        let mut arguments = self.arguments()?;
        match (arguments.pop(), arguments.is_empty()) {
            (Some(argument), true) => Ok(argument),
            _ => Err(self.scanner.error(
                format!("Expected a single expression in `#{keyword}(...)`"),
                start,
            )),
        }
    }

    fn expression(&mut self) -> Result<Syntax> {
        self.binary(0)
    }

    fn binary(&mut self, level: usize) -> Result<Syntax> {
        let Some(operators) = LEVELS.get(level) else {
            return self.prefix();
        };
        self.scanner.skip_whitespace();
        let start = self.scanner.make_source_start();
        let mut left = self.binary(level + 1)?;
        loop {
            self.scanner.skip_whitespace();
            let Some(&(token, op)) = operators
                .iter()
                .find(|(token, _)| self.scanner.peek_matches(token.as_bytes()))
            else {
                return Ok(left);
            };
            self.scanner.require_pop_n(token.len())?;
            let right = self.binary(level + 1)?;
            left = Syntax::new(
                SyntaxKind::Expression(Expression::Infix {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
                self.scanner.make_source(start),
            );
        }
    }

    fn prefix(&mut self) -> Result<Syntax> {
        self.scanner.skip_whitespace();
        let start = self.scanner.make_source_start();
        if self.scanner.peek(0) == Some(b'!') && self.scanner.peek(1) != Some(b'=') {
            self.scanner.pop();
            let operand = self.prefix()?;
            return Ok(Syntax::new(
                SyntaxKind::Expression(Expression::Prefix {
                    op: PrefixOperator::Not,
                    operand: Box::new(operand),
                }),
                self.scanner.make_source(start),
            ));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Syntax> {
        self.scanner.skip_whitespace();
        let start = self.scanner.make_source_start();
        match self.scanner.peek(0) {
            None => Err(self
                .scanner
                .error("Expected an expression, found end of input", start)),
            Some(b'(') => {
                self.scanner.pop();
                let inner = self.expression()?;
                self.scanner.skip_whitespace();
                self.expect(b')', "`)` to close the group")?;
                Ok(inner)
            }
            Some(b'"') => self.string(start),
            Some(b) if b.is_ascii_digit() => self.number(start),
            Some(b'-') if self.scanner.peek(1).is_some_and(|b| b.is_ascii_digit()) => {
                self.number(start)
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.word(start),
            Some(_) => Err(self.scanner.error("Expected an expression", start)),
        }
    }

    fn word(&mut self, start: SourceStart) -> Result<Syntax> {
        let begin = self.scanner.offset();
        while self.scanner.peek(0).is_some_and(is_word_byte) {
            self.scanner.pop();
        }
        let text =
            String::from_utf8_lossy(&self.scanner.slice(begin..self.scanner.offset())).into_owned();

        if self.scanner.peek(0) == Some(b'(') && !text.contains('.') {
            let parameters = self.arguments()?;
            return Ok(Syntax::tag(
                text,
                parameters,
                None,
                self.scanner.make_source(start),
            ));
        }

        let source = self.scanner.make_source(start);
        Ok(match text.as_str() {
            "true" => Syntax::constant(Constant::Bool(true), source),
            "false" => Syntax::constant(Constant::Bool(false), source),
            _ => Syntax::identifier(TemplatePath::parse(&text), source),
        })
    }

    fn number(&mut self, start: SourceStart) -> Result<Syntax> {
        let begin = self.scanner.offset();
        if self.scanner.peek(0) == Some(b'-') {
            self.scanner.pop();
        }
        while self.scanner.peek(0).is_some_and(|b| b.is_ascii_digit()) {
            self.scanner.pop();
        }
        let is_float = self.scanner.peek(0) == Some(b'.')
            && self.scanner.peek(1).is_some_and(|b| b.is_ascii_digit());
        if is_float {
            self.scanner.pop();
            while self.scanner.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                self.scanner.pop();
            }
        }

        let text = String::from_utf8_lossy(&self.scanner.slice(begin..self.scanner.offset()))
            .into_owned();
        let constant = if is_float {
            text.parse().ok().map(Constant::Float)
        } else {
            text.parse().ok().map(Constant::Int)
        };
        match constant {
            Some(constant) => Ok(Syntax::constant(constant, self.scanner.make_source(start))),
            None => Err(self
                .scanner
                .error(format!("Invalid number literal `{text}`"), start)),
        }
    }

    /// A double-quoted literal. When its contents hold template syntax they
    /// are parsed again and the literal becomes [`Constant::Interpolated`].
    fn string(&mut self, start: SourceStart) -> Result<Syntax> {
        self.scanner.pop();
        let mut plain = Vec::new();
        // Same text, but with `\#` kept so the inner parse sees the escape.
        let mut template = Vec::new();
        loop {
            let Some(b) = self.scanner.pop() else {
                return Err(self.scanner.error("Unterminated string literal", start));
            };
            match b {
                b'"' => break,
                b'\\' => {
                    let resolved = match self.scanner.pop() {
                        Some(b'"') => b'"',
                        Some(b'\\') => b'\\',
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'#') => {
                            plain.push(b'#');
                            template.extend_from_slice(b"\\#");
                            continue;
                        }
                        Some(other) => {
                            return Err(self.scanner.error(
                                format!("Invalid escape sequence `\\{}`", other as char),
                                start,
                            ));
                        }
                        None => {
                            return Err(self.scanner.error("Unterminated string literal", start));
                        }
                    };
                    plain.push(resolved);
                    template.push(resolved);
                }
                other => {
                    plain.push(other);
                    template.push(other);
                }
            }
        }

        let source = self.scanner.make_source(start);
        let Ok(text) = String::from_utf8(plain) else {
            return Err(self.scanner.error("String literal is not valid UTF-8", start));
        };

        if template.contains(&b'#') {
            let mut inner = TemplateByteScanner::new(template, self.scanner.file().clone());
            let nodes = Parser {
                scanner: &mut inner,
            }
            .nodes(None)?;
            if nodes
                .iter()
                .any(|node| !matches!(node.kind, SyntaxKind::Raw(_)))
            {
                return Ok(Syntax::constant(Constant::Interpolated(nodes), source));
            }
        }
        Ok(Syntax::constant(Constant::String(text), source))
    }
}
