//! Syntax tree produced by the parsers and walked by the serializer.
//!
//! Nodes are immutable once parsed and own their children, so a parsed
//! template can be cached and rendered from many tasks at once.

use core::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::context::TemplateContext;
use crate::error::Result;
use crate::path::TemplatePath;
use crate::source::TemplateSource;
use crate::value::Value;

/// One node of a parsed template, together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Syntax {
    pub kind: SyntaxKind,
    pub source: TemplateSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxKind {
    /// Literal template text.
    Raw(Raw),
    /// A call to a registered tag, with or without a body.
    Tag(Tag),
    /// A path into the context data.
    Identifier(Identifier),
    Constant(Constant),
    Expression(Expression),
    /// An `if` / `else if` / `else` chain.
    Conditional(Conditional),
    /// A loop over an array.
    Iterator(Iteration),
    /// Render another template in place.
    Embed(Embed),
    /// Host-provided callback, only constructible from Rust.
    Custom(Custom),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub parameters: Vec<Syntax>,
    pub body: Option<Vec<Syntax>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub path: TemplatePath,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A string literal that contains template syntax of its own.
    Interpolated(Vec<Syntax>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Infix {
        op: InfixOperator,
        left: Box<Syntax>,
        right: Box<Syntax>,
    },
    Prefix {
        op: PrefixOperator,
        operand: Box<Syntax>,
    },
    Postfix {
        op: PostfixOperator,
        operand: Box<Syntax>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfixOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl InfixOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            InfixOperator::Add => "+",
            InfixOperator::Subtract => "-",
            InfixOperator::Multiply => "*",
            InfixOperator::Divide => "/",
            InfixOperator::Modulo => "%",
            InfixOperator::Less => "<",
            InfixOperator::Greater => ">",
            InfixOperator::LessOrEqual => "<=",
            InfixOperator::GreaterOrEqual => ">=",
            InfixOperator::Equal => "==",
            InfixOperator::NotEqual => "!=",
            InfixOperator::And => "&&",
            InfixOperator::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixOperator {
    Not,
}

/// No postfix operators exist yet; the variant is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOperator {}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Box<Syntax>,
    pub body: Vec<Syntax>,
    /// The `else if` / `else` branch, tried when `condition` is falsy.
    pub next: Option<Box<Conditional>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    /// Name each item is bound to; must evaluate to a string.
    pub key: Box<Syntax>,
    /// Must evaluate to an array (or null, which renders nothing).
    pub data: Box<Syntax>,
    pub body: Vec<Syntax>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub path: Box<Syntax>,
}

type CustomFn = dyn Fn(&TemplateContext) -> Result<Value> + Send + Sync;

/// A node whose rendering is delegated to host code.
#[derive(Clone)]
pub struct Custom {
    callback: Arc<CustomFn>,
}

impl Custom {
    pub fn new(callback: impl Fn(&TemplateContext) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn call(&self, context: &TemplateContext) -> Result<Value> {
        (self.callback)(context)
    }
}

impl PartialEq for Custom {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Custom(..)")
    }
}

impl Syntax {
    pub fn new(kind: SyntaxKind, source: TemplateSource) -> Self {
        Self { kind, source }
    }

    pub fn raw(data: Bytes, source: TemplateSource) -> Self {
        Self::new(SyntaxKind::Raw(Raw { data }), source)
    }

    pub fn tag(
        name: impl Into<String>,
        parameters: Vec<Syntax>,
        body: Option<Vec<Syntax>>,
        source: TemplateSource,
    ) -> Self {
        Self::new(
            SyntaxKind::Tag(Tag {
                name: name.into(),
                parameters,
                body,
            }),
            source,
        )
    }

    pub fn identifier(path: TemplatePath, source: TemplateSource) -> Self {
        Self::new(SyntaxKind::Identifier(Identifier { path }), source)
    }

    pub fn constant(constant: Constant, source: TemplateSource) -> Self {
        Self::new(SyntaxKind::Constant(constant), source)
    }

    pub fn custom(custom: Custom, source: TemplateSource) -> Self {
        Self::new(SyntaxKind::Custom(custom), source)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, nodes: &[Syntax], separator: &str) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{node}")?;
    }
    Ok(())
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Syntax]) -> fmt::Result {
    f.write_str(" { ")?;
    write_list(f, body, " ")?;
    f.write_str(" }")
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SyntaxKind::Raw(raw) => write!(f, "raw({:?})", String::from_utf8_lossy(&raw.data)),
            SyntaxKind::Tag(tag) => {
                write!(f, "#{}(", tag.name)?;
                write_list(f, &tag.parameters, ", ")?;
                f.write_str(")")?;
                match &tag.body {
                    Some(body) => write_body(f, body),
                    None => Ok(()),
                }
            }
            SyntaxKind::Identifier(identifier) => write!(f, "{}", identifier.path),
            SyntaxKind::Constant(constant) => match constant {
                Constant::Bool(b) => write!(f, "{b}"),
                Constant::Int(i) => write!(f, "{i}"),
                Constant::Float(x) => write!(f, "{x:?}"),
                Constant::String(s) => write!(f, "{s:?}"),
                Constant::Interpolated(nodes) => {
                    f.write_str("\"")?;
                    write_list(f, nodes, "")?;
                    f.write_str("\"")
                }
            },
            SyntaxKind::Expression(expression) => match expression {
                Expression::Infix { op, left, right } => {
                    write!(f, "({left} {} {right})", op.symbol())
                }
                Expression::Prefix {
                    op: PrefixOperator::Not,
                    operand,
                } => write!(f, "!{operand}"),
                Expression::Postfix { op, .. } => match *op {},
            },
            SyntaxKind::Conditional(conditional) => {
                write!(f, "#if({})", conditional.condition)?;
                write_body(f, &conditional.body)?;
                let mut next = conditional.next.as_deref();
                while let Some(branch) = next {
                    write!(f, " else if({})", branch.condition)?;
                    write_body(f, &branch.body)?;
                    next = branch.next.as_deref();
                }
                Ok(())
            }
            SyntaxKind::Iterator(iteration) => {
                write!(f, "#for({} in {})", iteration.key, iteration.data)?;
                write_body(f, &iteration.body)
            }
            SyntaxKind::Embed(embed) => write!(f, "#embed({})", embed.path),
            SyntaxKind::Custom(_) => f.write_str("<custom>"),
        }
    }
}
