//! Tree-walking evaluation of parsed templates.

use core::cmp::Ordering;
use std::borrow::Cow;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use tracing::trace;

use crate::ast::{
    Conditional, Constant, Expression, InfixOperator, Iteration, PrefixOperator, Syntax,
    SyntaxKind,
};
use crate::context::TemplateContext;
use crate::error::{Result, TemplateKitError};
use crate::renderer::TemplateRenderer;
use crate::source::TemplateSource;
use crate::tag::{TagContext, TagRegistry};
use crate::value::Value;

/// How many templates may embed each other before rendering is aborted.
pub const MAX_EMBED_DEPTH: usize = 32;

/// Evaluates syntax nodes against a [`TemplateContext`].
///
/// Siblings are evaluated in source order so that a tag writing to the context
/// is seen by the nodes after it. Values a tag leaves pending are awaited
/// together once the whole node list has been evaluated.
#[derive(Clone)]
pub struct TemplateSerializer {
    tags: Arc<TagRegistry>,
    renderer: Option<TemplateRenderer>,
    depth: usize,
}

impl TemplateSerializer {
    /// A serializer without embed support.
    pub fn new(tags: impl Into<Arc<TagRegistry>>) -> Self {
        Self {
            tags: tags.into(),
            renderer: None,
            depth: 0,
        }
    }

    /// A serializer whose `#embed` nodes are loaded through `renderer`.
    pub(crate) fn for_renderer(renderer: TemplateRenderer, depth: usize) -> Self {
        Self {
            tags: renderer.tags().clone(),
            renderer: Some(renderer),
            depth,
        }
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// Number of embeds between the top-level template and this serializer.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Render `nodes` to text.
    pub async fn serialize(&self, nodes: &[Syntax], context: &TemplateContext) -> Result<String> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            values.push(self.render(node, context).await?);
        }
        let values = future::try_join_all(values.into_iter().map(Value::resolve)).await?;

        let mut out = String::new();
        for (node, value) in nodes.iter().zip(&values) {
            flatten(value, &mut out, &node.source)?;
        }
        Ok(out)
    }

    /// Render each node in order, returning their (possibly pending) values as
    /// an array.
    pub async fn render_nodes(&self, nodes: &[Syntax], context: &TemplateContext) -> Result<Value> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            values.push(self.render(node, context).await?);
        }
        Ok(Value::Array(values))
    }

    /// Evaluate one node.
    pub fn render<'a>(
        &'a self,
        node: &'a Syntax,
        context: &'a TemplateContext,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            match &node.kind {
                SyntaxKind::Raw(raw) => Ok(Value::Bytes(raw.data.clone())),
                SyntaxKind::Constant(constant) => match constant {
                    Constant::Bool(b) => Ok(Value::Bool(*b)),
                    Constant::Int(i) => Ok(Value::Int(*i)),
                    Constant::Float(f) => Ok(Value::Float(*f)),
                    Constant::String(s) => Ok(Value::String(s.clone())),
                    Constant::Interpolated(nodes) => {
                        Ok(Value::String(self.serialize(nodes, context).await?))
                    }
                },
                SyntaxKind::Identifier(identifier) => Ok(context.get(&identifier.path)),
                SyntaxKind::Expression(expression) => {
                    self.render_expression(expression, context).await
                }
                SyntaxKind::Conditional(conditional) => {
                    self.render_conditional(conditional, context).await
                }
                SyntaxKind::Iterator(iteration) => {
                    self.render_iteration(iteration, &node.source, context)
                        .await
                }
                SyntaxKind::Embed(embed) => {
                    let path = self.resolved(&embed.path, context).await?;
                    let Some(path) = path.as_string().map(Cow::into_owned) else {
                        return Err(TemplateKitError::serialize(
                            format!("Embed path must be a string, found {}", path.type_name()),
                            &node.source,
                        ));
                    };
                    self.embed(&path, &node.source, context).await
                }
                SyntaxKind::Tag(tag) => {
                    let Some(renderer) = self.tags.get(&tag.name) else {
                        return Err(TemplateKitError::MissingTag {
                            name: tag.name.clone(),
                            location: node.source.clone(),
                        });
                    };
                    trace!(tag = %tag.name, source = %node.source, "dispatching tag");

                    let mut parameters = Vec::with_capacity(tag.parameters.len());
                    for parameter in &tag.parameters {
                        parameters.push(self.resolved(parameter, context).await?);
                    }
                    let tag_context = TagContext {
                        name: tag.name.clone(),
                        parameters,
                        body: tag.body.clone(),
                        source: node.source.clone(),
                        context: context.clone(),
                        serializer: self.clone(),
                    };
                    renderer.render(&tag_context).await
                }
                SyntaxKind::Custom(custom) => custom.call(context),
            }
        }
        .boxed()
    }

    /// Evaluate `node` and wait for everything inside the result.
    async fn resolved(&self, node: &Syntax, context: &TemplateContext) -> Result<Value> {
        self.render(node, context).await?.resolve().await
    }

    async fn render_expression(
        &self,
        expression: &Expression,
        context: &TemplateContext,
    ) -> Result<Value> {
        match expression {
            Expression::Infix { op, left, right } => {
                let left = self.resolved(left, context).await?;
                let right = self.resolved(right, context).await?;
                Ok(evaluate_infix(*op, &left, &right))
            }
            Expression::Prefix {
                op: PrefixOperator::Not,
                operand,
            } => {
                let operand = self.resolved(operand, context).await?;
                Ok(Value::Bool(!operand.is_truthy()))
            }
            Expression::Postfix { op, .. } => match *op {},
        }
    }

    async fn render_conditional(
        &self,
        conditional: &Conditional,
        context: &TemplateContext,
    ) -> Result<Value> {
        let mut branch = Some(conditional);
        while let Some(current) = branch {
            if self.resolved(&current.condition, context).await?.is_truthy() {
                return self.render_nodes(&current.body, &context.fork()).await;
            }
            branch = current.next.as_deref();
        }
        Ok(Value::Null)
    }

    async fn render_iteration(
        &self,
        iteration: &Iteration,
        source: &TemplateSource,
        context: &TemplateContext,
    ) -> Result<Value> {
        let key = self.resolved(&iteration.key, context).await?;
        let Some(key) = key.as_string().map(Cow::into_owned) else {
            return Err(TemplateKitError::serialize(
                "Could not convert iterator key to string",
                source,
            ));
        };
        let items = match self.resolved(&iteration.data, context).await? {
            Value::Null => return Ok(Value::Null),
            Value::Array(items) => items,
            other => {
                return Err(TemplateKitError::serialize(
                    format!(
                        "Could not convert iterator data to array, found {}",
                        other.type_name()
                    ),
                    source,
                ));
            }
        };

        let count = items.len();
        let body = &iteration.body;
        let rendered = future::try_join_all(items.into_iter().enumerate().map(|(index, item)| {
            let context = context.derive([
                (key.clone(), item),
                ("index".to_owned(), Value::from(index)),
                ("isFirst".to_owned(), Value::Bool(index == 0)),
                ("isLast".to_owned(), Value::Bool(index + 1 == count)),
            ]);
            async move { self.render_nodes(body, &context).await }
        }))
        .await?;
        Ok(Value::Array(rendered))
    }

    async fn embed(
        &self,
        path: &str,
        source: &TemplateSource,
        context: &TemplateContext,
    ) -> Result<Value> {
        let Some(renderer) = &self.renderer else {
            return Err(TemplateKitError::serialize(
                "Embedding requires a renderer",
                source,
            ));
        };
        if self.depth >= MAX_EMBED_DEPTH {
            return Err(TemplateKitError::serialize(
                format!("Embeds nested deeper than {MAX_EMBED_DEPTH} levels"),
                source,
            ));
        }
        trace!(path, depth = self.depth + 1, "embedding template");
        let output = renderer
            .render_nested(path, context.clone(), self.depth + 1)
            .await?;
        Ok(Value::String(output))
    }
}

impl core::fmt::Debug for TemplateSerializer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TemplateSerializer")
            .field("tags", &self.tags)
            .field("embeds", &self.renderer.is_some())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Append the textual form of a fully resolved value.
fn flatten(value: &Value, out: &mut String, source: &TemplateSource) -> Result<()> {
    match value {
        Value::Null => {}
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {
            if let Some(text) = value.as_string() {
                out.push_str(&text);
            }
        }
        Value::Bytes(bytes) => match core::str::from_utf8(bytes) {
            Ok(text) => out.push_str(text),
            Err(_) => {
                return Err(TemplateKitError::serialize(
                    "Unable to serialize non-UTF-8 bytes",
                    source,
                ));
            }
        },
        Value::Array(items) => {
            for item in items {
                flatten(item, out, source)?;
            }
        }
        Value::Map(_) => {
            return Err(TemplateKitError::serialize(
                "Unable to serialize a map; select one of its keys",
                source,
            ));
        }
        Value::Pending(_) | Value::Lazy(_) => {
            return Err(TemplateKitError::serialize(
                "Unable to serialize an unresolved value",
                source,
            ));
        }
    }
    Ok(())
}

/// Apply a binary operator. Both operands are already evaluated; anything
/// without a meaningful result (mismatched types, overflow, division by zero)
/// is `Null`.
pub fn evaluate_infix(op: InfixOperator, left: &Value, right: &Value) -> Value {
    match op {
        InfixOperator::Equal => Value::Bool(left == right),
        InfixOperator::NotEqual => Value::Bool(left != right),
        InfixOperator::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        InfixOperator::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        InfixOperator::Less
        | InfixOperator::Greater
        | InfixOperator::LessOrEqual
        | InfixOperator::GreaterOrEqual => match compare(left, right) {
            Some(ordering) => Value::Bool(match op {
                InfixOperator::Less => ordering == Ordering::Less,
                InfixOperator::Greater => ordering == Ordering::Greater,
                InfixOperator::LessOrEqual => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            }),
            None => Value::Null,
        },
        InfixOperator::Add
        | InfixOperator::Subtract
        | InfixOperator::Multiply
        | InfixOperator::Divide
        | InfixOperator::Modulo => arithmetic(op, left, right),
    }
}

fn arithmetic(op: InfixOperator, left: &Value, right: &Value) -> Value {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        let result = match op {
            InfixOperator::Add => a.checked_add(b),
            InfixOperator::Subtract => a.checked_sub(b),
            InfixOperator::Multiply => a.checked_mul(b),
            InfixOperator::Divide => a.checked_div(b),
            InfixOperator::Modulo => a.checked_rem(b),
            _ => None,
        };
        return result.map_or(Value::Null, Value::Int);
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        let result = match op {
            InfixOperator::Add => a + b,
            InfixOperator::Subtract => a - b,
            InfixOperator::Multiply => a * b,
            InfixOperator::Divide | InfixOperator::Modulo if b == 0.0 => return Value::Null,
            InfixOperator::Divide => a / b,
            InfixOperator::Modulo => a % b,
            _ => return Value::Null,
        };
        return Value::Float(result);
    }
    Value::Null
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return a.partial_cmp(&b);
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic() {
        templatekit_testhelpers::setup();
        let eval = |op, a: i64, b: i64| evaluate_infix(op, &Value::from(a), &Value::from(b));
        assert!(matches!(eval(InfixOperator::Add, 2, 3), Value::Int(5)));
        assert!(matches!(eval(InfixOperator::Divide, 7, 2), Value::Int(3)));
        assert!(matches!(eval(InfixOperator::Modulo, 7, 2), Value::Int(1)));
        assert!(eval(InfixOperator::Divide, 1, 0).is_null());
        assert!(eval(InfixOperator::Add, i64::MAX, 1).is_null());
    }

    #[test]
    fn mixed_arithmetic_uses_floats() {
        templatekit_testhelpers::setup();
        let result = evaluate_infix(InfixOperator::Multiply, &Value::from(1.5), &Value::from("2"));
        assert!(matches!(result, Value::Float(f) if f == 3.0));
        assert!(
            evaluate_infix(InfixOperator::Divide, &Value::from(1.5), &Value::from(0)).is_null()
        );
        assert!(
            evaluate_infix(InfixOperator::Add, &Value::from("a"), &Value::from("b")).is_null()
        );
    }

    #[test]
    fn comparisons() {
        templatekit_testhelpers::setup();
        let lt = |a: Value, b: Value| evaluate_infix(InfixOperator::Less, &a, &b);
        assert_eq!(lt(Value::from(1), Value::from(2)), Value::Bool(true));
        assert_eq!(lt(Value::from("10"), Value::from(9)), Value::Bool(false));
        assert_eq!(lt(Value::from("apple"), Value::from("banana")), Value::Bool(true));
        assert!(lt(Value::Null, Value::from(1)).is_null());
        assert_eq!(
            evaluate_infix(InfixOperator::GreaterOrEqual, &Value::from(2.5), &Value::from(2.5)),
            Value::Bool(true)
        );
    }

    #[test]
    fn logic_uses_truthiness() {
        templatekit_testhelpers::setup();
        let and = evaluate_infix(InfixOperator::And, &Value::from("no"), &Value::from(1));
        let or = evaluate_infix(InfixOperator::Or, &Value::from("no"), &Value::from(1));
        assert_eq!(and, Value::Bool(false));
        assert_eq!(or, Value::Bool(true));
        assert_eq!(
            evaluate_infix(InfixOperator::Equal, &Value::from(1), &Value::from("1")),
            Value::Bool(true)
        );
    }
}
