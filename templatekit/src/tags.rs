//! Built-in tags.
//!
//! | name | usage |
//! |---|---|
//! | `""` | `#(value)`: print, HTML-escaped |
//! | `get` | `#get(value)`: print without escaping |
//! | `contains` | `#contains(array, item)` |
//! | `lowercase`, `uppercase`, `capitalize` | `#lowercase(text)` |
//! | `count` | `#count(array_or_map)` |
//! | `set`, `var` | `#set("key", value)` or `#set("key") { body }` |
//! | `date` | `#date(unix_seconds, "[year]-[month]-[day]")` |
//! | `comment` | `#comment() { ignored }` |

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::FutureExt;
use parking_lot::Mutex;
use time::OffsetDateTime;
use time::format_description::{self, OwnedFormatItem};

use crate::error::Result;
use crate::escape::html_escape;
use crate::path::TemplatePath;
use crate::tag::{TagContext, TagFuture, TagRegistry, TagRenderer};
use crate::value::Value;

/// Format used by `date` when none is given.
pub const DEFAULT_DATE_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

/// [`UserInfo`](crate::UserInfo) key under which `date` keeps parsed formats.
pub const DATE_FORMAT_CACHE_KEY: &str = "templatekit.date.formats";

/// A fresh registry holding every built-in tag.
pub fn default_tags() -> TagRegistry {
    let mut tags = TagRegistry::new();
    tags.register_fn("", print)
        .register_fn("get", raw)
        .register_fn("contains", contains)
        .register_fn("lowercase", lowercase)
        .register_fn("uppercase", uppercase)
        .register_fn("capitalize", capitalize)
        .register_fn("count", count)
        .register("set", Var)
        .register("var", Var)
        .register_fn("date", date)
        .register_fn("comment", comment);
    tags
}

fn single_string(tag: &TagContext) -> Result<String> {
    tag.require_parameter_count(1)?;
    Ok(tag
        .parameter(0)
        .as_string()
        .map(|s| s.into_owned())
        .unwrap_or_default())
}

/// Print a parameter, HTML-escaping it first.
pub fn print(tag: &TagContext) -> Result<Value> {
    tag.require_no_body()?;
    let text = single_string(tag)?;
    Ok(Value::String(html_escape(&text).into_owned()))
}

/// Print a parameter without escaping it.
pub fn raw(tag: &TagContext) -> Result<Value> {
    tag.require_no_body()?;
    Ok(Value::String(single_string(tag)?))
}

/// Whether the array in the first parameter holds the second. Anything other
/// than an array contains nothing.
pub fn contains(tag: &TagContext) -> Result<Value> {
    tag.require_parameter_count(2)?;
    let needle = tag.parameter(1);
    Ok(Value::Bool(
        tag.parameter(0)
            .as_array()
            .is_some_and(|items| items.iter().any(|item| item == needle)),
    ))
}

pub fn lowercase(tag: &TagContext) -> Result<Value> {
    Ok(Value::String(single_string(tag)?.to_lowercase()))
}

pub fn uppercase(tag: &TagContext) -> Result<Value> {
    Ok(Value::String(single_string(tag)?.to_uppercase()))
}

/// Upper-case the first letter of every word and lower-case the rest.
pub fn capitalize(tag: &TagContext) -> Result<Value> {
    let text = single_string(tag)?;
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;
    for c in text.chars() {
        if c.is_whitespace() {
            word_start = true;
            out.push(c);
        } else if word_start {
            word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    Ok(Value::String(out))
}

/// Number of items in an array or entries in a map; null for anything else.
pub fn count(tag: &TagContext) -> Result<Value> {
    tag.require_parameter_count(1)?;
    Ok(match tag.parameter(0) {
        Value::Array(items) => Value::from(items.len()),
        Value::Map(map) => Value::from(map.len()),
        _ => Value::Null,
    })
}

/// Renders nothing, whatever its parameters or body.
pub fn comment(_tag: &TagContext) -> Result<Value> {
    Ok(Value::Null)
}

type DateFormats = Mutex<HashMap<String, Arc<OwnedFormatItem>>>;

/// Format Unix seconds with a `time` format description.
pub fn date(tag: &TagContext) -> Result<Value> {
    if !(1..=2).contains(&tag.parameters.len()) {
        return Err(tag.error(format!(
            "Invalid parameter count: {}/2",
            tag.parameters.len()
        )));
    }
    let Some(seconds) = tag.parameter(0).as_float() else {
        return Err(tag.error("Expected a Unix timestamp in seconds"));
    };
    let pattern = match tag.parameter(1) {
        Value::Null => DEFAULT_DATE_FORMAT.to_owned(),
        other => match other.as_string() {
            Some(pattern) => pattern.into_owned(),
            None => return Err(tag.error("Date format must be a string")),
        },
    };

    let formats = tag
        .context
        .user_info()
        .get_or_insert_with(DATE_FORMAT_CACHE_KEY, DateFormats::default);
    let format = {
        let mut formats = formats.lock();
        match formats.get(&pattern) {
            Some(format) => format.clone(),
            None => {
                let parsed = format_description::parse_owned::<2>(&pattern)
                    .map_err(|err| tag.error(format!("Invalid date format: {err}")))?;
                let parsed = Arc::new(parsed);
                formats.insert(pattern, parsed.clone());
                parsed
            }
        }
    };

    let nanos = (seconds * 1_000_000_000.0) as i128;
    let date = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|err| tag.error(err.to_string()))?;
    let text = date
        .format(&*format)
        .map_err(|err| tag.error(err.to_string()))?;
    Ok(Value::String(text))
}

/// Store a value in the current context.
///
/// `#set("key", value)` stores `value`; `#set("key") { body }` stores the
/// rendered body. Keys are paths, so `#set("user.name", x)` works too.
#[derive(Debug, Clone, Copy, Default)]
pub struct Var;

impl TagRenderer for Var {
    fn render<'a>(&'a self, tag: &'a TagContext) -> TagFuture<'a> {
        async move {
            let count = tag.parameters.len();
            if !(1..=2).contains(&count) {
                return Err(tag.error(format!("Invalid parameter count: {count}/2")));
            }
            let Some(key) = tag.parameter(0).as_string().map(|s| s.into_owned()) else {
                return Err(tag.error("Unsupported key type"));
            };
            let value = if count == 1 {
                Value::String(tag.serialize_body().await?)
            } else {
                tag.require_no_body()?;
                tag.parameter(1).clone()
            };
            tag.context
                .try_set(&TemplatePath::parse(&key), value)
                .map_err(|err| tag.error(err.to_string()))?;
            Ok(Value::Null)
        }
        .boxed()
    }
}
