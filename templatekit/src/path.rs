//! Paths into a [`Value`] tree.

use core::fmt;
use core::str::FromStr;

use tracing::trace;

use crate::value::{Map, Value};

/// How far past the end of an array a write may land. Longer gaps are
/// rejected instead of being padded with `Null`.
pub const MAX_ARRAY_PADDING: usize = 4096;

/// A write that [`Value::try_set`] refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetError {
    #[error("Index {index} is too far past the end of an array of length {len}")]
    IndexOutOfReach { index: usize, len: usize },
}

/// One step of a [`TemplatePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Map key.
    Key(String),
    /// Array index.
    Index(usize),
}

impl PathSegment {
    /// Index-like segments become [`PathSegment::Index`].
    pub fn parse(text: &str) -> Self {
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = text.parse() {
                return PathSegment::Index(index);
            }
        }
        PathSegment::Key(text.to_owned())
    }
}

/// A dotted path such as `user.friends.0.name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TemplatePath {
    segments: Vec<PathSegment>,
}

impl TemplatePath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Split `text` on periods. Empty components are skipped.
    pub fn parse(text: &str) -> Self {
        Self {
            segments: text
                .split('.')
                .filter(|part| !part.is_empty())
                .map(PathSegment::parse)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }
}

impl FromStr for TemplatePath {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for TemplatePath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

static NULL: Value = Value::Null;

impl Value {
    /// Look up `path`, returning `None` on any absent key, out-of-range index
    /// or shape mismatch.
    pub fn lookup(&self, path: &TemplatePath) -> Option<&Value> {
        let mut current = self;
        for segment in path.segments() {
            current = match (current, segment) {
                (Value::Map(map), PathSegment::Key(key)) => map.get(key)?,
                (Value::Map(map), PathSegment::Index(index)) => map.get(&index.to_string())?,
                (Value::Array(items), PathSegment::Index(index)) => items.get(*index)?,
                (Value::Array(items), PathSegment::Key(key)) => {
                    items.get(key.parse::<usize>().ok()?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Like [`lookup`](Self::lookup), with `Null` standing in for anything absent.
    pub fn get(&self, path: &TemplatePath) -> &Value {
        self.lookup(path).unwrap_or(&NULL)
    }

    /// Store `value` at `path`, creating intermediate containers as needed.
    ///
    /// Containers of the wrong shape are replaced and arrays are padded with
    /// `Null`, so `get` at the same path afterwards yields `value`. Fails
    /// without touching `self` when an index lies more than
    /// [`MAX_ARRAY_PADDING`] past the end of its array.
    pub fn try_set(&mut self, path: &TemplatePath, value: Value) -> Result<(), SetError> {
        self.check_reach(path.segments())?;
        let mut current = self;
        for segment in path.segments() {
            current = current.child_mut(segment);
        }
        *current = value;
        Ok(())
    }

    /// [`try_set`](Self::try_set) for paths known to be in reach; a
    /// rejected write is dropped.
    pub fn set(&mut self, path: &TemplatePath, value: Value) {
        if let Err(error) = self.try_set(path, value) {
            trace!(%path, %error, "dropping write");
        }
    }

    /// Walks `segments` the way `child_mut` would, without mutating.
    fn check_reach(&self, segments: &[PathSegment]) -> Result<(), SetError> {
        let Some((segment, rest)) = segments.split_first() else {
            return Ok(());
        };
        let index = match segment {
            PathSegment::Index(index) if !matches!(self, Value::Map(_)) => Some(*index),
            PathSegment::Key(key) if matches!(self, Value::Array(_)) => key.parse().ok(),
            _ => None,
        };
        let Some(index) = index else {
            let child = match (self, segment) {
                (Value::Map(map), PathSegment::Key(key)) => map.get(key),
                (Value::Map(map), PathSegment::Index(index)) => map.get(&index.to_string()),
                _ => None,
            };
            return child.unwrap_or(&NULL).check_reach(rest);
        };
        let items: &[Value] = match self {
            Value::Array(items) => items,
            _ => &[],
        };
        if index.checked_sub(items.len()).is_some_and(|gap| gap > MAX_ARRAY_PADDING) {
            return Err(SetError::IndexOutOfReach {
                index,
                len: items.len(),
            });
        }
        items.get(index).unwrap_or(&NULL).check_reach(rest)
    }

    fn child_mut(&mut self, segment: &PathSegment) -> &mut Value {
        match segment {
            PathSegment::Key(key) => match key.parse::<usize>() {
                Ok(index) if matches!(self, Value::Array(_)) => slot(self.force_array(), index),
                _ => self.force_map().entry(key.clone()).or_insert(Value::Null),
            },
            PathSegment::Index(index) if matches!(self, Value::Map(_)) => self
                .force_map()
                .entry(index.to_string())
                .or_insert(Value::Null),
            PathSegment::Index(index) => slot(self.force_array(), *index),
        }
    }

    fn force_map(&mut self) -> &mut Map {
        if !matches!(self, Value::Map(_)) {
            *self = Value::Map(Map::new());
        }
        match self {
            Value::Map(map) => map,
            _ => unreachable!(),
        }
    }

    fn force_array(&mut self) -> &mut Vec<Value> {
        if !matches!(self, Value::Array(_)) {
            *self = Value::Array(Vec::new());
        }
        match self {
            Value::Array(items) => items,
            _ => unreachable!(),
        }
    }
}

/// Callers check the index against [`MAX_ARRAY_PADDING`] first.
fn slot(items: &mut Vec<Value>, index: usize) -> &mut Value {
    if items.len() <= index {
        items.resize(index + 1, Value::Null);
    }
    &mut items[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_and_indexes() {
        templatekit_testhelpers::setup();
        let path = TemplatePath::parse("user.friends.0.name");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("user".into()),
                PathSegment::Key("friends".into()),
                PathSegment::Index(0),
                PathSegment::Key("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "user.friends[0].name");
        assert!(TemplatePath::parse("").is_empty());
    }

    #[test]
    fn get_returns_null_for_anything_missing() {
        templatekit_testhelpers::setup();
        let mut data = Value::Null;
        data.set(&"user.name".into(), Value::from("Ada"));
        assert_eq!(data.get(&"user.name".into()), &Value::from("Ada"));
        assert!(data.get(&"user.age".into()).is_null());
        assert!(data.get(&"user.name.first".into()).is_null());
        assert!(data.get(&"missing.0".into()).is_null());
        assert!(data.lookup(&"user.age".into()).is_none());
    }

    #[test]
    fn set_materializes_and_pads() {
        templatekit_testhelpers::setup();
        let mut data = Value::from("scalar");
        let path = TemplatePath::parse("list.2.title");
        data.set(&path, Value::from("third"));
        assert_eq!(data.get(&path), &Value::from("third"));

        let list = data.get(&"list".into()).as_array().unwrap();
        assert_eq!(list.len(), 3);
        assert!(list[0].is_null());
        assert!(list[1].is_null());
    }

    #[test]
    fn set_overwrites_mismatched_shapes() {
        templatekit_testhelpers::setup();
        let mut data = Value::Null;
        data.set(&"a".into(), Value::from(1));
        data.set(&"a.b".into(), Value::from(2));
        assert_eq!(data.get(&"a.b".into()), &Value::from(2));
    }

    #[test]
    fn far_indexes_are_refused() {
        templatekit_testhelpers::setup();
        let mut data = Value::Null;
        data.set(&"list.1".into(), Value::from("kept"));

        let far = format!("list.{}", usize::MAX);
        let err = data.try_set(&TemplatePath::parse(&far), Value::from(1)).unwrap_err();
        assert_eq!(
            err,
            SetError::IndexOutOfReach {
                index: usize::MAX,
                len: 2
            }
        );
        let err = data
            .try_set(&"list.4000000000000.name".into(), Value::from(1))
            .unwrap_err();
        assert!(err.to_string().contains("too far past the end"), "{err}");

        // nothing was touched, and `set` drops the write
        data.set(&"fresh.5000".into(), Value::from(1));
        assert_eq!(data.get(&"list".into()).as_array().unwrap().len(), 2);
        assert!(data.lookup(&"fresh".into()).is_none());

        let edge = format!("list.{}", 2 + MAX_ARRAY_PADDING);
        data.try_set(&TemplatePath::parse(&edge), Value::from("end")).unwrap();
        assert_eq!(data.get(&TemplatePath::parse(&edge)), &Value::from("end"));
    }

    #[test]
    fn index_segments_reach_into_maps() {
        templatekit_testhelpers::setup();
        let mut data = Value::Null;
        data.set(&"codes".into(), Value::Map(Map::new()));
        data.set(&"codes.404".into(), Value::from("not found"));
        assert_eq!(data.get(&"codes.404".into()), &Value::from("not found"));
        assert!(data.get(&"codes".into()).as_map().is_some());
    }
}
