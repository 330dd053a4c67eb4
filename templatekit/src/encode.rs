//! Convert host data into a [`Value`] through serde.
//!
//! ```
//! use serde::Serialize;
//! use templatekit::{Value, encode::to_value};
//!
//! #[derive(Serialize)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! let value = to_value(&Person { name: "Alice".into(), age: 30 }).unwrap();
//! assert_eq!(value.get(&"name".into()), &Value::from("Alice"));
//! assert_eq!(value.get(&"age".into()), &Value::from(30));
//! ```

use core::fmt::Display;

use bytes::Bytes;
use serde::ser::{self, Serialize};

use crate::error::{Result, TemplateKitError};
use crate::value::{Map, Value};

/// Host types that know their template representation directly.
///
/// Use [`serialize_template_data`] as a `serialize_with` function to plug such
/// a field into a type that is otherwise encoded through serde.
pub trait TemplateDataConvertible {
    fn template_data(&self) -> Value;
}

impl TemplateDataConvertible for Value {
    fn template_data(&self) -> Value {
        self.clone()
    }
}

/// `#[serde(serialize_with = "templatekit::encode::serialize_template_data")]`
pub fn serialize_template_data<T, S>(value: &T, serializer: S) -> core::result::Result<S::Ok, S::Error>
where
    T: TemplateDataConvertible,
    S: ser::Serializer,
{
    value.template_data().serialize(serializer)
}

/// Encode `value` into a [`Value`].
///
/// Structs and maps become [`Value::Map`], sequences and tuples
/// [`Value::Array`], unit variants their name and other enum variants a
/// single-entry map keyed by the variant name.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    value.serialize(ValueSerializer)
}

impl ser::Error for TemplateKitError {
    fn custom<T: Display>(msg: T) -> Self {
        TemplateKitError::Encode {
            reason: msg.to_string(),
        }
    }
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = TemplateKitError;

    type SerializeSeq = SerializeArray;
    type SerializeTuple = SerializeArray;
    type SerializeTupleStruct = SerializeArray;
    type SerializeTupleVariant = SerializeVariant<SerializeArray>;
    type SerializeMap = SerializeObject;
    type SerializeStruct = SerializeObject;
    type SerializeStructVariant = SerializeVariant<SerializeObject>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::from(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(Value::Bytes(Bytes::copy_from_slice(v)))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value> {
        let mut map = Map::with_capacity(1);
        map.insert(variant.to_owned(), to_value(value)?);
        Ok(Value::Map(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeArray> {
        Ok(SerializeArray {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeArray> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SerializeArray> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Ok(SerializeVariant {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<SerializeObject> {
        Ok(SerializeObject {
            map: Map::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<SerializeObject> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Ok(SerializeVariant {
            variant,
            inner: self.serialize_map(Some(len))?,
        })
    }
}

struct SerializeArray {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SerializeArray {
    type Ok = Value;
    type Error = TemplateKitError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SerializeArray {
    type Ok = Value;
    type Error = TemplateKitError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeArray {
    type Ok = Value;
    type Error = TemplateKitError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

struct SerializeObject {
    map: Map,
    /// Key written by `serialize_key`, waiting for its value.
    pending_key: Option<String>,
}

impl ser::SerializeMap for SerializeObject {
    type Ok = Value;
    type Error = TemplateKitError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        let key = to_value(key)?;
        match key.as_string() {
            Some(key) => {
                self.pending_key = Some(key.into_owned());
                Ok(())
            }
            None => Err(TemplateKitError::Encode {
                reason: format!("Map keys must be strings or numbers, found {}", key.type_name()),
            }),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let Some(key) = self.pending_key.take() else {
            return Err(TemplateKitError::Encode {
                reason: "Map value serialized before its key".into(),
            });
        };
        self.map.insert(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.map))
    }
}

impl ser::SerializeStruct for SerializeObject {
    type Ok = Value;
    type Error = TemplateKitError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.map.insert(key.to_owned(), to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.map))
    }
}

/// Wraps the payload of an enum variant in a single-entry map.
struct SerializeVariant<S> {
    variant: &'static str,
    inner: S,
}

impl<S> SerializeVariant<S> {
    fn wrap(variant: &'static str, payload: Value) -> Value {
        let mut map = Map::with_capacity(1);
        map.insert(variant.to_owned(), payload);
        Value::Map(map)
    }
}

impl ser::SerializeTupleVariant for SerializeVariant<SerializeArray> {
    type Ok = Value;
    type Error = TemplateKitError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Result<Value> {
        let payload = ser::SerializeSeq::end(self.inner)?;
        Ok(Self::wrap(self.variant, payload))
    }
}

impl ser::SerializeStructVariant for SerializeVariant<SerializeObject> {
    type Ok = Value;
    type Error = TemplateKitError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Value> {
        let payload = ser::SerializeStruct::end(self.inner)?;
        Ok(Self::wrap(self.variant, payload))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Post {
        title: String,
        tags: Vec<&'static str>,
        draft: bool,
        rating: Option<f64>,
        kind: Kind,
        #[serde(serialize_with = "serialize_template_data")]
        extra: Value,
    }

    #[derive(Serialize)]
    enum Kind {
        Article,
        Link { url: String },
    }

    #[test]
    fn encodes_structs_sequences_and_enums() {
        templatekit_testhelpers::setup();
        let post = Post {
            title: "Hello".into(),
            tags: vec!["a", "b"],
            draft: false,
            rating: None,
            kind: Kind::Article,
            extra: Value::from(vec![1, 2]),
        };
        let value = to_value(&post).unwrap();
        assert_eq!(value.get(&"title".into()), &Value::from("Hello"));
        assert_eq!(value.get(&"tags.1".into()), &Value::from("b"));
        assert_eq!(value.get(&"draft".into()), &Value::Bool(false));
        assert!(value.get(&"rating".into()).is_null());
        assert_eq!(value.get(&"kind".into()), &Value::from("Article"));
        assert_eq!(value.get(&"extra.0".into()), &Value::from(1));

        let link = to_value(&Kind::Link {
            url: "https://example.com".into(),
        })
        .unwrap();
        assert_eq!(
            link.get(&"Link.url".into()),
            &Value::from("https://example.com")
        );
    }

    #[test]
    fn numeric_map_keys_become_text() {
        templatekit_testhelpers::setup();
        let mut map = BTreeMap::new();
        map.insert(404, "not found");
        let value = to_value(&map).unwrap();
        assert_eq!(value.get(&"404".into()), &Value::from("not found"));
    }

    #[test]
    fn non_scalar_keys_are_rejected() {
        templatekit_testhelpers::setup();
        let mut map = BTreeMap::new();
        map.insert(vec![1], "nope");
        let err = to_value(&map).unwrap_err();
        assert!(matches!(err, TemplateKitError::Encode { .. }));
    }
}
