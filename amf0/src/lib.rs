//! This crate provides functionality for serializing and deserializing data
//! based on the Adobe AMF0 encoding specification located at
//! <https://wwwimages2.adobe.com/content/dam/acom/en/devnet/pdf/amf0-file-format-specification.pdf>
//!
//! Objects keep their properties in the order they were encoded, since RTMP peers (and the
//! metadata they send) are not always consistent about property names and some servers send
//! the same name more than once.
//!
//! # Examples
//! ```
//! use std::io::Cursor;
//! use rtmpc_amf0::{Amf0Object, Amf0Value, serialize, deserialize};
//!
//! let mut properties = Amf0Object::new();
//! properties.insert("app", Amf0Value::Number(99.0));
//! properties.insert("second", Amf0Value::Utf8String("test".to_string()));
//!
//! let input = vec![Amf0Value::Number(32.0), Amf0Value::Object(properties), Amf0Value::Boolean(true)];
//!
//! let serialized_data = serialize(&input).unwrap();
//! let mut serialized_cursor = Cursor::new(serialized_data);
//! let results = deserialize(&mut serialized_cursor).unwrap();
//!
//! assert_eq!(input, results);
//! ```

mod deserialization;
mod errors;
mod object;
mod serialization;

pub use crate::deserialization::{decode_property, decode_value, deserialize};
pub use crate::errors::{Amf0DeserializationError, Amf0SerializationError};
pub use crate::object::Amf0Object;
pub use crate::serialization::{encode, serialize};

/// An Enum representing the different supported types of Amf0 values
#[derive(PartialEq, Debug, Clone)]
pub enum Amf0Value {
    Number(f64),
    Boolean(bool),
    Utf8String(String),
    Object(Amf0Object),
    StrictArray(Vec<Amf0Value>),
    Null,
    Undefined,

    /// Milliseconds since the unix epoch plus the (usually ignored) timezone offset in minutes
    Date { millis: f64, utc_offset_minutes: i16 },
}

impl Amf0Value {
    pub fn get_number(self) -> Option<f64> {
        match self {
            Amf0Value::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_boolean(self) -> Option<bool> {
        match self {
            Amf0Value::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_string(self) -> Option<String> {
        match self {
            Amf0Value::Utf8String(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_object_properties(self) -> Option<Amf0Object> {
        match self {
            Amf0Value::Object(properties) => Some(properties),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Amf0Value::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Amf0Value::Utf8String(ref value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Amf0Object> {
        match *self {
            Amf0Value::Object(ref value) => Some(value),
            _ => None,
        }
    }

    /// Case-insensitively searches this value (and anything nested inside it) for properties
    /// named `name`, returning at most `limit` of them in encounter order.
    ///
    /// This is meant for mining loosely structured payloads, such as `onMetaData`, where the
    /// interesting values may be nested at different depths depending on the server.
    pub fn find_matching(&self, name: &str, limit: usize) -> Vec<&Amf0Value> {
        let mut results = Vec::new();
        collect_matching(self, name, limit, &mut results);
        results
    }
}

pub(crate) fn collect_matching<'a>(
    value: &'a Amf0Value,
    name: &str,
    limit: usize,
    results: &mut Vec<&'a Amf0Value>,
) {
    if results.len() >= limit {
        return;
    }

    match *value {
        Amf0Value::Object(ref object) => object.collect_matching(name, limit, results),
        Amf0Value::StrictArray(ref values) => {
            for value in values {
                collect_matching(value, name, limit, results);
                if results.len() >= limit {
                    return;
                }
            }
        }

        _ => (),
    }
}

mod markers {
    pub const NUMBER_MARKER: u8 = 0;
    pub const BOOLEAN_MARKER: u8 = 1;
    pub const STRING_MARKER: u8 = 2;
    pub const OBJECT_MARKER: u8 = 3;
    pub const MOVIE_CLIP_MARKER: u8 = 4;
    pub const NULL_MARKER: u8 = 5;
    pub const UNDEFINED_MARKER: u8 = 6;
    pub const REFERENCE_MARKER: u8 = 7;
    pub const ECMA_ARRAY_MARKER: u8 = 8;
    pub const OBJECT_END_MARKER: u8 = 9;
    pub const STRICT_ARRAY_MARKER: u8 = 10;
    pub const DATE_MARKER: u8 = 11;
    pub const LONG_STRING_MARKER: u8 = 12;
    pub const UNSUPPORTED_MARKER: u8 = 13;
    pub const RECORD_SET_MARKER: u8 = 14;
    pub const XML_DOCUMENT_MARKER: u8 = 15;
    pub const TYPED_OBJECT_MARKER: u8 = 16;
    pub const AVMPLUS_OBJECT_MARKER: u8 = 17;
    pub const UTF_8_EMPTY_MARKER: u16 = 0;
}
