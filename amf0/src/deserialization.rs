//! This module contains functionality to deserialize values from bytes
//! that were encoded via the AMF0 specification
//! (http://wwwimages.adobe.com/content/dam/Adobe/en/devnet/amf/pdf/amf0-file-format-specification.pdf)

use crate::errors::Amf0DeserializationError;
use crate::markers;
use crate::{Amf0Object, Amf0Value};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

const MAX_NESTING_DEPTH: usize = 64;

struct ObjectProperty {
    label: String,
    value: Amf0Value,
}

/// Turns any readable byte stream and converts it into an array of AMF0 values
pub fn deserialize<R: Read>(bytes: &mut R) -> Result<Vec<Amf0Value>, Amf0DeserializationError> {
    let mut results = vec![];

    loop {
        match read_next_value(bytes, 0)? {
            Some(x) => results.push(x),
            None => break,
        };
    }

    Ok(results)
}

/// Decodes exactly one value from the start of the slice, returning it along with the number
/// of bytes it took up.  The slice length is the maximum number of bytes the value may use.
pub fn decode_value(bytes: &[u8]) -> Result<(Amf0Value, usize), Amf0DeserializationError> {
    let mut cursor = Cursor::new(bytes);
    match read_next_value(&mut cursor, 0)? {
        Some(value) => Ok((value, cursor.position() as usize)),
        None => Err(Amf0DeserializationError::UnexpectedEof),
    }
}

/// Decodes a single named value (a 2 byte length prefixed name followed by a value), as found
/// inside objects.
pub fn decode_property(
    bytes: &[u8],
) -> Result<(String, Amf0Value, usize), Amf0DeserializationError> {
    let mut cursor = Cursor::new(bytes);
    match parse_object_property(&mut cursor, 0)? {
        Some(property) => Ok((property.label, property.value, cursor.position() as usize)),
        None => Err(Amf0DeserializationError::UnexpectedEmptyObjectPropertyName),
    }
}

fn read_next_value<R: Read>(
    bytes: &mut R,
    depth: usize,
) -> Result<Option<Amf0Value>, Amf0DeserializationError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Amf0DeserializationError::NestingTooDeep {
            max_depth: MAX_NESTING_DEPTH,
        });
    }

    let mut buffer: [u8; 1] = [0];
    let bytes_read = bytes.read(&mut buffer)?;

    if bytes_read == 0 {
        return Ok(None);
    }

    if buffer[0] == markers::OBJECT_END_MARKER {
        return Ok(None);
    }

    match buffer[0] {
        markers::BOOLEAN_MARKER => parse_bool(bytes).map(Some),
        markers::NULL_MARKER => Ok(Some(Amf0Value::Null)),
        markers::UNDEFINED_MARKER => Ok(Some(Amf0Value::Undefined)),
        markers::NUMBER_MARKER => parse_number(bytes).map(Some),
        markers::OBJECT_MARKER => parse_object(bytes, depth).map(Some),
        markers::ECMA_ARRAY_MARKER => parse_ecma_array(bytes, depth).map(Some),
        markers::STRING_MARKER => parse_string(bytes).map(Some),
        markers::LONG_STRING_MARKER => parse_long_string(bytes).map(Some),
        markers::STRICT_ARRAY_MARKER => parse_strict_array(bytes, depth).map(Some),
        markers::DATE_MARKER => parse_date(bytes).map(Some),
        marker => Err(unsupported_marker_error(marker)),
    }
}

fn unsupported_marker_error(marker: u8) -> Amf0DeserializationError {
    let name = match marker {
        markers::MOVIE_CLIP_MARKER => "movie clip",
        markers::REFERENCE_MARKER => "reference",
        markers::UNSUPPORTED_MARKER => "unsupported",
        markers::RECORD_SET_MARKER => "record set",
        markers::XML_DOCUMENT_MARKER => "xml document",
        markers::TYPED_OBJECT_MARKER => "typed object",
        markers::AVMPLUS_OBJECT_MARKER => "AMF3 switch",
        _ => return Amf0DeserializationError::UnknownMarker { marker },
    };

    Amf0DeserializationError::UnsupportedMarker { marker, name }
}

fn parse_number<R: Read>(bytes: &mut R) -> Result<Amf0Value, Amf0DeserializationError> {
    let number = bytes.read_f64::<BigEndian>()?;
    Ok(Amf0Value::Number(number))
}

fn parse_bool<R: Read>(bytes: &mut R) -> Result<Amf0Value, Amf0DeserializationError> {
    let value = bytes.read_u8()?;
    Ok(Amf0Value::Boolean(value != 0))
}

fn parse_string<R: Read>(bytes: &mut R) -> Result<Amf0Value, Amf0DeserializationError> {
    let length = bytes.read_u16::<BigEndian>()?;
    read_utf8(bytes, length as usize).map(Amf0Value::Utf8String)
}

fn parse_long_string<R: Read>(bytes: &mut R) -> Result<Amf0Value, Amf0DeserializationError> {
    let length = bytes.read_u32::<BigEndian>()?;
    read_utf8(bytes, length as usize).map(Amf0Value::Utf8String)
}

fn read_utf8<R: Read>(bytes: &mut R, length: usize) -> Result<String, Amf0DeserializationError> {
    // Don't trust the declared length for the allocation, a corrupt 4 byte length could
    // otherwise request gigabytes before the read fails.
    let mut buffer = Vec::new();
    let read = bytes.by_ref().take(length as u64).read_to_end(&mut buffer)?;
    if read < length {
        return Err(Amf0DeserializationError::UnexpectedEof);
    }

    Ok(String::from_utf8(buffer)?)
}

fn parse_date<R: Read>(bytes: &mut R) -> Result<Amf0Value, Amf0DeserializationError> {
    let millis = bytes.read_f64::<BigEndian>()?;
    let utc_offset_minutes = bytes.read_i16::<BigEndian>()?;

    Ok(Amf0Value::Date {
        millis,
        utc_offset_minutes,
    })
}

fn parse_object<R: Read>(
    bytes: &mut R,
    depth: usize,
) -> Result<Amf0Value, Amf0DeserializationError> {
    let mut properties = Amf0Object::new();

    loop {
        match parse_object_property(bytes, depth + 1)? {
            Some(property) => properties.insert(property.label, property.value),
            None => break,
        };
    }

    Ok(Amf0Value::Object(properties))
}

fn parse_ecma_array<R: Read>(
    bytes: &mut R,
    depth: usize,
) -> Result<Amf0Value, Amf0DeserializationError> {
    // ECMA arrays are string keyed and terminated with the same 0x000009 sequence objects use,
    // so the count is not reliable enough to drive parsing.  Treat them as objects.
    let _associative_count = bytes.read_u32::<BigEndian>()?;
    parse_object(bytes, depth)
}

fn parse_strict_array<R: Read>(
    bytes: &mut R,
    depth: usize,
) -> Result<Amf0Value, Amf0DeserializationError> {
    let array_count = bytes.read_u32::<BigEndian>()?;
    let mut values: Vec<Amf0Value> = Vec::new();

    for _ in 0..array_count {
        match read_next_value(bytes, depth + 1)? {
            Some(value) => values.push(value),
            None => return Err(Amf0DeserializationError::UnexpectedEof),
        };
    }

    Ok(Amf0Value::StrictArray(values))
}

fn parse_object_property<R: Read>(
    bytes: &mut R,
    depth: usize,
) -> Result<Option<ObjectProperty>, Amf0DeserializationError> {
    let label_length = bytes.read_u16::<BigEndian>()?;
    if label_length == 0 {
        // Next byte should be the end of object marker.  We need to read this
        // to make sure we progress the current position.
        let byte = bytes.read_u8()?;
        if byte != markers::OBJECT_END_MARKER {
            return Err(Amf0DeserializationError::UnexpectedEmptyObjectPropertyName);
        }

        return Ok(None);
    }

    let label = read_utf8(bytes, label_length as usize)?;

    match read_next_value(bytes, depth)? {
        None => Err(Amf0DeserializationError::UnexpectedEof),
        Some(property_value) => Ok(Some(ObjectProperty {
            label,
            value: property_value,
        })),
    }
}
