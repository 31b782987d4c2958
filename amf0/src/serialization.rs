//! Module contains functionality for serializing values into an
//! bytes based on the AMF0 specification
//! (http://wwwimages.adobe.com/content/dam/Adobe/en/devnet/amf/pdf/amf0-file-format-specification.pdf)

use crate::errors::Amf0SerializationError;
use crate::markers;
use crate::{Amf0Object, Amf0Value};
use byteorder::{BigEndian, WriteBytesExt};

/// Serializes values into an amf0 encoded vector of bytes
pub fn serialize(values: &[Amf0Value]) -> Result<Vec<u8>, Amf0SerializationError> {
    let mut bytes = vec![];
    for value in values {
        encode(value, &mut bytes)?;
    }

    Ok(bytes)
}

/// Appends the encoded form of a single value to the end of `bytes`
pub fn encode(value: &Amf0Value, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    match *value {
        Amf0Value::Boolean(val) => {
            serialize_bool(val, bytes);
            Ok(())
        }

        Amf0Value::Null => {
            bytes.push(markers::NULL_MARKER);
            Ok(())
        }

        Amf0Value::Undefined => {
            bytes.push(markers::UNDEFINED_MARKER);
            Ok(())
        }

        Amf0Value::Number(val) => serialize_number(val, bytes),
        Amf0Value::Utf8String(ref val) => serialize_string(val, bytes),
        Amf0Value::Object(ref val) => serialize_object(val, bytes),
        Amf0Value::StrictArray(ref val) => serialize_strict_array(val, bytes),
        Amf0Value::Date {
            millis,
            utc_offset_minutes,
        } => serialize_date(millis, utc_offset_minutes, bytes),
    }
}

fn serialize_number(value: f64, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::NUMBER_MARKER);
    bytes.write_f64::<BigEndian>(value)?;
    Ok(())
}

fn serialize_bool(value: bool, bytes: &mut Vec<u8>) {
    bytes.push(markers::BOOLEAN_MARKER);
    bytes.push(value as u8);
}

fn serialize_string(value: &str, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    if value.len() > (u16::max_value() as usize) {
        return Err(Amf0SerializationError::NormalStringTooLong);
    }

    bytes.push(markers::STRING_MARKER);
    bytes.write_u16::<BigEndian>(value.len() as u16)?;
    bytes.extend(value.as_bytes());
    Ok(())
}

fn serialize_date(
    millis: f64,
    utc_offset_minutes: i16,
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::DATE_MARKER);
    bytes.write_f64::<BigEndian>(millis)?;
    bytes.write_i16::<BigEndian>(utc_offset_minutes)?;
    Ok(())
}

fn serialize_object(
    properties: &Amf0Object,
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::OBJECT_MARKER);

    for (name, value) in properties {
        if name.is_empty() {
            return Err(Amf0SerializationError::EmptyPropertyName);
        }

        if name.len() > (u16::max_value() as usize) {
            return Err(Amf0SerializationError::PropertyNameTooLong);
        }

        bytes.write_u16::<BigEndian>(name.len() as u16)?;
        bytes.extend(name.as_bytes());
        encode(value, bytes)?;
    }

    bytes.write_u16::<BigEndian>(markers::UTF_8_EMPTY_MARKER)?;
    bytes.push(markers::OBJECT_END_MARKER);
    Ok(())
}

fn serialize_strict_array(
    array: &[Amf0Value],
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::STRICT_ARRAY_MARKER);
    bytes.write_u32::<BigEndian>(array.len() as u32)?;

    for value in array {
        encode(value, bytes)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deserialize;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    #[test]
    fn can_serialize_number() {
        let number: f64 = 332.0;

        let input = vec![Amf0Value::Number(number)];
        let result = serialize(&input).unwrap();

        let mut expected = vec![];
        expected.write_u8(markers::NUMBER_MARKER).unwrap();
        expected.write_f64::<BigEndian>(number).unwrap();

        assert_eq!(result, expected);
    }

    #[test]
    fn can_serialize_booleans() {
        let input = vec![Amf0Value::Boolean(true), Amf0Value::Boolean(false)];
        let result = serialize(&input).unwrap();

        let expected = vec![markers::BOOLEAN_MARKER, 1, markers::BOOLEAN_MARKER, 0];
        assert_eq!(result, expected);
    }

    #[test]
    fn can_serialize_string() {
        let value = "test";

        let input = vec![Amf0Value::Utf8String(value.to_string())];
        let result = serialize(&input).unwrap();

        let mut expected = vec![];
        expected.write_u8(markers::STRING_MARKER).unwrap();
        expected.write_u16::<BigEndian>(value.len() as u16).unwrap();
        expected.extend(value.as_bytes());

        assert_eq!(result, expected);
    }

    #[test]
    fn can_serialize_null_and_undefined() {
        let input = vec![Amf0Value::Null, Amf0Value::Undefined];
        let result = serialize(&input).unwrap();

        assert_eq!(result, vec![markers::NULL_MARKER, markers::UNDEFINED_MARKER]);
    }

    #[test]
    fn can_serialize_object_in_insertion_order() {
        let mut properties = Amf0Object::new();
        properties.insert("test", Amf0Value::Number(332.0));
        properties.insert("abc", Amf0Value::Null);

        let input = vec![Amf0Value::Object(properties)];
        let result = serialize(&input).unwrap();

        let mut expected = vec![];
        expected.push(markers::OBJECT_MARKER);
        expected.write_u16::<BigEndian>(4).unwrap();
        expected.extend("test".as_bytes());
        expected.push(markers::NUMBER_MARKER);
        expected.write_f64::<BigEndian>(332.0).unwrap();
        expected.write_u16::<BigEndian>(3).unwrap();
        expected.extend("abc".as_bytes());
        expected.push(markers::NULL_MARKER);
        expected
            .write_u16::<BigEndian>(markers::UTF_8_EMPTY_MARKER)
            .unwrap();
        expected.push(markers::OBJECT_END_MARKER);

        assert_eq!(result, expected);
    }

    #[test]
    fn empty_property_name_is_rejected() {
        let mut properties = Amf0Object::new();
        properties.insert("", Amf0Value::Number(1.0));
        properties.insert("b", Amf0Value::Number(2.0));

        match serialize(&[Amf0Value::Object(properties)]) {
            Err(Amf0SerializationError::EmptyPropertyName) => (),
            x => panic!("Expected EmptyPropertyName, instead received {:?}", x),
        }
    }

    #[test]
    fn nested_empty_property_name_is_rejected() {
        let mut inner = Amf0Object::new();
        inner.insert("", Amf0Value::Null);
        let mut outer = Amf0Object::new();
        outer.insert("inner", Amf0Value::Object(inner));

        let input = vec![Amf0Value::StrictArray(vec![Amf0Value::Object(outer)])];
        match serialize(&input) {
            Err(Amf0SerializationError::EmptyPropertyName) => (),
            x => panic!("Expected EmptyPropertyName, instead received {:?}", x),
        }
    }

    #[test]
    fn serialized_objects_decode_back() {
        let mut properties = Amf0Object::new();
        properties.insert("a", Amf0Value::Number(1.0));
        properties.insert("b", Amf0Value::Number(2.0));
        let input = vec![Amf0Value::Object(properties)];

        let bytes = serialize(&input).unwrap();
        let result = deserialize(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn empty_object_still_gets_end_marker() {
        let result = serialize(&[Amf0Value::Object(Amf0Object::new())]).unwrap();

        assert_eq!(result, vec![markers::OBJECT_MARKER, 0, 0, markers::OBJECT_END_MARKER]);
    }

    #[test]
    fn can_serialize_strict_array() {
        let input = vec![Amf0Value::StrictArray(vec![Amf0Value::Number(332.0)])];
        let result = serialize(&input).unwrap();

        let mut expected = vec![];
        expected.write_u8(markers::STRICT_ARRAY_MARKER).unwrap();
        expected.write_u32::<BigEndian>(1).unwrap();
        expected.write_u8(markers::NUMBER_MARKER).unwrap();
        expected.write_f64::<BigEndian>(332.0).unwrap();

        assert_eq!(result, expected);
    }

    #[test]
    fn can_serialize_date() {
        let input = Amf0Value::Date {
            millis: 12.0,
            utc_offset_minutes: 120,
        };

        let mut result = Vec::new();
        encode(&input, &mut result).unwrap();

        let mut expected = vec![markers::DATE_MARKER];
        expected.write_f64::<BigEndian>(12.0).unwrap();
        expected.write_i16::<BigEndian>(120).unwrap();

        assert_eq!(result, expected);
    }

    #[test]
    fn error_when_string_length_greater_than_u16() {
        let value = "a".repeat(u16::max_value() as usize + 1);

        let input = vec![Amf0Value::Utf8String(value)];
        match serialize(&input) {
            Err(Amf0SerializationError::NormalStringTooLong) => (),
            x => panic!("Expected NormalStringTooLong, instead received {:?}", x),
        }
    }

    #[test]
    fn error_when_property_name_greater_than_u16() {
        let mut properties = Amf0Object::new();
        properties.insert("a".repeat(u16::max_value() as usize + 1), Amf0Value::Null);

        match serialize(&[Amf0Value::Object(properties)]) {
            Err(Amf0SerializationError::PropertyNameTooLong) => (),
            x => panic!("Expected PropertyNameTooLong, instead received {:?}", x),
        }
    }

    fn random_value(rng: &mut StdRng, depth: usize) -> Amf0Value {
        let max_kind = if depth >= 3 { 6 } else { 8 };
        match rng.gen_range(0..max_kind) {
            0 => Amf0Value::Number(rng.gen_range(-1.0e9..1.0e9)),
            1 => Amf0Value::Boolean(rng.gen()),
            2 => Amf0Value::Utf8String(random_name(rng)),
            3 => Amf0Value::Null,
            4 => Amf0Value::Undefined,
            5 => Amf0Value::Date {
                millis: rng.gen_range(0..2_000_000_000_000_u64) as f64,
                utc_offset_minutes: rng.gen_range(-720..720),
            },
            6 => {
                let count = rng.gen_range(0..5);
                let mut object = Amf0Object::new();
                for _ in 0..count {
                    let name = random_name(rng);
                    let value = random_value(rng, depth + 1);
                    if name.is_empty() {
                        continue;
                    }

                    object.insert(name, value);
                }

                Amf0Value::Object(object)
            }

            _ => {
                let count = rng.gen_range(0..5);
                Amf0Value::StrictArray((0..count).map(|_| random_value(rng, depth + 1)).collect())
            }
        }
    }

    fn random_name(rng: &mut StdRng) -> String {
        let length = rng.gen_range(0..12);
        (0..length)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect()
    }

    #[test]
    fn generated_values_survive_a_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let count = rng.gen_range(1..4);
            let values: Vec<Amf0Value> = (0..count).map(|_| random_value(&mut rng, 0)).collect();

            let bytes = serialize(&values).unwrap();
            let decoded = deserialize(&mut Cursor::new(bytes)).unwrap();

            assert_eq!(decoded, values);
        }
    }
}
