use bytes::Bytes;
use rtmpc_amf0::{self, Amf0Value};
use std::io::Cursor;

use crate::messages::RtmpMessage;
use crate::messages::{MessageDeserializationError, MessageSerializationError};

pub fn serialize(
    command_name: String,
    transaction_id: f64,
    command_object: Amf0Value,
    mut additional_arguments: Vec<Amf0Value>,
) -> Result<Bytes, MessageSerializationError> {
    let mut values = vec![
        Amf0Value::Utf8String(command_name),
        Amf0Value::Number(transaction_id),
        command_object,
    ];

    values.append(&mut additional_arguments);
    let bytes = rtmpc_amf0::serialize(&values)?;

    Ok(Bytes::from(bytes))
}

/// Only the command name is required.  Servers regularly leave off the transaction id and
/// command object on notifications, so those default to `0` and `Null`.
pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    let arguments = rtmpc_amf0::deserialize(&mut cursor)?;
    let mut arguments = arguments.into_iter();

    let command_name = match arguments.next() {
        Some(Amf0Value::Utf8String(value)) => value,
        _ => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    let transaction_id = match arguments.next() {
        Some(Amf0Value::Number(value)) => value,
        None => 0.0,
        Some(_) => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    let command_object = arguments.next().unwrap_or(Amf0Value::Null);

    Ok(RtmpMessage::Amf0Command {
        command_name,
        transaction_id,
        command_object,
        additional_arguments: arguments.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::{deserialize, serialize};
    use bytes::Bytes;
    use rtmpc_amf0::{self, Amf0Object, Amf0Value};
    use std::io::Cursor;

    use crate::messages::{MessageDeserializationError, RtmpMessage};

    #[test]
    fn can_serialize_message() {
        let mut properties = Amf0Object::new();
        properties.insert("prop1", Amf0Value::Utf8String("abc".to_string()));
        properties.insert("prop2", Amf0Value::Null);

        let raw_message = serialize(
            "test".to_string(),
            23.0,
            Amf0Value::Object(properties.clone()),
            vec![Amf0Value::Boolean(true)],
        )
        .unwrap();

        let mut cursor = Cursor::new(&raw_message[..]);
        let result = rtmpc_amf0::deserialize(&mut cursor).unwrap();

        let expected = vec![
            Amf0Value::Utf8String("test".to_string()),
            Amf0Value::Number(23.0),
            Amf0Value::Object(properties),
            Amf0Value::Boolean(true),
        ];

        assert_eq!(expected, result);
    }

    #[test]
    fn can_deserialize_message() {
        let mut properties = Amf0Object::new();
        properties.insert("code", Amf0Value::Utf8String("NetStream.Play.Start".to_string()));

        let values = vec![
            Amf0Value::Utf8String("onStatus".to_string()),
            Amf0Value::Number(0.0),
            Amf0Value::Null,
            Amf0Value::Object(properties.clone()),
        ];

        let bytes = Bytes::from(rtmpc_amf0::serialize(&values).unwrap());
        let result = deserialize(bytes).unwrap();

        let expected = RtmpMessage::Amf0Command {
            command_name: "onStatus".to_string(),
            transaction_id: 0.0,
            command_object: Amf0Value::Null,
            additional_arguments: vec![Amf0Value::Object(properties)],
        };

        assert_eq!(result, expected);
    }

    #[test]
    fn short_commands_get_defaults() {
        let values = vec![Amf0Value::Utf8String("close".to_string())];
        let bytes = Bytes::from(rtmpc_amf0::serialize(&values).unwrap());

        let expected = RtmpMessage::Amf0Command {
            command_name: "close".to_string(),
            transaction_id: 0.0,
            command_object: Amf0Value::Null,
            additional_arguments: vec![],
        };

        assert_eq!(deserialize(bytes).unwrap(), expected);
    }

    #[test]
    fn command_without_name_is_invalid() {
        let values = vec![Amf0Value::Number(1.0), Amf0Value::Null];
        let bytes = Bytes::from(rtmpc_amf0::serialize(&values).unwrap());

        match deserialize(bytes) {
            Err(MessageDeserializationError::InvalidMessageFormat) => (),
            x => panic!("Expected InvalidMessageFormat, got {:?}", x),
        }
    }

    #[test]
    fn malformed_amf0_is_a_decode_error() {
        let bytes = Bytes::from(vec![0x02_u8, 0x00, 0x09, b'a']);

        match deserialize(bytes) {
            Err(MessageDeserializationError::Amf0DeserializationError(_)) => (),
            x => panic!("Expected Amf0DeserializationError, got {:?}", x),
        }
    }
}
