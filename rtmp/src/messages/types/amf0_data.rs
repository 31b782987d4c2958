use bytes::Bytes;
use rtmpc_amf0::{self, Amf0Value};
use std::io::Cursor;

use crate::messages::RtmpMessage;
use crate::messages::{MessageDeserializationError, MessageSerializationError};

pub fn serialize(values: Vec<Amf0Value>) -> Result<Bytes, MessageSerializationError> {
    let bytes = rtmpc_amf0::serialize(&values)?;

    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(&data[..]);
    let values = rtmpc_amf0::deserialize(&mut cursor)?;

    Ok(RtmpMessage::Amf0Data { values })
}
