use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;

use crate::messages::RtmpMessage;
use crate::messages::{MessageDeserializationError, MessageSerializationError};

pub fn serialize(size: u32) -> Result<Bytes, MessageSerializationError> {
    let mut cursor = Cursor::new(Vec::new());
    cursor.write_u32::<BigEndian>(size)?;

    Ok(Bytes::from(cursor.into_inner()))
}

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let size = cursor.read_u32::<BigEndian>()?;

    Ok(RtmpMessage::ServerBandwidth { size })
}

#[cfg(test)]
mod tests {
    use super::{deserialize, serialize};
    use bytes::Bytes;

    use crate::messages::RtmpMessage;

    #[test]
    fn can_serialize_message() {
        let raw_message = serialize(2_500_000).unwrap();
        assert_eq!(&raw_message[..], &[0x00_u8, 0x26, 0x25, 0xa0]);
    }

    #[test]
    fn can_deserialize_message() {
        let result = deserialize(Bytes::from(vec![0x00_u8, 0x26, 0x25, 0xa0])).unwrap();
        assert_eq!(result, RtmpMessage::ServerBandwidth { size: 2_500_000 });
    }
}
