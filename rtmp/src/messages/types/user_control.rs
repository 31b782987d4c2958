use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read, Write};

use crate::handshake::SWF_VERIFICATION_RESPONSE_SIZE;
use crate::messages::{MessageDeserializationError, MessageSerializationError};
use crate::messages::{RtmpMessage, UserControlEventType};

pub fn serialize(
    event_type: UserControlEventType,
    stream_id: Option<u32>,
    buffer_length: Option<u32>,
    timestamp: Option<u32>,
    swf_verification: Option<Bytes>,
) -> Result<Bytes, MessageSerializationError> {
    let mut cursor = Cursor::new(Vec::new());
    cursor.write_u16::<BigEndian>(event_type.event_id())?;

    match event_type {
        UserControlEventType::StreamBegin
        | UserControlEventType::StreamEof
        | UserControlEventType::StreamDry
        | UserControlEventType::StreamIsRecorded
        | UserControlEventType::BufferEmpty
        | UserControlEventType::BufferReady => {
            cursor.write_u32::<BigEndian>(stream_id.unwrap_or(0))?;
        }

        UserControlEventType::SetBufferLength => {
            cursor.write_u32::<BigEndian>(stream_id.unwrap_or(0))?;
            cursor.write_u32::<BigEndian>(buffer_length.unwrap_or(0))?;
        }

        UserControlEventType::PingRequest | UserControlEventType::PingResponse => {
            cursor.write_u32::<BigEndian>(timestamp.unwrap_or(0))?;
        }

        UserControlEventType::SwfVerifyRequest | UserControlEventType::Unknown(_) => (),

        UserControlEventType::SwfVerifyResponse => {
            let response = swf_verification.unwrap_or_else(Bytes::new);
            if response.len() != SWF_VERIFICATION_RESPONSE_SIZE {
                return Err(MessageSerializationError::InvalidSwfVerificationLength {
                    length: response.len(),
                });
            }

            cursor.write_all(&response[..])?;
        }
    }

    Ok(Bytes::from(cursor.into_inner()))
}

pub fn deserialize(data: Bytes) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let event_type = UserControlEventType::from_event_id(cursor.read_u16::<BigEndian>()?);

    let mut stream_id = None;
    let mut buffer_length = None;
    let mut timestamp = None;
    let mut swf_verification = None;

    match event_type {
        UserControlEventType::StreamBegin
        | UserControlEventType::StreamEof
        | UserControlEventType::StreamDry
        | UserControlEventType::StreamIsRecorded
        | UserControlEventType::BufferEmpty
        | UserControlEventType::BufferReady => {
            stream_id = Some(cursor.read_u32::<BigEndian>()?);
        }

        UserControlEventType::SetBufferLength => {
            stream_id = Some(cursor.read_u32::<BigEndian>()?);
            buffer_length = Some(cursor.read_u32::<BigEndian>()?);
        }

        UserControlEventType::PingRequest | UserControlEventType::PingResponse => {
            timestamp = Some(cursor.read_u32::<BigEndian>()?);
        }

        UserControlEventType::SwfVerifyRequest | UserControlEventType::Unknown(_) => (),

        UserControlEventType::SwfVerifyResponse => {
            let mut response = [0_u8; SWF_VERIFICATION_RESPONSE_SIZE];
            cursor.read_exact(&mut response)?;
            swf_verification = Some(Bytes::copy_from_slice(&response));
        }
    }

    Ok(RtmpMessage::UserControl {
        event_type,
        stream_id,
        buffer_length,
        timestamp,
        swf_verification,
    })
}
