use std::{io, string};
use thiserror::Error;

/// Errors that can occur while decoding AMF0 values
#[derive(Debug, Error)]
pub enum Amf0DeserializationError {
    #[error("Encountered unknown marker: {marker}")]
    UnknownMarker { marker: u8 },

    /// Markers that are valid AMF0 but are not supported by this decoder (movie clips,
    /// references, record sets, xml documents, typed objects and the switch to AMF3).
    #[error("Encountered the unsupported {name} marker ({marker})")]
    UnsupportedMarker { marker: u8, name: &'static str },

    #[error("Unexpected empty object property name")]
    UnexpectedEmptyObjectPropertyName,

    #[error("Hit end of the byte buffer but was expecting more data")]
    UnexpectedEof,

    #[error("Values were nested deeper than the allowed {max_depth} levels")]
    NestingTooDeep { max_depth: usize },

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    FromUtf8Error(#[from] string::FromUtf8Error),
}

/// Errors that can occur while encoding AMF0 values
#[derive(Debug, Error)]
pub enum Amf0SerializationError {
    #[error("String length greater than 65,535")]
    NormalStringTooLong,

    #[error("Object property name length greater than 65,535")]
    PropertyNameTooLong,

    /// An empty name would be read back as the end of the object
    #[error("Object property names cannot be empty")]
    EmptyPropertyName,

    #[error("{0}")]
    Io(#[from] io::Error),
}
