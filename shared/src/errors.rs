//! Shared error types for the solver scheduling system

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed for {event}: {message}")]
    DeserializationError { event: String, message: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Message protocol error: {message}")]
    ProtocolError { message: String },
}

impl SharedError {
    pub fn protocol(message: impl Into<String>) -> Self {
        SharedError::ProtocolError {
            message: message.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
