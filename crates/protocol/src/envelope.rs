//! `MessagePack` envelope codec
//!
//! Every message on the wire is a two-element array `[name, payload]`. A
//! missing payload decodes as nil.

use rmpv::Value;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Cursor;
use thiserror::Error;

use crate::messages::CommandName;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("frame is not an envelope array")]
    NotAnEnvelope,
    #[error("envelope has no command name")]
    MissingName,
    #[error("bad payload for {command}: {message}")]
    Payload { command: String, message: String },
}

impl ProtocolError {
    pub fn payload(command: &CommandName, message: impl Into<String>) -> Self {
        Self::Payload {
            command: command.to_string(),
            message: message.into(),
        }
    }
}

/// A named command and its payload
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub name: CommandName,
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope from any serializable payload
    ///
    /// Structs are written as maps with field names so either peer can read
    /// them without sharing a schema.
    pub fn new<P: Serialize + ?Sized>(name: CommandName, payload: &P) -> Result<Self, ProtocolError> {
        let bytes = rmp_serde::to_vec_named(payload).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        let payload = rmpv::decode::read_value(&mut Cursor::new(bytes))
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(Self { name, payload })
    }

    pub const fn from_value(name: CommandName, payload: Value) -> Self {
        Self { name, payload }
    }

    pub fn bare(name: CommandName) -> Self {
        Self::from_value(name, Value::Nil)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let frame = Value::Array(vec![
            Value::String(self.name.as_str().into()),
            self.payload.clone(),
        ]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &frame).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let value = rmpv::decode::read_value(&mut Cursor::new(frame))
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;

        let Value::Array(mut items) = value else {
            return Err(ProtocolError::NotAnEnvelope);
        };
        if items.is_empty() || items.len() > 2 {
            return Err(ProtocolError::NotAnEnvelope);
        }

        let payload = if items.len() == 2 {
            items.pop().unwrap_or(Value::Nil)
        } else {
            Value::Nil
        };
        let name = items
            .pop()
            .and_then(|v| v.as_str().map(CommandName::from))
            .ok_or(ProtocolError::MissingName)?;

        Ok(Self { name, payload })
    }

    /// Deserialize the payload into a typed struct
    pub fn payload<P: DeserializeOwned>(&self) -> Result<P, ProtocolError> {
        rmpv::ext::from_value(self.payload.clone())
            .map_err(|e| ProtocolError::payload(&self.name, e.to_string()))
    }
}
