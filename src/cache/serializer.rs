//! Payload serializer used for size accounting.

use serde_json::Value;

use crate::error::Result;

/// Turns a payload into the bytes whose length is charged against the
/// memory ceiling.
pub trait PayloadSerializer: Send + Sync + std::fmt::Debug {
    fn serialize(&self, data: &Value) -> Result<Vec<u8>>;

    /// Serialized byte size of `data`.
    fn size_of(&self, data: &Value) -> Result<u64> {
        Ok(self.serialize(data)?.len() as u64)
    }
}

/// Compact JSON, the same encoding the backend speaks.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl PayloadSerializer for JsonSerializer {
    fn serialize(&self, data: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(data)?)
    }
}
