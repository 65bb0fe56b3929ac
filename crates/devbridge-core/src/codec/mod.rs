//! Wire codecs for RPC channels.
//!
//! A channel is parameterized by a [`Codec`]. [`FlatCodec`] is the default and
//! preserves shared and cyclic references; [`JsonCodec`] emits plain JSON for
//! peers that only speak tree-shaped payloads.

mod flat;
mod value;

pub use flat::{decode, encode};
pub use value::{ArrayRef, ObjectRef, Value};

use crate::error::Result;

/// Encoder/decoder pair used by a channel.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<String>;

    fn decode(&self, raw: &str) -> Result<Value>;
}

/// Reference-preserving slot codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatCodec;

impl Codec for FlatCodec {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn encode(&self, value: &Value) -> Result<String> {
        flat::encode(value)
    }

    fn decode(&self, raw: &str) -> Result<Value> {
        flat::decode(raw)
    }
}

/// Plain JSON codec. Shared references are duplicated and cycles are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(&value.to_json()?)?)
    }

    fn decode(&self, raw: &str) -> Result<Value> {
        let json: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| crate::BridgeError::Decode {
                message: e.to_string(),
            })?;
        Ok(Value::from_json(json))
    }
}
