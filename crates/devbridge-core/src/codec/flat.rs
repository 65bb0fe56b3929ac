//! Reference-preserving flat encoding.
//!
//! The wire form is a JSON array of slots. Slot 0 holds the root. Strings and
//! containers each live in their own slot and are referenced from their parent
//! by the slot index written as a JSON string; null, booleans and numbers stay
//! inline.
//!
//! ```text
//! a = {name: "a"}; a.self = a      =>   [{"name":"1","self":"0"},"a"]
//! ```
//!
//! A container seen twice reuses its first slot, so shared references and
//! cycles survive the round trip with their identity intact.
//!
//! Decoding rejects any chain of container links longer than
//! [`RpcConfig::MAX_DECODE_DEPTH`]. Links that close a cycle do not count.

use super::value::{ArrayRef, ObjectRef, Value};
use crate::config::RpcConfig;
use crate::error::{BridgeError, Result};
use serde_json::Value as Json;
use std::collections::HashMap;

/// Encode a value graph into its flat wire form.
pub fn encode(value: &Value) -> Result<String> {
    let mut encoder = Encoder::default();
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => {
            let root = encoder.inline(value);
            encoder.slots.push(root);
        }
        _ => {
            encoder.slot_for(value);
        }
    }
    Ok(serde_json::to_string(&encoder.slots)?)
}

/// Decode a flat wire string back into a value graph.
pub fn decode(input: &str) -> Result<Value> {
    let slots: Vec<Json> = serde_json::from_str(input).map_err(|e| BridgeError::Decode {
        message: format!("expected a JSON array of slots: {}", e),
    })?;
    if slots.is_empty() {
        return Err(BridgeError::Decode {
            message: "empty slot table".to_string(),
        });
    }

    let mut decoder = Decoder {
        slots: &slots,
        built: vec![None; slots.len()],
        heights: vec![0; slots.len()],
        depth: 0,
    };
    match decoder.slot(0) {
        Ok((value, _)) => Ok(value),
        Err(e) => {
            decoder.discard();
            Err(e)
        }
    }
}

#[derive(Default)]
struct Encoder {
    slots: Vec<Json>,
    containers: HashMap<usize, usize>,
    strings: HashMap<String, usize>,
}

impl Encoder {
    /// Slot index for a string or container, allocating one on first sight.
    fn slot_for(&mut self, value: &Value) -> usize {
        match value {
            Value::String(s) => {
                if let Some(&index) = self.strings.get(s) {
                    return index;
                }
                let index = self.slots.len();
                self.slots.push(Json::String(s.clone()));
                self.strings.insert(s.clone(), index);
                index
            }
            Value::Array(arr) => {
                if let Some(&index) = self.containers.get(&arr.addr()) {
                    return index;
                }
                let index = self.reserve(arr.addr());
                let items = arr.to_vec().iter().map(|v| self.inline(v)).collect();
                self.slots[index] = Json::Array(items);
                index
            }
            Value::Object(obj) => {
                if let Some(&index) = self.containers.get(&obj.addr()) {
                    return index;
                }
                let index = self.reserve(obj.addr());
                let mut map = serde_json::Map::new();
                for (k, v) in obj.entries() {
                    let encoded = self.inline(&v);
                    map.insert(k, encoded);
                }
                self.slots[index] = Json::Object(map);
                index
            }
            // Primitives never occupy a slot of their own below the root.
            other => {
                let index = self.slots.len();
                let encoded = self.inline(other);
                self.slots.push(encoded);
                index
            }
        }
    }

    fn reserve(&mut self, addr: usize) -> usize {
        let index = self.slots.len();
        self.slots.push(Json::Null);
        self.containers.insert(addr, index);
        index
    }

    /// Form a value takes inside its parent.
    fn inline(&mut self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            _ => Json::String(self.slot_for(value).to_string()),
        }
    }
}

struct Decoder<'a> {
    slots: &'a [Json],
    built: Vec<Option<Value>>,
    /// Longest chain of links below each finished container; 0 while in progress.
    heights: Vec<usize>,
    depth: usize,
}

impl Decoder<'_> {
    /// Value of a slot and the height of the chain it starts.
    fn slot(&mut self, index: usize) -> Result<(Value, usize)> {
        if let Some(value) = &self.built[index] {
            return Ok((value.clone(), self.heights[index]));
        }

        let slots = self.slots;
        match &slots[index] {
            Json::String(s) => {
                let value = Value::String(s.clone());
                self.built[index] = Some(value.clone());
                Ok((value, 0))
            }
            Json::Array(items) => {
                self.enter()?;
                let arr = ArrayRef::default();
                // Registered before the children so back-references resolve to it.
                self.built[index] = Some(Value::Array(arr.clone()));
                let mut below = 0;
                for item in items {
                    let (child, height) = self.resolve(item)?;
                    below = below.max(height);
                    arr.push(child);
                }
                let height = self.leave(index, below)?;
                Ok((Value::Array(arr), height))
            }
            Json::Object(map) => {
                self.enter()?;
                let obj = ObjectRef::new();
                self.built[index] = Some(Value::Object(obj.clone()));
                let mut below = 0;
                for (k, item) in map {
                    let (child, height) = self.resolve(item)?;
                    below = below.max(height);
                    obj.insert(k.clone(), child);
                }
                let height = self.leave(index, below)?;
                Ok((Value::Object(obj), height))
            }
            primitive => Ok((Value::from_json(primitive.clone()), 0)),
        }
    }

    fn resolve(&mut self, item: &Json) -> Result<(Value, usize)> {
        match item {
            Json::String(reference) => {
                let index: usize = reference.parse().map_err(|_| BridgeError::Decode {
                    message: format!("invalid slot reference {:?}", reference),
                })?;
                if index >= self.slots.len() {
                    return Err(BridgeError::Decode {
                        message: format!(
                            "slot reference {} out of range (table has {} slots)",
                            index,
                            self.slots.len()
                        ),
                    });
                }
                self.slot(index)
            }
            Json::Array(_) | Json::Object(_) => Err(BridgeError::Decode {
                message: "containers must be referenced by slot, not nested inline".to_string(),
            }),
            primitive => Ok((Value::from_json(primitive.clone()), 0)),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > RpcConfig::MAX_DECODE_DEPTH {
            return Err(too_deep());
        }
        Ok(())
    }

    fn leave(&mut self, index: usize, below: usize) -> Result<usize> {
        self.depth -= 1;
        let height = below + 1;
        if height > RpcConfig::MAX_DECODE_DEPTH {
            return Err(too_deep());
        }
        self.heights[index] = height;
        Ok(height)
    }

    /// Empty every container built so far so a half-decoded cycle is freed.
    fn discard(&mut self) {
        for value in self.built.drain(..).flatten() {
            match value {
                Value::Array(arr) => arr.clear(),
                Value::Object(obj) => obj.clear(),
                _ => {}
            }
        }
    }
}

fn too_deep() -> BridgeError {
    BridgeError::Decode {
        message: format!(
            "containers nested deeper than {} levels",
            RpcConfig::MAX_DECODE_DEPTH
        ),
    }
}
