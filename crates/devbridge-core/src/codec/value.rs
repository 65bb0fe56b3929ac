//! Graph-shaped values exchanged over RPC channels.
//!
//! Arrays and objects are shared handles: cloning a [`Value`] that holds a
//! container clones the handle, not the contents. Two fields that hold the same
//! handle point at one container, which is what the flat codec preserves across
//! the wire. Cycles are allowed. Handles on a cycle keep each other alive, so a
//! cyclic graph is only freed after [`Value::break_cycles`] has cut it open.

use crate::error::{BridgeError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// A JavaScript-object-shaped value that may contain shared or cyclic references.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
}

/// Shared handle to an array.
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<Mutex<Vec<Value>>>);

/// Shared handle to an object with keys kept in sorted order.
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<Mutex<BTreeMap<String, Value>>>);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Arc::new(Mutex::new(items)))
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        lock(&self.0).get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        lock(&self.0).push(value);
    }

    /// Replace the element at `index`. Returns false if it is out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match lock(&self.0).get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) {
        lock(&self.0).clear();
    }

    /// Snapshot of the current elements (handles, not deep copies).
    pub fn to_vec(&self) -> Vec<Value> {
        lock(&self.0).clone()
    }
}

impl ObjectRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.0).get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.0).contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        lock(&self.0).insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        lock(&self.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        lock(&self.0).clear();
    }

    #[cfg(test)]
    pub(crate) fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Snapshot of the current entries in key order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        lock(&self.0)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array@{:#x}[{}]", self.addr(), self.len())
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object@{:#x}{{{}}}", self.addr(), self.len())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(a) => a.fmt(f),
            Value::Object(o) => o.fmt(f),
        }
    }
}

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        let obj = ObjectRef::new();
        for (k, v) in entries {
            obj.insert(k, v);
        }
        Value::Object(obj)
    }

    /// Build an array value.
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(ArrayRef::new(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Address of the container behind this value, if it is one.
    fn container_addr(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.addr()),
            Value::Object(o) => Some(o.addr()),
            _ => None,
        }
    }

    /// Field lookup on an object value; `None` for anything else.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Identity comparison for containers, value comparison for primitives.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }

    /// Convert a tree-shaped JSON value. Every container becomes a fresh handle.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    /// Expand into tree-shaped JSON.
    ///
    /// Shared containers are copied at every place they appear. A cycle cannot
    /// be expanded and yields [`BridgeError::Encode`].
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut path = Vec::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut Vec<usize>) -> Result<serde_json::Value> {
        match self {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) => Ok(serde_json::Value::Number(n.clone())),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Array(a) => {
                enter(path, a.addr())?;
                let items = a
                    .to_vec()
                    .iter()
                    .map(|v| v.to_json_inner(path))
                    .collect::<Result<Vec<_>>>()?;
                path.pop();
                Ok(serde_json::Value::Array(items))
            }
            Value::Object(o) => {
                enter(path, o.addr())?;
                let mut map = serde_json::Map::new();
                for (k, v) in o.entries() {
                    map.insert(k, v.to_json_inner(path)?);
                }
                path.pop();
                Ok(serde_json::Value::Object(map))
            }
        }
    }

    /// Serialize any `Serialize` type into a tree-shaped value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
        Ok(Value::from_json(serde_json::to_value(value)?))
    }

    /// Deserialize into a concrete type. Fails on cyclic values.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json()?)?)
    }
}

impl Value {
    /// Replace every link that closes a cycle with `null`.
    ///
    /// Walks depth-first from `self` in element and key order, the order the
    /// flat decoder builds in, and cuts each link back to a container still on
    /// the walk. Shared links that do not close a cycle are kept. Returns the
    /// number of links cut.
    pub fn break_cycles(&self) -> usize {
        let mut active: HashSet<usize> = HashSet::new();
        let mut finished: HashSet<usize> = HashSet::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut cut = 0;

        if let Some(frame) = Frame::open(self) {
            active.insert(frame.addr);
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            let Some((link, child)) = frame.next_child() else {
                let addr = frame.addr;
                stack.pop();
                active.remove(&addr);
                finished.insert(addr);
                continue;
            };
            let Some(addr) = child.container_addr() else {
                continue;
            };
            if active.contains(&addr) {
                frame.cut(link);
                cut += 1;
            } else if !finished.contains(&addr) {
                if let Some(next) = Frame::open(&child) {
                    active.insert(addr);
                    stack.push(next);
                }
            }
        }
        cut
    }
}

/// Where a child sits inside its parent.
enum Link {
    Index(usize),
    Key(String),
}

/// One container on the [`Value::break_cycles`] walk.
struct Frame {
    addr: usize,
    container: Value,
    children: std::vec::IntoIter<(Link, Value)>,
}

impl Frame {
    fn open(value: &Value) -> Option<Frame> {
        let (addr, children): (usize, Vec<(Link, Value)>) = match value {
            Value::Array(a) => (
                a.addr(),
                a.to_vec()
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Link::Index(i), v))
                    .collect(),
            ),
            Value::Object(o) => (
                o.addr(),
                o.entries()
                    .into_iter()
                    .map(|(k, v)| (Link::Key(k), v))
                    .collect(),
            ),
            _ => return None,
        };
        Some(Frame {
            addr,
            container: value.clone(),
            children: children.into_iter(),
        })
    }

    fn next_child(&mut self) -> Option<(Link, Value)> {
        self.children.next()
    }

    fn cut(&self, link: Link) {
        match (&self.container, link) {
            (Value::Array(a), Link::Index(i)) => {
                a.set(i, Value::Null);
            }
            (Value::Object(o), Link::Key(k)) => {
                o.insert(k, Value::Null);
            }
            _ => {}
        }
    }
}

fn enter(path: &mut Vec<usize>, addr: usize) -> Result<()> {
    if path.contains(&addr) {
        return Err(BridgeError::Encode {
            message: "cyclic value cannot be expressed as plain JSON".to_string(),
        });
    }
    path.push(addr);
    Ok(())
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}
