//! Message envelopes carried over a channel.
//!
//! ```text
//! request   {id, method, args}
//! event     {method, args}          (no id, no response)
//! response  {id, result} | {id, error: {message, code}}
//! ```

use crate::codec::Value;
use crate::error::{BridgeError, Result};

/// Error carried by a failed response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    pub code: i32,
}

impl From<&BridgeError> for ErrorPayload {
    fn from(err: &BridgeError) -> Self {
        Self {
            message: err.to_string(),
            code: err.to_rpc_error_code(),
        }
    }
}

impl From<ErrorPayload> for BridgeError {
    fn from(payload: ErrorPayload) -> Self {
        BridgeError::Remote {
            message: payload.message,
            code: payload.code,
        }
    }
}

/// A decoded channel message.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// A call (`id` present) or a one-way event (`id` absent).
    Request {
        id: Option<Value>,
        method: String,
        args: Vec<Value>,
    },
    /// Outcome of an earlier call with the same id.
    Response {
        id: Value,
        outcome: std::result::Result<Value, ErrorPayload>,
    },
}

impl Envelope {
    pub fn request(id: u64, method: impl Into<String>, args: Vec<Value>) -> Self {
        Envelope::Request {
            id: Some(Value::from(id)),
            method: method.into(),
            args,
        }
    }

    pub fn event(method: impl Into<String>, args: Vec<Value>) -> Self {
        Envelope::Request {
            id: None,
            method: method.into(),
            args,
        }
    }

    pub fn success(id: Value, result: Value) -> Self {
        Envelope::Response {
            id,
            outcome: Ok(result),
        }
    }

    pub fn failure(id: Value, err: &BridgeError) -> Self {
        Envelope::Response {
            id,
            outcome: Err(ErrorPayload::from(err)),
        }
    }

    /// Build the value that goes through the channel's codec.
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Request { id, method, args } => {
                let mut fields = Vec::with_capacity(3);
                if let Some(id) = id {
                    fields.push(("id", id.clone()));
                }
                fields.push(("method", Value::from(method.as_str())));
                fields.push(("args", Value::array(args.clone())));
                Value::object(fields)
            }
            Envelope::Response { id, outcome } => match outcome {
                Ok(result) => Value::object([("id", id.clone()), ("result", result.clone())]),
                Err(payload) => Value::object([
                    ("id", id.clone()),
                    (
                        "error",
                        Value::object([
                            ("message", Value::from(payload.message.as_str())),
                            ("code", Value::from(payload.code as i64)),
                        ]),
                    ),
                ]),
            },
        }
    }

    /// Classify a decoded value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| BridgeError::Decode {
            message: "envelope must be an object".to_string(),
        })?;

        if let Some(method) = obj.get("method") {
            let method = method.as_str().ok_or_else(|| BridgeError::Decode {
                message: "envelope method must be a string".to_string(),
            })?;
            let args = match obj.get("args") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.to_vec(),
                Some(single) => vec![single],
            };
            let id = obj.get("id").filter(|id| !id.is_null());
            return Ok(Envelope::Request {
                id,
                method: method.to_string(),
                args,
            });
        }

        let id = obj.get("id").ok_or_else(|| BridgeError::Decode {
            message: "envelope has neither method nor id".to_string(),
        })?;

        let outcome = match obj.get("error") {
            Some(error) => Err(parse_error(&error)),
            None => Ok(obj.get("result").unwrap_or_default()),
        };
        Ok(Envelope::Response { id, outcome })
    }
}

fn parse_error(error: &Value) -> ErrorPayload {
    match error {
        Value::String(message) => ErrorPayload {
            message: message.clone(),
            code: -32603,
        },
        Value::Object(_) => ErrorPayload {
            message: error
                .get("message")
                .and_then(|m| m.as_str().map(String::from))
                .unwrap_or_else(|| "Unknown remote error".to_string()),
            code: match error.get("code") {
                Some(Value::Number(n)) => n.as_i64()
                    .and_then(|c| i32::try_from(c).ok())
                    .unwrap_or(-32603),
                _ => -32603,
            },
        },
        other => ErrorPayload {
            message: format!("{:?}", other),
            code: -32603,
        },
    }
}
