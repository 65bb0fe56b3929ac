//! Error types for the devbridge core.
//!
//! Every failure the RPC layer can observe is a `BridgeError`. Errors raised by
//! local functions are turned into error envelopes for the peer; errors received
//! from the peer come back as [`BridgeError::Remote`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the devbridge core.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Wire errors
    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    // Dispatch errors
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("{message}")]
    Remote { message: String, code: i32 },

    // Channel errors
    #[error("Channel {0} closed")]
    ChannelClosed(u64),

    #[error("Channel {0} is not registered")]
    ChannelNotFound(u64),

    #[error("Call {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    // Lookup errors
    #[error("Wizard not found: {name}")]
    WizardNotFound { name: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // IO and serialization
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for devbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BridgeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC style error code.
    ///
    /// - -32700: Parse error
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Application codes:
    /// - -32000: Channel closed or call timed out
    /// - -32002: Requested wizard or file does not exist
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            BridgeError::Decode { .. } | BridgeError::Json { .. } => -32700,
            BridgeError::MethodNotFound { .. } => -32601,
            BridgeError::InvalidParams { .. } => -32602,
            BridgeError::Remote { code, .. } => *code,

            BridgeError::ChannelClosed(_)
            | BridgeError::ChannelNotFound(_)
            | BridgeError::Timeout { .. } => -32000,

            BridgeError::WizardNotFound { .. }
            | BridgeError::FileNotFound(_) => -32002,

            _ => -32603,
        }
    }
}
