//! Centralized configuration for devbridge.
//!
//! Compile-time constants for the RPC layer, the HTTP/WebSocket routes and the
//! editor lookup, plus the runtime [`BridgeOptions`] handed out by `getConfig`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// RPC layer configuration.
pub struct RpcConfig;

impl RpcConfig {
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
    pub const REFRESH_EVENT: &'static str = "refresh";
    pub const MAX_ONE_SHOT_BODY_BYTES: usize = 4 * 1024 * 1024; // 4MB
    /// Longest chain of nested containers a decoded message may hold.
    pub const MAX_DECODE_DEPTH: usize = 128;
}

/// HTTP server routes.
pub struct ServerConfig;

impl ServerConfig {
    pub const HEALTH_PATH: &'static str = "/health";
    pub const WS_PATH: &'static str = "/__devbridge__/ws";
    pub const API_PATH: &'static str = "/__devbridge__/api";
    pub const PORT_ANNOUNCE_PREFIX: &'static str = "RPC_PORT=";
}

/// Editor launch configuration.
pub struct EditorConfig;

impl EditorConfig {
    /// Suffixes tried, in order, after the literal path.
    pub const EXTENSION_FALLBACKS: &'static [&'static str] = &[".js", ".mjs", ".ts"];
    pub const DEFAULT_COMMAND: &'static str = "code";
}

/// Runtime options reported to clients by `getConfig`.
///
/// Read once at startup. Keys the bridge does not interpret are preserved in
/// `extra` and echoed back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeOptions {
    /// Whether the host is asked for custom tabs.
    #[serde(default = "default_true")]
    pub custom_tabs: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            custom_tabs: true,
            extra: serde_json::Map::new(),
        }
    }
}
