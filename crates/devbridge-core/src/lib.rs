//! Devbridge Core - RPC bridge between a dev server and its browser clients.
//!
//! This crate holds everything that does not depend on a particular transport:
//! the reference-preserving wire codec, the multi-channel RPC group, and the
//! state collector that mirrors host application state for clients. The HTTP
//! and WebSocket endpoints live in the `devbridge-rpc` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use devbridge_core::{create_server_group, Channel, CollectorConfig, NoopHost, StateCollector};
//! use std::sync::Arc;
//!
//! let collector = StateCollector::new(Arc::new(NoopHost), CollectorConfig::default());
//! let group = create_server_group(&collector, Default::default());
//!
//! // One channel per connected client; the receiver feeds the transport.
//! let (channel, mut outbound) = Channel::flat();
//! let id = group.add_channel(channel);
//! group.receive(id, r#"[{"id":1,"method":"2","args":"3"},"getComponents",[]]"#);
//! ```

pub mod codec;
pub mod config;
pub mod editor;
pub mod error;
pub mod functions;
pub mod host;
pub mod rpc;
pub mod state;

// Re-export commonly used types
pub use codec::{Codec, FlatCodec, JsonCodec, Value};
pub use config::{BridgeOptions, EditorConfig, RpcConfig, ServerConfig};
pub use editor::EditorTarget;
pub use error::{BridgeError, Result};
pub use functions::{create_server_group, server_functions};
pub use host::{Host, NoopHost};
pub use rpc::{
    CallContext, Channel, ChannelId, ChannelReceiver, FunctionKind, FunctionRegistry, RefreshTag,
    RpcGroup, RpcGroupOptions, NO_CHANNEL,
};
pub use state::{CollectorConfig, StateCollector};
