//! Multi-channel RPC.
//!
//! - **Channel**: transport plumbing for one connection (post + codec)
//! - **Envelope**: request / event / response message shapes
//! - **FunctionRegistry**: local functions callable by peers
//! - **RpcGroup**: channel set, pending-call tables, dispatch and broadcast
//! - **ClientProxy**: typed calls into the client-side contract

mod channel;
mod client;
mod envelope;
mod function;
mod group;

pub use channel::{Channel, ChannelId, ChannelReceiver, NO_CHANNEL};
pub use client::{ClientFunction, ClientProxy, RefreshTag, Target};
pub use envelope::{Envelope, ErrorPayload};
pub use function::{CallContext, FunctionKind, FunctionRegistry, RegisteredFunction, RpcFunction};
pub use group::{RpcGroup, RpcGroupOptions};
