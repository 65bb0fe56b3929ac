//! Transport-side handle for one duplex connection.
//!
//! A [`Channel`] knows nothing about RPC semantics. It owns the sending half of
//! an unbounded queue that the transport task drains into the socket, plus the
//! codec used to turn values into wire strings. Inbound data is pushed into the
//! group by the transport through [`crate::RpcGroup::receive`].

use crate::codec::{Codec, FlatCodec, Value};
use crate::error::{BridgeError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Identity of a channel inside an RPC group.
pub type ChannelId = u64;

/// Receiving half handed to the transport: every string posted to the channel.
pub type ChannelReceiver = mpsc::UnboundedReceiver<String>;

/// Id carried by calls that did not arrive over a channel (one-shot HTTP).
/// Never assigned to a real channel.
pub const NO_CHANNEL: ChannelId = 0;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// One logical connection to a client.
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<String>,
    codec: Arc<dyn Codec>,
}

impl Channel {
    /// Create a channel with the given codec.
    ///
    /// The returned receiver yields posted strings in post order and ends once
    /// every `Channel` clone has been dropped.
    pub fn new(codec: Arc<dyn Codec>) -> (Self, ChannelReceiver) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Created channel {} ({} codec)", id, codec.name());
        (
            Self {
                id,
                outbound,
                codec,
            },
            rx,
        )
    }

    /// Create a channel using the reference-preserving flat codec.
    pub fn flat() -> (Self, ChannelReceiver) {
        Self::new(Arc::new(FlatCodec))
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Hand a wire string to the transport. Never blocks.
    pub fn post(&self, data: String) -> Result<()> {
        self.outbound
            .send(data)
            .map_err(|_| BridgeError::ChannelClosed(self.id))
    }

    /// True once the transport dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    pub fn encode(&self, value: &Value) -> Result<String> {
        self.codec.encode(value)
    }

    pub fn decode(&self, raw: &str) -> Result<Value> {
        self.codec.decode(raw)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("codec", &self.codec.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}
