//! Multi-channel RPC group.
//!
//! One registry of local functions serves every connected channel. Each channel
//! has its own table of outbound calls awaiting a response, keyed by a
//! correlation id that is unique among that channel's outstanding calls.
//!
//! # Locking
//!
//! All membership and pending-call state sits behind one `std::sync::Mutex`.
//! The lock is only held for synchronous bookkeeping and is never held across
//! an `.await`, so a handler suspended on a nested call does not stall other
//! channels.

use super::channel::{Channel, ChannelId};
use super::envelope::Envelope;
use super::function::{CallContext, FunctionKind, FunctionRegistry, RegisteredFunction};
use crate::codec::Value;
use crate::config::RpcConfig;
use crate::error::{BridgeError, Result};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Tunables for an [`RpcGroup`].
#[derive(Debug, Clone)]
pub struct RpcGroupOptions {
    /// Upper bound on how long an outbound call waits for its response.
    /// `None` waits until the response arrives or the channel is removed.
    pub call_timeout: Option<Duration>,
}

impl Default for RpcGroupOptions {
    fn default() -> Self {
        Self {
            call_timeout: Some(RpcConfig::DEFAULT_CALL_TIMEOUT),
        }
    }
}

struct PendingCall {
    method: String,
    reply: oneshot::Sender<Result<Value>>,
}

struct ChannelEntry {
    channel: Channel,
    pending: HashMap<u64, PendingCall>,
    next_call_id: u64,
}

impl ChannelEntry {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            pending: HashMap::new(),
            next_call_id: 1,
        }
    }
}

struct GroupInner {
    functions: FunctionRegistry,
    channels: Mutex<BTreeMap<ChannelId, ChannelEntry>>,
    options: RpcGroupOptions,
}

/// Shared handle to the set of channels and the local function registry.
///
/// Cloning is cheap; all clones refer to the same group.
#[derive(Clone)]
pub struct RpcGroup {
    inner: Arc<GroupInner>,
}

impl RpcGroup {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self::with_options(functions, RpcGroupOptions::default())
    }

    pub fn with_options(functions: FunctionRegistry, options: RpcGroupOptions) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                functions,
                channels: Mutex::new(BTreeMap::new()),
                options,
            }),
        }
    }

    fn channels(&self) -> MutexGuard<'_, BTreeMap<ChannelId, ChannelEntry>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.inner.functions
    }

    pub fn options(&self) -> &RpcGroupOptions {
        &self.inner.options
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Start routing broadcasts and calls to `channel`.
    pub fn add_channel(&self, channel: Channel) -> ChannelId {
        let id = channel.id();
        let count = {
            let mut channels = self.channels();
            channels.insert(id, ChannelEntry::new(channel));
            channels.len()
        };
        info!("Channel {} joined ({} active)", id, count);
        id
    }

    /// Stop routing to `id` and fail every call still waiting on it.
    ///
    /// Returns false if the channel was not registered.
    pub fn remove_channel(&self, id: ChannelId) -> bool {
        let removed = self.channels().remove(&id);
        let Some(entry) = removed else {
            return false;
        };

        let abandoned = entry.pending.len();
        for (call_id, pending) in entry.pending {
            debug!(
                "Failing call {} ({}) on removed channel {}",
                call_id, pending.method, id
            );
            let _ = pending.reply.send(Err(BridgeError::ChannelClosed(id)));
        }
        info!(
            "Channel {} left ({} pending calls rejected)",
            id, abandoned
        );
        true
    }

    pub fn has_channel(&self, id: ChannelId) -> bool {
        self.channels().contains_key(&id)
    }

    /// Active channel ids in ascending order.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels().keys().copied().collect()
    }

    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    /// Number of outbound calls on `id` still waiting for a response.
    pub fn pending_calls(&self, id: ChannelId) -> usize {
        self.channels()
            .get(&id)
            .map(|entry| entry.pending.len())
            .unwrap_or(0)
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Call `method` on the peer behind one channel and wait for its result.
    ///
    /// A cyclic result stays alive until [`Value::break_cycles`] is called on it.
    pub async fn call(
        &self,
        channel_id: ChannelId,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let (call_id, reply) = {
            let mut channels = self.channels();
            let entry = channels
                .get_mut(&channel_id)
                .ok_or(BridgeError::ChannelNotFound(channel_id))?;

            let call_id = entry.next_call_id;
            entry.next_call_id += 1;

            let wire = entry
                .channel
                .encode(&Envelope::request(call_id, method, args).to_value())?;

            let (tx, rx) = oneshot::channel();
            entry.pending.insert(
                call_id,
                PendingCall {
                    method: method.to_string(),
                    reply: tx,
                },
            );
            if let Err(e) = entry.channel.post(wire) {
                entry.pending.remove(&call_id);
                return Err(e);
            }
            (call_id, rx)
        };

        debug!("Call {} {} sent on channel {}", call_id, method, channel_id);

        let outcome = match self.inner.options.call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, reply).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.forget(channel_id, call_id);
                    warn!(
                        "Call {} {} on channel {} timed out",
                        call_id, method, channel_id
                    );
                    return Err(BridgeError::Timeout {
                        method: method.to_string(),
                        timeout,
                    });
                }
            },
            None => reply.await,
        };

        // A dropped sender means the entry was discarded with its channel.
        outcome.unwrap_or(Err(BridgeError::ChannelClosed(channel_id)))
    }

    /// Post a one-way event to a single channel.
    pub fn notify(&self, channel_id: ChannelId, event: &str, args: Vec<Value>) -> Result<()> {
        let channel = self
            .channels()
            .get(&channel_id)
            .map(|entry| entry.channel.clone())
            .ok_or(BridgeError::ChannelNotFound(channel_id))?;
        let wire = channel.encode(&Envelope::event(event, args).to_value())?;
        channel.post(wire)
    }

    /// Post a one-way event to every active channel.
    ///
    /// Membership is snapshotted when the broadcast starts; a channel added
    /// while it runs may or may not see it. Returns the number of channels the
    /// event was handed to.
    pub fn broadcast(&self, event: &str, args: Vec<Value>) -> usize {
        let targets: Vec<Channel> = self
            .channels()
            .values()
            .map(|entry| entry.channel.clone())
            .collect();
        if targets.is_empty() {
            debug!("Broadcast {} skipped: no channels", event);
            return 0;
        }

        let envelope = Envelope::event(event, args).to_value();
        // Encoded once per codec in use.
        let mut encoded: HashMap<&'static str, String> = HashMap::new();
        let mut delivered = 0;

        for channel in targets {
            let codec = channel.codec().name();
            let wire = match encoded.get(codec) {
                Some(wire) => wire.clone(),
                None => match channel.encode(&envelope) {
                    Ok(wire) => {
                        encoded.insert(codec, wire.clone());
                        wire
                    }
                    Err(e) => {
                        warn!("Broadcast {} not encodable for channel {}: {}", event, channel.id(), e);
                        continue;
                    }
                },
            };
            match channel.post(wire) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Broadcast {} dropped: {}", event, e),
            }
        }

        debug!("Broadcast {} to {} channels", event, delivered);
        delivered
    }

    fn forget(&self, channel_id: ChannelId, call_id: u64) {
        if let Some(entry) = self.channels().get_mut(&channel_id) {
            entry.pending.remove(&call_id);
        }
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Feed one raw message delivered by the transport of `channel_id`.
    ///
    /// Responses settle their pending call before this returns. Requests are
    /// dispatched onto their own task, started in delivery order. Malformed
    /// input is logged and dropped; nothing here fails the channel.
    ///
    /// Cycles in a request are cut once its handler has finished and the
    /// response is posted. A cyclic response is handed to the caller intact.
    pub fn receive(&self, channel_id: ChannelId, raw: &str) {
        let channel = match self.channels().get(&channel_id) {
            Some(entry) => entry.channel.clone(),
            None => {
                debug!("Dropping message for unknown channel {}", channel_id);
                return;
            }
        };

        let message = match channel.decode(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed message on channel {}: {}", channel_id, e);
                return;
            }
        };
        let envelope = match Envelope::from_value(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed message on channel {}: {}", channel_id, e);
                message.break_cycles();
                return;
            }
        };

        match envelope {
            Envelope::Response { id, outcome } => {
                if !self.settle(channel_id, &id, outcome.map_err(BridgeError::from)) {
                    message.break_cycles();
                }
            }
            Envelope::Request { id, method, args } => {
                self.dispatch(channel_id, id, method, args, message)
            }
        }
    }

    /// Hand a response to its waiting caller. Returns false if nobody was waiting.
    fn settle(&self, channel_id: ChannelId, id: &Value, outcome: Result<Value>) -> bool {
        let pending = id.as_u64().and_then(|call_id| {
            self.channels()
                .get_mut(&channel_id)
                .and_then(|entry| entry.pending.remove(&call_id))
        });

        match pending {
            Some(call) => {
                debug!("Call {:?} {} settled on channel {}", id, call.method, channel_id);
                // The caller may have stopped waiting; that is not an error here.
                call.reply.send(outcome).is_ok()
            }
            None => {
                warn!(
                    "Response for unknown call {:?} on channel {}",
                    id, channel_id
                );
                false
            }
        }
    }

    fn dispatch(
        &self,
        channel_id: ChannelId,
        id: Option<Value>,
        method: String,
        args: Vec<Value>,
        message: Value,
    ) {
        let Some(function) = self.inner.functions.get(&method).cloned() else {
            warn!("Unknown method {} on channel {}", method, channel_id);
            if let Some(id) = id {
                self.respond(
                    channel_id,
                    id,
                    Err(BridgeError::MethodNotFound { method }),
                );
            }
            message.break_cycles();
            return;
        };

        let group = self.clone();
        tokio::spawn(async move {
            group.run(channel_id, id, method, args, function).await;
            message.break_cycles();
        });
    }

    async fn run(
        &self,
        channel_id: ChannelId,
        id: Option<Value>,
        method: String,
        args: Vec<Value>,
        function: RegisteredFunction,
    ) {
        let ctx = CallContext {
            channel: channel_id,
            group: self.clone(),
        };
        let result = AssertUnwindSafe(function.handler.invoke(ctx, args))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("Handler {} panicked", method);
                Err(BridgeError::Other(format!("{} panicked", method)))
            });

        match (function.kind, id) {
            (FunctionKind::Call, Some(id)) => self.respond(channel_id, id, result),
            (_, _) => {
                if let Err(e) = result {
                    warn!("One-way {} failed on channel {}: {}", method, channel_id, e);
                }
            }
        }
    }

    /// Post the outcome of a request back on the channel that sent it.
    fn respond(&self, channel_id: ChannelId, id: Value, result: Result<Value>) {
        let channel = match self.channels().get(&channel_id) {
            Some(entry) => entry.channel.clone(),
            None => {
                debug!("Channel {} gone before response {:?}", channel_id, id);
                return;
            }
        };

        if let Err(e) = &result {
            debug!("Responding with error on channel {}: {}", channel_id, e);
        }

        let envelope = match &result {
            Ok(value) => Envelope::success(id.clone(), value.clone()),
            Err(e) => Envelope::failure(id.clone(), e),
        };
        let wire = channel.encode(&envelope.to_value()).or_else(|e| {
            warn!("Result not encodable on channel {}: {}", channel_id, e);
            channel.encode(&Envelope::failure(id, &e).to_value())
        });

        match wire {
            Ok(wire) => {
                if let Err(e) = channel.post(wire) {
                    debug!("Response dropped: {}", e);
                }
            }
            Err(e) => error!("Failed to encode error response: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ObjectRef;
    use crate::rpc::channel::ChannelReceiver;
    use serde_json::json;

    fn echo_registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry
            .register_fn("echo", FunctionKind::Call, |_ctx, args| async move {
                Ok(args.into_iter().next().unwrap_or_default())
            })
            .register_fn("fail", FunctionKind::Call, |_ctx, _args| async move {
                Err(BridgeError::Other("test failure".to_string()))
            })
            .register_fn("panic", FunctionKind::Call, |_ctx, _args| async move {
                if true {
                    panic!("handler exploded");
                }
                Ok(Value::Null)
            });
        registry
    }

    async fn next_json(rx: &mut ChannelReceiver) -> serde_json::Value {
        let raw = rx.recv().await.expect("channel closed");
        crate::codec::decode(&raw).unwrap().to_json().unwrap()
    }

    fn request(id: u64, method: &str, args: serde_json::Value) -> String {
        let args = Value::from_json(args).as_array().unwrap().to_vec();
        crate::codec::encode(&Envelope::request(id, method, args).to_value()).unwrap()
    }

    #[tokio::test]
    async fn test_inbound_call_responds_on_same_channel() {
        let group = RpcGroup::new(echo_registry());
        let (a, mut rx_a) = Channel::flat();
        let (b, mut rx_b) = Channel::flat();
        let a_id = group.add_channel(a);
        group.add_channel(b);

        group.receive(a_id, &request(5, "echo", json!([{"x": 1}])));

        assert_eq!(next_json(&mut rx_a).await, json!({"id": 5, "result": {"x": 1}}));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_method_gets_error_envelope() {
        let group = RpcGroup::new(echo_registry());
        let (a, mut rx) = Channel::flat();
        let id = group.add_channel(a);

        group.receive(id, &request(1, "doesNotExist", json!([])));

        let response = next_json(&mut rx).await;
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_become_error_envelopes() {
        let group = RpcGroup::new(echo_registry());
        let (a, mut rx) = Channel::flat();
        let id = group.add_channel(a);

        group.receive(id, &request(1, "fail", json!([])));
        let response = next_json(&mut rx).await;
        assert_eq!(response["error"]["message"], json!("test failure"));

        group.receive(id, &request(2, "panic", json!([])));
        let response = next_json(&mut rx).await;
        assert_eq!(response["id"], json!(2));
        assert!(response.get("error").is_some());

        // Channel still usable afterwards.
        group.receive(id, &request(3, "echo", json!(["ok"])));
        assert_eq!(next_json(&mut rx).await, json!({"id": 3, "result": "ok"}));
    }

    #[tokio::test]
    async fn test_malformed_message_dropped_without_response() {
        let group = RpcGroup::new(echo_registry());
        let (a, mut rx) = Channel::flat();
        let id = group.add_channel(a);

        group.receive(id, "{{not a slot table");
        group.receive(id, &request(9, "echo", json!([1])));

        // The only thing posted is the answer to the well-formed request.
        assert_eq!(next_json(&mut rx).await, json!({"id": 9, "result": 1}));
        assert!(group.has_channel(id));
    }

    #[tokio::test]
    async fn test_deeply_nested_message_dropped() {
        let group = RpcGroup::new(echo_registry());
        let (a, mut rx) = Channel::flat();
        let id = group.add_channel(a);

        // {"method":"echo","args":[[[...]]]} nested far past the decode limit.
        let levels = 200_000;
        let mut slots = vec![json!({"method": "1", "args": "2"}), json!("echo")];
        for level in 0..levels {
            slots.push(json!([(level + 3).to_string()]));
        }
        slots.push(json!([]));
        group.receive(id, &serde_json::to_string(&slots).unwrap());

        group.receive(id, &request(4, "echo", json!(["still here"])));
        assert_eq!(next_json(&mut rx).await, json!({"id": 4, "result": "still here"}));
        assert!(group.has_channel(id));
    }

    #[tokio::test]
    async fn test_cyclic_request_released_after_dispatch() {
        let kept: Arc<Mutex<Option<ObjectRef>>> = Arc::default();
        let mut registry = FunctionRegistry::new();
        {
            let kept = kept.clone();
            registry.register_fn("keep", FunctionKind::Call, move |_ctx, args| {
                if let Some(Value::Object(obj)) = args.first() {
                    *kept.lock().unwrap() = Some(obj.clone());
                }
                async move { Ok(Value::from(true)) }
            });
        }
        let group = RpcGroup::new(registry);
        let (a, mut rx) = Channel::flat();
        let id = group.add_channel(a);

        // args[0] is an object whose "self" field points back at it.
        group.receive(id, r#"[{"id":1,"method":"1","args":"2"},"keep",["3"],{"self":"3"}]"#);
        assert_eq!(next_json(&mut rx).await, json!({"id": 1, "result": true}));

        // The handle the handler kept is the only one left once the task ends.
        let obj = kept.lock().unwrap().clone().unwrap();
        for _ in 0..100 {
            if obj.handle_count() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(obj.handle_count(), 2);
        assert!(obj.get("self").unwrap().is_null());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_each_channel_once() {
        let group = RpcGroup::new(FunctionRegistry::new());
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (c, rx) = Channel::flat();
            group.add_channel(c);
            receivers.push(rx);
        }

        let sent = group.broadcast("refresh", vec![Value::from("components")]);
        assert_eq!(sent, 3);

        let (late, mut late_rx) = Channel::flat();
        group.add_channel(late);

        for rx in receivers.iter_mut() {
            assert_eq!(
                next_json(rx).await,
                json!({"method": "refresh", "args": ["components"]})
            );
            assert!(rx.try_recv().is_err());
        }
        assert!(late_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_with_no_channels() {
        let group = RpcGroup::new(FunctionRegistry::new());
        assert_eq!(group.broadcast("refresh", vec![]), 0);
    }

    #[tokio::test]
    async fn test_remove_channel_rejects_pending_call() {
        let group = RpcGroup::with_options(
            FunctionRegistry::new(),
            RpcGroupOptions { call_timeout: None },
        );
        let (c, mut rx) = Channel::flat();
        let id = group.add_channel(c);

        let caller = {
            let group = group.clone();
            tokio::spawn(async move { group.call(id, "navigate", vec![]).await })
        };

        // Wait until the request hit the wire, then drop the channel.
        let sent = next_json(&mut rx).await;
        assert_eq!(sent["method"], json!("navigate"));
        assert_eq!(group.pending_calls(id), 1);
        assert!(group.remove_channel(id));

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::ChannelClosed(cid) if cid == id));
        assert!(!group.remove_channel(id));
    }

    #[tokio::test]
    async fn test_outbound_call_resolves_from_response() {
        let group = RpcGroup::new(FunctionRegistry::new());
        let (c, mut rx) = Channel::flat();
        let id = group.add_channel(c);

        let caller = {
            let group = group.clone();
            tokio::spawn(async move { group.call(id, "getTitle", vec![]).await })
        };

        let sent = next_json(&mut rx).await;
        let call_id = sent["id"].as_u64().unwrap();
        let reply = Envelope::success(Value::from(call_id), Value::from("Home"));
        group.receive(id, &crate::codec::encode(&reply.to_value()).unwrap());

        let result = caller.await.unwrap().unwrap();
        assert_eq!(result.as_str(), Some("Home"));
        assert_eq!(group.pending_calls(id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_clears_pending_entry() {
        let group = RpcGroup::with_options(
            FunctionRegistry::new(),
            RpcGroupOptions {
                call_timeout: Some(Duration::from_secs(5)),
            },
        );
        let (c, _rx) = Channel::flat();
        let id = group.add_channel(c);

        let err = group.call(id, "slow", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(group.pending_calls(id), 0);
    }

    #[tokio::test]
    async fn test_call_on_unknown_channel() {
        let group = RpcGroup::new(FunctionRegistry::new());
        let err = group.call(424242, "x", vec![]).await.unwrap_err();
        assert!(matches!(err, BridgeError::ChannelNotFound(424242)));
    }
}
