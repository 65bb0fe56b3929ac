//! Registry of locally callable functions.
//!
//! Each entry is tagged at registration time as a request/response call or a
//! one-way event. The tag decides whether the dispatcher posts a response; it is
//! never inferred from the incoming message.

use super::channel::ChannelId;
use super::group::RpcGroup;
use crate::codec::Value;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// How a registered function is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// The result (or error) is posted back to the caller.
    Call,
    /// Fire-and-forget; nothing is posted back.
    Event,
}

/// Context handed to a local function for one invocation.
#[derive(Clone)]
pub struct CallContext {
    /// Channel that delivered the request.
    pub channel: ChannelId,
    /// Group the request arrived through, for calling back into the peer.
    pub group: RpcGroup,
}

/// A function callable by the remote side.
#[async_trait]
pub trait RpcFunction: Send + Sync + 'static {
    async fn invoke(&self, ctx: CallContext, args: Vec<Value>) -> Result<Value>;
}

struct FnFunction<F>(F);

#[async_trait]
impl<F, Fut> RpcFunction for FnFunction<F>
where
    F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn invoke(&self, ctx: CallContext, args: Vec<Value>) -> Result<Value> {
        (self.0)(ctx, args).await
    }
}

/// A registry entry.
#[derive(Clone)]
pub struct RegisteredFunction {
    pub kind: FunctionKind,
    pub handler: Arc<dyn RpcFunction>,
}

/// Name-keyed set of local functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RegisteredFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any earlier one with the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: FunctionKind,
        handler: impl RpcFunction,
    ) -> &mut Self {
        self.functions.insert(
            name.into(),
            RegisteredFunction {
                kind,
                handler: Arc::new(handler),
            },
        );
        self
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, kind: FunctionKind, f: F) -> &mut Self
    where
        F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(name, kind, FnFunction(f))
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredFunction> {
        self.functions.get(name)
    }

    pub fn kind(&self, name: &str) -> Option<FunctionKind> {
        self.functions.get(name).map(|f| f.kind)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
