//! Typed view of the functions connected clients expose.

use super::channel::ChannelId;
use super::group::RpcGroup;
use crate::codec::Value;
use crate::config::RpcConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Functions every client implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFunction {
    /// Invalidation signal; the client re-fetches the tagged resource.
    Refresh,
}

impl ClientFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientFunction::Refresh => RpcConfig::REFRESH_EVENT,
        }
    }
}

/// Resource named by a `refresh` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshTag {
    Components,
    Imports,
    CustomTabs,
}

impl RefreshTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTag::Components => "components",
            RefreshTag::Imports => "imports",
            RefreshTag::CustomTabs => "customTabs",
        }
    }
}

impl fmt::Display for RefreshTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a proxied client call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Channel(ChannelId),
}

/// Typed proxy over the client contract.
pub struct ClientProxy<'a> {
    group: &'a RpcGroup,
    target: Target,
}

impl RpcGroup {
    /// Proxy that broadcasts to every connected client.
    pub fn clients(&self) -> ClientProxy<'_> {
        ClientProxy {
            group: self,
            target: Target::All,
        }
    }

    /// Proxy bound to the client behind one channel.
    pub fn client(&self, channel: ChannelId) -> ClientProxy<'_> {
        ClientProxy {
            group: self,
            target: Target::Channel(channel),
        }
    }
}

impl ClientProxy<'_> {
    pub fn target(&self) -> Target {
        self.target
    }

    /// Tell the client(s) that `tag` changed. Returns how many were notified.
    pub fn refresh(&self, tag: RefreshTag) -> Result<usize> {
        self.event(ClientFunction::Refresh, vec![Value::from(tag.as_str())])
    }

    fn event(&self, function: ClientFunction, args: Vec<Value>) -> Result<usize> {
        match self.target {
            Target::All => Ok(self.group.broadcast(function.as_str(), args)),
            Target::Channel(id) => {
                self.group.notify(id, function.as_str(), args)?;
                Ok(1)
            }
        }
    }

    /// Call an arbitrary client function and wait for its result.
    ///
    /// Only valid for a single-channel proxy; broadcasts carry no responses.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        match self.target {
            Target::Channel(id) => self.group.call(id, method, args).await,
            Target::All => Err(crate::BridgeError::InvalidParams {
                message: format!("{} needs a single target channel", method),
            }),
        }
    }
}
