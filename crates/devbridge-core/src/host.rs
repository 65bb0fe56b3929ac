//! Interface to the hosting application.
//!
//! The host pushes state changes into [`crate::StateCollector`] through its
//! `on_*` hooks. The calls that go the other way, where the bridge asks the host
//! to do something, live on this trait.

use crate::codec::Value;
use crate::editor::EditorTarget;
use crate::error::{BridgeError, Result};
use crate::state::CustomTab;
use async_trait::async_trait;

/// Services the hosting application provides to the bridge.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Append the host's custom tabs to `tabs`.
    async fn populate_custom_tabs(&self, _tabs: &mut Vec<CustomTab>) -> Result<()> {
        Ok(())
    }

    /// Run a named wizard with client-supplied arguments.
    async fn run_wizard(&self, name: &str, _args: Vec<Value>) -> Result<Value> {
        Err(BridgeError::WizardNotFound {
            name: name.to_string(),
        })
    }

    /// Open a resolved file in the user's editor.
    async fn launch_editor(&self, target: &EditorTarget) -> Result<()>;
}

/// Host that contributes nothing and launches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

#[async_trait]
impl Host for NoopHost {
    async fn launch_editor(&self, target: &EditorTarget) -> Result<()> {
        tracing::debug!("Editor launch ignored for {}", target.location());
        Ok(())
    }
}
