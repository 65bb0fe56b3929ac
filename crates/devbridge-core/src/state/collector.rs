//! Authoritative snapshots of host state.
//!
//! Every `on_*` hook replaces its collection wholesale under the write lock, so
//! a reader sees either the previous collection or the new one in full. Hooks
//! whose consumers want live updates then broadcast a `refresh` event tagged
//! with the collection; the event carries no data and clients re-fetch.

use super::types::{
    AppSnapshot, AutoImports, Component, CustomTab, HookInfo, Import, ImportContext,
    ImportSource, Layout, Page, VersionInfo,
};
use crate::config::BridgeOptions;
use crate::editor::{self, EditorTarget};
use crate::error::Result;
use crate::host::Host;
use crate::rpc::{RefreshTag, RpcGroup};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Fixed inputs of a collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub options: BridgeOptions,
    pub versions: VersionInfo,
    /// Base for relative paths passed to `openInEditor`.
    pub root_dir: PathBuf,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            options: BridgeOptions::default(),
            versions: VersionInfo::current(None),
            root_dir: PathBuf::from("."),
        }
    }
}

#[derive(Default)]
struct Snapshots {
    components: Vec<Component>,
    imports: Vec<Import>,
    import_presets: Vec<Import>,
    import_context: Option<ImportContext>,
    server_pages: Vec<Page>,
    app: Option<AppSnapshot>,
    server_hooks: Vec<HookInfo>,
    custom_tabs: Vec<CustomTab>,
}

struct CollectorInner {
    snapshots: RwLock<Snapshots>,
    host: Arc<dyn Host>,
    config: CollectorConfig,
    group: OnceLock<RpcGroup>,
}

/// Shared handle to the snapshot collections.
#[derive(Clone)]
pub struct StateCollector {
    inner: Arc<CollectorInner>,
}

impl StateCollector {
    pub fn new(host: Arc<dyn Host>, config: CollectorConfig) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                snapshots: RwLock::new(Snapshots::default()),
                host,
                config,
                group: OnceLock::new(),
            }),
        }
    }

    /// Attach the group used for refresh broadcasts. Only the first call has effect.
    pub fn bind(&self, group: RpcGroup) {
        if self.inner.group.set(group).is_err() {
            warn!("State collector already bound to an RPC group");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshots> {
        self.inner
            .snapshots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshots> {
        self.inner
            .snapshots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refresh(&self, tag: RefreshTag) {
        match self.inner.group.get() {
            Some(group) => match group.clients().refresh(tag) {
                Ok(notified) => debug!("refresh({}) sent to {} clients", tag, notified),
                Err(e) => warn!("refresh({}) failed: {}", tag, e),
            },
            None => debug!("refresh({}) skipped: collector not bound", tag),
        }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    // ========================================================================
    // Host hooks
    // ========================================================================

    pub fn on_components_changed(&self, components: Vec<Component>) {
        let count = components.len();
        self.write().components = components;
        debug!("Components replaced ({})", count);
        self.refresh(RefreshTag::Components);
    }

    pub fn on_auto_imports_changed(&self, imports: Vec<Import>) {
        let count = imports.len();
        self.write().imports = imports;
        debug!("Auto-imports replaced ({})", count);
        self.refresh(RefreshTag::Imports);
    }

    /// Resolve and store import presets; returns the resolved list.
    pub fn on_import_sources_changed(&self, sources: Vec<ImportSource>) -> Vec<Import> {
        let presets: Vec<Import> = sources.iter().flat_map(ImportSource::resolve).collect();
        self.write().import_presets = presets.clone();
        debug!(
            "Import presets replaced ({} from {} sources)",
            presets.len(),
            sources.len()
        );
        presets
    }

    pub fn on_import_context_ready(&self, context: ImportContext) {
        self.write().import_context = Some(context);
    }

    pub fn on_pages_changed(&self, pages: Vec<Page>) {
        let count = pages.len();
        self.write().server_pages = pages;
        debug!("Server pages replaced ({})", count);
    }

    pub fn on_app_resolved(&self, app: AppSnapshot) {
        let layouts = app.layouts.len();
        self.write().app = Some(app);
        debug!("App resolved ({} layouts)", layouts);
    }

    pub fn on_server_hooks_changed(&self, hooks: Vec<HookInfo>) {
        self.write().server_hooks = hooks;
    }

    /// Recompute the custom tab list and broadcast `refresh("customTabs")`.
    ///
    /// The new list is assembled off to the side and swapped in at once.
    pub async fn init_custom_tabs(&self) {
        let mut tabs = Vec::new();
        if self.inner.config.options.custom_tabs {
            if let Err(e) = self.inner.host.populate_custom_tabs(&mut tabs).await {
                error!("Host failed to provide custom tabs: {}", e);
            }
        }
        let count = tabs.len();
        self.write().custom_tabs = tabs;
        info!("Custom tabs refreshed ({})", count);
        self.refresh(RefreshTag::CustomTabs);
    }

    /// Handler for the "custom tabs refresh requested" hook.
    pub async fn on_custom_tabs_refresh_requested(&self) {
        self.init_custom_tabs().await;
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn options(&self) -> &BridgeOptions {
        &self.inner.config.options
    }

    pub fn versions(&self) -> &VersionInfo {
        &self.inner.config.versions
    }

    pub fn components(&self) -> Vec<Component> {
        self.read().components.clone()
    }

    pub fn server_pages(&self) -> Vec<Page> {
        self.read().server_pages.clone()
    }

    /// Hook-reported imports followed by preset imports.
    pub fn auto_imports(&self) -> AutoImports {
        let snapshots = self.read();
        AutoImports {
            imports: snapshots
                .imports
                .iter()
                .chain(snapshots.import_presets.iter())
                .cloned()
                .collect(),
            metadata: snapshots
                .import_context
                .as_ref()
                .and_then(|ctx| ctx.metadata.clone()),
        }
    }

    pub fn custom_tabs(&self) -> Vec<CustomTab> {
        self.read().custom_tabs.clone()
    }

    /// Layouts of the resolved app, ordered by name.
    pub fn layouts(&self) -> Vec<Layout> {
        self.read()
            .app
            .as_ref()
            .map(|app| app.layouts.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn server_hooks(&self) -> Vec<HookInfo> {
        self.read().server_hooks.clone()
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Run action `index` of the tab called `name`.
    ///
    /// Returns false, with no side effects, if the tab or action does not exist
    /// right now. Otherwise returns true immediately; the action runs in the
    /// background and the tab list is recomputed once it settles, whether it
    /// succeeded or not.
    pub fn custom_tab_action(&self, name: &str, index: usize) -> bool {
        let handler = {
            let snapshots = self.read();
            let Some(tab) = snapshots.custom_tabs.iter().find(|tab| tab.name == name) else {
                debug!("Custom tab {} not found", name);
                return false;
            };
            let Some(action) = tab.view.actions.get(index) else {
                debug!("Custom tab {} has no action {}", name, index);
                return false;
            };
            action.handle.clone()
        };

        let collector = self.clone();
        let tab = name.to_string();
        tokio::spawn(async move {
            if let Some(handler) = handler {
                match AssertUnwindSafe(handler()).catch_unwind().await {
                    Ok(Ok(())) => debug!("Custom tab action {}#{} finished", tab, index),
                    Ok(Err(e)) => error!("Custom tab action {}#{} failed: {}", tab, index, e),
                    Err(_) => error!("Custom tab action {}#{} panicked", tab, index),
                }
            }
            collector.on_custom_tabs_refresh_requested().await;
        });
        true
    }

    /// Resolve `input` against the project root and ask the host to open it.
    ///
    /// Returns the opened target, or `None` (after a warning) if no candidate exists.
    pub async fn open_in_editor(&self, input: &str) -> Result<Option<EditorTarget>> {
        match editor::resolve(input, &self.inner.config.root_dir) {
            Some(target) => {
                self.inner.host.launch_editor(&target).await?;
                Ok(Some(target))
            }
            None => {
                warn!("File not found: {}", input);
                Ok(None)
            }
        }
    }
}
