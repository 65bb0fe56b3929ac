//! File-backed host.
//!
//! Host state is read from a JSON document and pushed into the collector
//! through its hooks. Top-level keys that are absent leave the matching
//! snapshot untouched. The file is watched and re-applied whenever it changes.

use async_trait::async_trait;
use devbridge_core::editor::{self, EditorTarget};
use devbridge_core::state::{
    AppSnapshot, Component, CustomTab, HookInfo, Import, ImportContext, ImportSource, Page,
    TabAction,
};
use devbridge_core::{BridgeError, Host, StateCollector};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Quiet period after the last file event before the state is reloaded.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(150);

/// Contents of the `--state` file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile {
    pub components: Option<Vec<Component>>,
    pub imports: Option<Vec<Import>>,
    pub import_sources: Option<Vec<ImportSource>>,
    pub import_metadata: Option<serde_json::Value>,
    pub pages: Option<Vec<Page>>,
    pub app: Option<AppSnapshot>,
    pub server_hooks: Option<Vec<HookInfo>>,
    pub custom_tabs: Option<Vec<TabSpec>>,
}

/// A custom tab as written in the state file.
#[derive(Debug, Clone, Deserialize)]
pub struct TabSpec {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

/// A tab action; `command` is run when the action is triggered.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
    pub label: String,
    #[serde(default)]
    pub command: Vec<String>,
}

impl StateFile {
    pub fn load(path: &Path) -> devbridge_core::Result<Self> {
        if !path.exists() {
            return Err(BridgeError::FileNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| BridgeError::io_with_path(e, path))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Host whose state lives in a JSON file.
pub struct FileHost {
    path: Option<PathBuf>,
    editor: String,
    tabs: RwLock<Vec<TabSpec>>,
}

impl FileHost {
    pub fn new(path: Option<PathBuf>, editor: impl Into<String>) -> Self {
        Self {
            path,
            editor: editor.into(),
            tabs: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the state file and push every present section into `collector`.
    ///
    /// Without a state file only the custom tabs are (re)computed.
    pub async fn apply(&self, collector: &StateCollector) -> devbridge_core::Result<()> {
        let state = match &self.path {
            Some(path) => StateFile::load(path)?,
            None => StateFile::default(),
        };

        if let Some(components) = state.components {
            collector.on_components_changed(components);
        }
        if let Some(sources) = state.import_sources {
            collector.on_import_sources_changed(sources);
        }
        if let Some(imports) = state.imports {
            collector.on_auto_imports_changed(imports);
        }
        if let Some(metadata) = state.import_metadata {
            collector.on_import_context_ready(ImportContext {
                metadata: Some(metadata),
            });
        }
        if let Some(pages) = state.pages {
            collector.on_pages_changed(pages);
        }
        if let Some(app) = state.app {
            collector.on_app_resolved(app);
        }
        if let Some(hooks) = state.server_hooks {
            collector.on_server_hooks_changed(hooks);
        }

        if let Some(tabs) = state.custom_tabs {
            *self.tabs.write().unwrap_or_else(|p| p.into_inner()) = tabs;
        }
        collector.on_custom_tabs_refresh_requested().await;
        Ok(())
    }
}

#[async_trait]
impl Host for FileHost {
    async fn populate_custom_tabs(&self, tabs: &mut Vec<CustomTab>) -> devbridge_core::Result<()> {
        let specs = self.tabs.read().unwrap_or_else(|p| p.into_inner()).clone();
        tabs.extend(specs.into_iter().map(build_tab));
        Ok(())
    }

    async fn launch_editor(&self, target: &EditorTarget) -> devbridge_core::Result<()> {
        editor::spawn_editor(&self.editor, target).await
    }
}

fn build_tab(spec: TabSpec) -> CustomTab {
    let actions = spec
        .actions
        .into_iter()
        .map(|action| {
            let command = action.command;
            let label = action.label.clone();
            TabAction::new(action.label).with_handler(move || run_action(label.clone(), command.clone()))
        })
        .collect();

    let mut tab = CustomTab::launch(spec.name, spec.title, actions);
    tab.icon = spec.icon;
    tab
}

async fn run_action(label: String, command: Vec<String>) -> devbridge_core::Result<()> {
    let Some((program, args)) = command.split_first() else {
        debug!("Action {} has no command", label);
        return Ok(());
    };

    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| BridgeError::io_with_path(e, program))?;

    if status.success() {
        info!("Action {} finished", label);
        Ok(())
    } else {
        Err(BridgeError::Other(format!(
            "Action {} exited with {}",
            label, status
        )))
    }
}

/// Re-apply the state file whenever it changes.
///
/// The parent directory is watched so editors that replace the file on save
/// are still seen. Events are debounced by [`RELOAD_DEBOUNCE`]. Keep the
/// returned debouncer alive for as long as reloads should happen.
pub fn watch(
    host: Arc<FileHost>,
    collector: StateCollector,
) -> anyhow::Result<Option<Debouncer<RecommendedWatcher>>> {
    let Some(path) = host.path().map(Path::to_path_buf) else {
        return Ok(None);
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path.file_name().map(|n| n.to_os_string());

    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let mut debouncer = new_debouncer(RELOAD_DEBOUNCE, move |res: DebounceEventResult| {
        match res {
            Ok(events) => {
                let relevant = events
                    .iter()
                    .any(|event| event.path.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("State file watch error: {}", e),
        }
    })?;
    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)?;
    info!("Watching {} for changes", path.display());

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            match host.apply(&collector).await {
                Ok(()) => info!("Reloaded host state from {}", path.display()),
                Err(e) => error!("Failed to reload {}: {}", path.display(), e),
            }
        }
        debug!("State file watcher stopped");
    });

    Ok(Some(debouncer))
}
