//! Snapshot element types.
//!
//! Fields the bridge does not interpret are kept in a flattened `extra` map so
//! that clients receive whatever the host reported.

use crate::error::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type Extra = serde_json::Map<String, serde_json::Value>;

/// A registered UI component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub pascal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kebab_name: Option<String>,
    pub file_path: String,
    #[serde(default)]
    pub global: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One auto-imported binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub name: String,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub from: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Import {
    pub fn new(name: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            from: from.into(),
            extra: Extra::new(),
        }
    }
}

/// Name listed by an import source; either a bare name or a renamed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresetImport {
    Name(String),
    Renamed {
        name: String,
        #[serde(rename = "as")]
        alias: Option<String>,
    },
}

/// A module that contributes a set of imports (a "preset").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSource {
    pub from: String,
    #[serde(default)]
    pub imports: Vec<PresetImport>,
}

impl ImportSource {
    /// Flatten into one import per listed name.
    pub fn resolve(&self) -> Vec<Import> {
        self.imports
            .iter()
            .map(|entry| match entry {
                PresetImport::Name(name) => Import::new(name.clone(), self.from.clone()),
                PresetImport::Renamed { name, alias } => Import {
                    alias: alias.clone(),
                    ..Import::new(name.clone(), self.from.clone())
                },
            })
            .collect()
    }
}

/// Import context handed over once the host's import engine is ready.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportContext {
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Result of `getAutoImports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoImports {
    pub imports: Vec<Import>,
    pub metadata: Option<serde_json::Value>,
}

/// A server-side page route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Page>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A page layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub name: String,
    pub file: String,
}

/// The resolved application object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSnapshot {
    #[serde(default)]
    pub layouts: BTreeMap<String, Layout>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A runtime hook and how many listeners it has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookInfo {
    pub name: String,
    #[serde(default)]
    pub listeners: usize,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Version information, computed once per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub devbridge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl VersionInfo {
    pub fn current(host: Option<String>) -> Self {
        Self {
            devbridge: env!("CARGO_PKG_VERSION").to_string(),
            host,
        }
    }
}

/// Side effect run when a custom tab action is invoked.
pub type ActionHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named button on a custom tab view.
#[derive(Clone, Serialize, Deserialize)]
pub struct TabAction {
    pub label: String,
    #[serde(skip)]
    pub handle: Option<ActionHandler>,
}

impl TabAction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            handle: None,
        }
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handle = Some(Arc::new(move || -> BoxFuture<'static, Result<()>> {
            Box::pin(handler())
        }));
        self
    }
}

impl fmt::Debug for TabAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabAction")
            .field("label", &self.label)
            .field("handle", &self.handle.is_some())
            .finish()
    }
}

/// How a custom tab is rendered, plus its actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabView {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<TabAction>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A host-contributed tab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTab {
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub view: TabView,
}

impl CustomTab {
    /// A tab whose view only exposes launch actions.
    pub fn launch(name: impl Into<String>, title: impl Into<String>, actions: Vec<TabAction>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            icon: None,
            view: TabView {
                kind: "launch".to_string(),
                actions,
                extra: Extra::new(),
            },
        }
    }
}
