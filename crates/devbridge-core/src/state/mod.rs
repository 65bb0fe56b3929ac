//! In-memory snapshots of host application state.

mod collector;
mod types;

pub use collector::{CollectorConfig, StateCollector};
pub use types::{
    ActionHandler, AppSnapshot, AutoImports, Component, CustomTab, HookInfo, Import,
    ImportContext, ImportSource, Layout, Page, PresetImport, TabAction, TabView, VersionInfo,
};
