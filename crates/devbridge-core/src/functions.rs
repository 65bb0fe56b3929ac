//! Functions the server exposes to connected clients.

use crate::codec::Value;
use crate::error::{BridgeError, Result};
use crate::rpc::{FunctionKind, FunctionRegistry, RpcGroup, RpcGroupOptions};
use crate::state::StateCollector;
use serde::Serialize;

/// Names of the server functions.
pub mod names {
    pub const GET_CONFIG: &str = "getConfig";
    pub const GET_COMPONENTS: &str = "getComponents";
    pub const GET_SERVER_PAGES: &str = "getServerPages";
    pub const GET_AUTO_IMPORTS: &str = "getAutoImports";
    pub const GET_CUSTOM_TABS: &str = "getCustomTabs";
    pub const GET_VERSIONS: &str = "getVersions";
    pub const GET_LAYOUTS: &str = "getLayouts";
    pub const GET_SERVER_HOOKS: &str = "getServerHooks";
    pub const CUSTOM_TAB_ACTION: &str = "customTabAction";
    pub const RUN_WIZARD: &str = "runWizard";
    pub const OPEN_IN_EDITOR: &str = "openInEditor";
}

// ============================================================================
// Argument extraction helpers
// ============================================================================

/// Extract a required string argument.
pub(crate) fn require_str_arg(args: &[Value], index: usize, name: &str) -> Result<String> {
    args.get(index)
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| BridgeError::InvalidParams {
            message: format!("Missing required string argument: {}", name),
        })
}

/// Extract a required non-negative integer argument.
pub(crate) fn require_index_arg(args: &[Value], index: usize, name: &str) -> Result<usize> {
    args.get(index)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| BridgeError::InvalidParams {
            message: format!("Missing required index argument: {}", name),
        })
}

/// Register a function that serializes a read of the collector.
fn register_getter<T, F>(
    registry: &mut FunctionRegistry,
    name: &str,
    collector: &StateCollector,
    read: F,
) where
    T: Serialize,
    F: Fn(&StateCollector) -> T + Send + Sync + 'static,
{
    let collector = collector.clone();
    registry.register_fn(name, FunctionKind::Call, move |_ctx, _args| {
        let result = Value::from_serialize(&read(&collector));
        async move { result }
    });
}

/// Build the registry of functions clients may call.
pub fn server_functions(collector: &StateCollector) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();

    register_getter(&mut registry, names::GET_CONFIG, collector, |c| {
        c.options().clone()
    });
    register_getter(&mut registry, names::GET_COMPONENTS, collector, |c| {
        c.components()
    });
    register_getter(&mut registry, names::GET_SERVER_PAGES, collector, |c| {
        c.server_pages()
    });
    register_getter(&mut registry, names::GET_AUTO_IMPORTS, collector, |c| {
        c.auto_imports()
    });
    register_getter(&mut registry, names::GET_CUSTOM_TABS, collector, |c| {
        c.custom_tabs()
    });
    register_getter(&mut registry, names::GET_VERSIONS, collector, |c| {
        c.versions().clone()
    });
    register_getter(&mut registry, names::GET_LAYOUTS, collector, |c| c.layouts());
    register_getter(&mut registry, names::GET_SERVER_HOOKS, collector, |c| {
        c.server_hooks()
    });

    let c = collector.clone();
    registry.register_fn(names::CUSTOM_TAB_ACTION, FunctionKind::Call, move |_ctx, args| {
        let outcome = require_str_arg(&args, 0, "name").and_then(|name| {
            let index = require_index_arg(&args, 1, "actionIndex")?;
            Ok(Value::Bool(c.custom_tab_action(&name, index)))
        });
        async move { outcome }
    });

    let c = collector.clone();
    registry.register_fn(names::RUN_WIZARD, FunctionKind::Call, move |_ctx, args| {
        let c = c.clone();
        async move {
            let name = require_str_arg(&args, 0, "name")?;
            let rest = args.into_iter().skip(1).collect();
            c.host().run_wizard(&name, rest).await
        }
    });

    let c = collector.clone();
    registry.register_fn(names::OPEN_IN_EDITOR, FunctionKind::Call, move |_ctx, args| {
        let c = c.clone();
        async move {
            let input = require_str_arg(&args, 0, "path")?;
            c.open_in_editor(&input).await?;
            Ok(Value::Null)
        }
    });

    registry
}

/// Create the server-side group and bind the collector's broadcasts to it.
pub fn create_server_group(collector: &StateCollector, options: RpcGroupOptions) -> RpcGroup {
    let group = RpcGroup::with_options(server_functions(collector), options);
    collector.bind(group.clone());
    group
}
