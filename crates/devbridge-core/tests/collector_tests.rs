//! Integration tests for the state collector and the server functions it backs.
//!
//! A single in-memory channel stands in for a connected client: requests are
//! fed to the group with `receive`, and everything the server posts (responses
//! and `refresh` events) is read back from the channel receiver.

use async_trait::async_trait;
use devbridge_core::codec::{decode, encode};
use devbridge_core::rpc::Envelope;
use devbridge_core::state::{
    AppSnapshot, Component, CustomTab, Import, ImportContext, ImportSource, Layout, Page,
    TabAction,
};
use devbridge_core::{
    create_server_group, BridgeError, BridgeOptions, Channel, ChannelId, ChannelReceiver,
    CollectorConfig, EditorTarget, Host, Result, RpcGroup, RpcGroupOptions, StateCollector, Value,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct TestHost {
    runs: Arc<AtomicUsize>,
    opened: Mutex<Vec<EditorTarget>>,
}

#[async_trait]
impl Host for TestHost {
    async fn populate_custom_tabs(&self, tabs: &mut Vec<CustomTab>) -> Result<()> {
        let runs = self.runs.clone();
        tabs.push(CustomTab::launch(
            "counter",
            "Counter",
            vec![
                TabAction::new("Bump").with_handler(move || {
                    let runs = runs.clone();
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                TabAction::new("Break").with_handler(|| async {
                    Err(BridgeError::Other("action failed".to_string()))
                }),
            ],
        ));
        Ok(())
    }

    async fn launch_editor(&self, target: &EditorTarget) -> Result<()> {
        self.opened.lock().unwrap().push(target.clone());
        Ok(())
    }
}

struct Fixture {
    host: Arc<TestHost>,
    collector: StateCollector,
    group: RpcGroup,
    channel: ChannelId,
    rx: ChannelReceiver,
}

fn fixture_with(config: CollectorConfig) -> Fixture {
    let host = Arc::new(TestHost::default());
    let collector = StateCollector::new(host.clone(), config);
    let group = create_server_group(&collector, RpcGroupOptions::default());
    let (channel, rx) = Channel::flat();
    let channel = group.add_channel(channel);
    Fixture {
        host,
        collector,
        group,
        channel,
        rx,
    }
}

fn fixture() -> Fixture {
    fixture_with(CollectorConfig::default())
}

async fn next_message(rx: &mut ChannelReceiver) -> serde_json::Value {
    let raw = rx.recv().await.expect("channel closed");
    decode(&raw).unwrap().to_json().unwrap()
}

fn refresh(tag: &str) -> serde_json::Value {
    json!({"method": "refresh", "args": [tag]})
}

/// Call a server function over the channel and return its `result`.
async fn call(fx: &mut Fixture, method: &str, args: Vec<Value>) -> serde_json::Value {
    let raw = encode(&Envelope::request(77, method, args).to_value()).unwrap();
    fx.group.receive(fx.channel, &raw);
    let response = next_message(&mut fx.rx).await;
    assert_eq!(response["id"], json!(77), "unexpected message: {}", response);
    assert!(response.get("error").is_none(), "call failed: {}", response);
    response["result"].clone()
}

fn component(name: &str) -> Component {
    serde_json::from_value(json!({"pascalName": name, "filePath": format!("/src/{}.vue", name)}))
        .unwrap()
}

#[tokio::test]
async fn test_components_replaced_with_one_refresh() {
    let mut fx = fixture();

    fx.collector
        .on_components_changed(vec![component("Header"), component("Footer")]);
    assert_eq!(next_message(&mut fx.rx).await, refresh("components"));
    assert!(fx.rx.try_recv().is_err());

    fx.collector.on_components_changed(vec![component("Sidebar")]);
    assert_eq!(next_message(&mut fx.rx).await, refresh("components"));

    let result = call(&mut fx, "getComponents", vec![]).await;
    assert_eq!(result.as_array().unwrap().len(), 1);
    assert_eq!(result[0]["pascalName"], json!("Sidebar"));
}

#[tokio::test]
async fn test_auto_imports_list_hook_imports_before_presets() {
    let mut fx = fixture();

    let presets = fx.collector.on_import_sources_changed(vec![ImportSource {
        from: "vue".to_string(),
        imports: serde_json::from_value(json!(["ref", "computed"])).unwrap(),
    }]);
    assert_eq!(presets.len(), 2);
    // Presets alone do not notify clients.
    assert!(fx.rx.try_recv().is_err());

    fx.collector
        .on_auto_imports_changed(vec![Import::new("useFetch", "#app")]);
    assert_eq!(next_message(&mut fx.rx).await, refresh("imports"));

    fx.collector.on_import_context_ready(ImportContext {
        metadata: Some(json!({"injectionUsage": {}})),
    });

    let result = call(&mut fx, "getAutoImports", vec![]).await;
    let names: Vec<&str> = result["imports"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["useFetch", "ref", "computed"]);
    assert_eq!(result["metadata"], json!({"injectionUsage": {}}));
}

#[tokio::test]
async fn test_pages_and_layouts_are_silent_snapshots() {
    let mut fx = fixture();

    let page: Page = serde_json::from_value(json!({"path": "/", "file": "pages/index.vue"})).unwrap();
    fx.collector.on_pages_changed(vec![page]);

    let mut app = AppSnapshot::default();
    for name in ["plain", "default"] {
        app.layouts.insert(
            name.to_string(),
            Layout {
                name: name.to_string(),
                file: format!("layouts/{}.vue", name),
            },
        );
    }
    fx.collector.on_app_resolved(app);
    assert!(fx.rx.try_recv().is_err());

    let pages = call(&mut fx, "getServerPages", vec![]).await;
    assert_eq!(pages, json!([{"path": "/", "file": "pages/index.vue"}]));

    let layouts = call(&mut fx, "getLayouts", vec![]).await;
    assert_eq!(layouts[0]["name"], json!("default"));
    assert_eq!(layouts[1]["name"], json!("plain"));
}

#[tokio::test]
async fn test_get_config_and_versions() {
    let mut fx = fixture();

    let config = call(&mut fx, "getConfig", vec![]).await;
    assert_eq!(config["customTabs"], json!(true));

    let versions = call(&mut fx, "getVersions", vec![]).await;
    assert_eq!(versions["devbridge"], json!(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn test_custom_tab_action_runs_and_refreshes() {
    let mut fx = fixture();

    fx.collector.init_custom_tabs().await;
    assert_eq!(next_message(&mut fx.rx).await, refresh("customTabs"));

    let tabs = call(&mut fx, "getCustomTabs", vec![]).await;
    assert_eq!(tabs[0]["name"], json!("counter"));
    assert_eq!(tabs[0]["view"]["type"], json!("launch"));
    assert_eq!(tabs[0]["view"]["actions"][0], json!({"label": "Bump"}));

    let started = call(
        &mut fx,
        "customTabAction",
        vec![Value::from("counter"), Value::from(0u64)],
    )
    .await;
    assert_eq!(started, json!(true));

    // The recomputed tab list is announced once the action settles.
    assert_eq!(next_message(&mut fx.rx).await, refresh("customTabs"));
    assert_eq!(fx.host.runs.load(Ordering::SeqCst), 1);
    assert!(fx.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failing_tab_action_still_refreshes() {
    let mut fx = fixture();
    fx.collector.init_custom_tabs().await;
    next_message(&mut fx.rx).await;

    let started = call(
        &mut fx,
        "customTabAction",
        vec![Value::from("counter"), Value::from(1u64)],
    )
    .await;
    assert_eq!(started, json!(true));
    assert_eq!(next_message(&mut fx.rx).await, refresh("customTabs"));
}

#[tokio::test]
async fn test_unknown_tab_or_action_returns_false() {
    let mut fx = fixture();
    fx.collector.init_custom_tabs().await;
    next_message(&mut fx.rx).await;

    let missing_tab = call(
        &mut fx,
        "customTabAction",
        vec![Value::from("nope"), Value::from(0u64)],
    )
    .await;
    assert_eq!(missing_tab, json!(false));

    let missing_action = call(
        &mut fx,
        "customTabAction",
        vec![Value::from("counter"), Value::from(5u64)],
    )
    .await;
    assert_eq!(missing_action, json!(false));

    tokio::task::yield_now().await;
    assert!(fx.rx.try_recv().is_err());
    assert_eq!(fx.host.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_custom_tabs_disabled_by_options() {
    let mut fx = fixture_with(CollectorConfig {
        options: BridgeOptions {
            custom_tabs: false,
            ..BridgeOptions::default()
        },
        ..CollectorConfig::default()
    });

    fx.collector.init_custom_tabs().await;
    assert_eq!(next_message(&mut fx.rx).await, refresh("customTabs"));
    assert!(fx.collector.custom_tabs().is_empty());
}

#[tokio::test]
async fn test_open_in_editor_resolves_with_fallback_extension() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("module.ts"), "export {}").unwrap();

    let mut fx = fixture_with(CollectorConfig {
        root_dir: dir.path().to_path_buf(),
        ..CollectorConfig::default()
    });

    let result = call(&mut fx, "openInEditor", vec![Value::from("module:10:2")]).await;
    assert_eq!(result, json!(null));

    let opened = fx.host.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].path, dir.path().join("module.ts"));
    assert_eq!(opened[0].line, Some(10));
    assert_eq!(opened[0].column, Some(2));
}

#[tokio::test]
async fn test_open_in_editor_missing_file_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let mut fx = fixture_with(CollectorConfig {
        root_dir: dir.path().to_path_buf(),
        ..CollectorConfig::default()
    });

    let result = call(&mut fx, "openInEditor", vec![Value::from("missing/file")]).await;
    assert_eq!(result, json!(null));
    assert!(fx.host.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_server_function() {
    let mut fx = fixture();
    let raw = encode(&Envelope::request(3, "deleteEverything", vec![]).to_value()).unwrap();
    fx.group.receive(fx.channel, &raw);

    let response = next_message(&mut fx.rx).await;
    assert_eq!(response["id"], json!(3));
    assert_eq!(response["error"]["code"], json!(-32601));
}
