//! End-to-end administrator tests against real OS processes.
//!
//! Components here are `/bin/sleep` processes; the scenarios follow the
//! deployment flow: manifest -> settings -> configure -> build -> start ->
//! stop, spanning multiple services in one pool.

use std::time::Duration;

use steward_core::admin::commands::spawn_admin;
use steward_core::admin::Administrator;
use steward_core::manifest::{ComponentDescriptor, EntryPoint, KeyDecl, Manifest, ServiceDecl};
use steward_core::runtime::{ComponentRuntime, ComponentState, SignalMode};
use steward_core::settings::{FileProvider, SettingsLoader};
use steward_core::types::{AdminConfig, ComponentName, Error, ServiceName};

fn descriptor(component: &str, service: &str, secs: &str) -> ComponentDescriptor {
    ComponentDescriptor {
        component: ComponentName::must(component),
        service: ServiceName::must(service),
        entry: EntryPoint::new("/bin/sleep", &[secs]),
        conf_keys: vec![],
        neutral: true,
    }
}

fn quick_config() -> AdminConfig {
    AdminConfig {
        stop_grace_period: Duration::from_secs(2),
        reap_interval: Duration::from_millis(50),
        ..AdminConfig::default()
    }
}

fn write_settings(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("settings.json");
    let doc = serde_json::json!({
        "environment": "integration",
        "host": "localhost",
        "app_data_dir": dir.join("app_data"),
    });
    std::fs::write(&path, doc.to_string()).unwrap();
    path
}

async fn awakened_admin(manifest: Manifest, dir: &std::path::Path) -> Administrator {
    let mut admin = Administrator::from_manifest(quick_config(), manifest).unwrap();
    let settings_path = write_settings(dir);
    admin.awaken(&FileProvider::new(settings_path)).await.unwrap();
    admin
}

#[tokio::test]
async fn full_flow_across_services() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = Manifest {
        services: vec![
            ServiceDecl {
                name: ServiceName::must("hive"),
                conf_keys: vec![KeyDecl {
                    name: "host".to_string(),
                    kind: steward_core::conf::ValueKind::Str,
                    default: None,
                    path: None,
                }],
            },
            ServiceDecl {
                name: ServiceName::must("warehouse"),
                conf_keys: vec![],
            },
        ],
        components: vec![
            ComponentDescriptor {
                component: ComponentName::must("web"),
                service: ServiceName::must("hive"),
                entry: EntryPoint::new("/bin/sleep", &["30"]),
                conf_keys: vec![KeyDecl {
                    name: "port".to_string(),
                    kind: steward_core::conf::ValueKind::Int,
                    default: Some(steward_core::conf::ConfValue::Int(8080)),
                    path: None,
                }],
                neutral: false,
            },
            descriptor("indexer", "warehouse", "30"),
        ],
    };

    let admin = awakened_admin(manifest, tmp.path()).await;
    let (handle, _cancel, task) = spawn_admin(admin);

    let web = ComponentName::must("web");
    let indexer = ComponentName::must("indexer");

    handle.configure(web.clone()).await.unwrap();
    handle.configure(indexer.clone()).await.unwrap();

    let conf_dir = handle.build(web.clone()).await.unwrap();
    assert!(conf_dir.join("component-web.json").is_file());
    assert!(conf_dir.join("service-hive.json").is_file());

    let started = handle.start_all().await.unwrap();
    assert_eq!(started, vec![web.clone(), indexer.clone()]);

    let all = handle.status_all().await.unwrap();
    assert_eq!(all[&web], ComponentState::Running);
    assert_eq!(all[&indexer], ComponentState::Running);

    let stopped = handle.stop_all().await.unwrap();
    assert_eq!(stopped, vec![indexer.clone(), web.clone()]);

    let all = handle.status_all().await.unwrap();
    assert_eq!(all[&web], ComponentState::Stopped);
    assert_eq!(all[&indexer], ComponentState::Stopped);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn start_all_then_stop_all_reverses_dependency_order() {
    // A has no deps; B depends on A and is registered (thus started) after it
    let tmp = tempfile::tempdir().unwrap();
    let manifest = Manifest {
        services: vec![],
        components: vec![descriptor("a", "hive", "30"), descriptor("b", "hive", "30")],
    };
    let mut admin = awakened_admin(manifest, tmp.path()).await;

    let a = ComponentName::must("a");
    let b = ComponentName::must("b");
    admin.configure(&a).unwrap();
    admin.configure(&b).unwrap();

    assert_eq!(admin.start_all().await, vec![a.clone(), b.clone()]);
    assert_eq!(admin.stop_all().await, vec![b, a]);
}

#[tokio::test]
async fn duplicate_registration_keeps_one_entry() {
    let mut admin = Administrator::new(quick_config());
    admin.register(descriptor("web", "hive", "30")).unwrap();

    let err = admin.register(descriptor("web", "warehouse", "30")).unwrap_err();
    assert!(matches!(err, Error::NameCollision(_)));

    let all = admin.status_all();
    assert_eq!(all.len(), 1);
    assert_eq!(
        all[&ComponentName::must("web")],
        ComponentState::Uninitialized
    );
}

#[tokio::test]
async fn settings_missing_host_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("settings.json");
    std::fs::write(
        &path,
        serde_json::json!({
            "environment": "integration",
            "app_data_dir": "/tmp/app_data",
        })
        .to_string(),
    )
    .unwrap();

    let loader = SettingsLoader::new();
    let err = loader.load(&FileProvider::new(&path)).await.unwrap_err();
    assert!(matches!(err, Error::SettingsIncomplete(_)));
    assert!(err.to_string().contains("host"));
    assert!(err.is_startup_fatal());
}

#[tokio::test]
async fn runtime_with_children_leaves_none_alive() {
    let mut runtime = ComponentRuntime::new(
        ComponentName::must("parent"),
        ServiceName::must("hive"),
        EntryPoint::new("/bin/sleep", &["30"]),
        SignalMode::Supervised,
        Duration::from_secs(2),
    );
    runtime.mark_configured().unwrap();
    runtime.start().await.unwrap();
    assert_eq!(runtime.state(), ComponentState::Running);

    runtime
        .spawn_child(&EntryPoint::new("/bin/sleep", &["30"]))
        .unwrap();
    runtime
        .spawn_child(&EntryPoint::new("/bin/sleep", &["30"]))
        .unwrap();
    assert_eq!(runtime.children_count(), 2);

    runtime.stop().await.unwrap();
    assert_eq!(runtime.state(), ComponentState::Stopped);
    assert_eq!(runtime.children_count(), 0);
}

#[tokio::test]
async fn errored_component_is_reported_not_restarted() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = Manifest {
        services: vec![],
        components: vec![ComponentDescriptor {
            component: ComponentName::must("broken"),
            service: ServiceName::must("hive"),
            entry: EntryPoint::new("/not/a/real/binary", &[]),
            conf_keys: vec![],
            neutral: true,
        }],
    };
    let mut admin = awakened_admin(manifest, tmp.path()).await;

    let name = ComponentName::must("broken");
    admin.configure(&name).unwrap();

    let err = admin.start(&name).await.unwrap_err();
    assert!(matches!(err, Error::LaunchFailure(_)));

    let status = admin.status(&name).unwrap();
    assert_eq!(status.state, ComponentState::Errored);
    assert!(status.last_error.is_some());

    // no auto-restart: the component stays errored through reaping
    admin.poll().await;
    assert_eq!(admin.status(&name).unwrap().state, ComponentState::Errored);
}

#[tokio::test]
async fn conf_files_written_by_build_are_loaded_on_next_configure() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = Manifest {
        services: vec![],
        components: vec![ComponentDescriptor {
            component: ComponentName::must("web"),
            service: ServiceName::must("hive"),
            entry: EntryPoint::new("/bin/sleep", &["30"]),
            conf_keys: vec![KeyDecl {
                name: "port".to_string(),
                kind: steward_core::conf::ValueKind::Int,
                default: Some(steward_core::conf::ConfValue::Int(0)),
                path: None,
            }],
            neutral: false,
        }],
    };

    let name = ComponentName::must("web");

    // first administrator session: configure, tune explicitly, build
    let mut admin = awakened_admin(manifest.clone(), tmp.path()).await;
    admin.configure(&name).unwrap();
    admin.confs_mut(&name).unwrap()[0]
        .set("port", steward_core::conf::ConfValue::Int(9999))
        .unwrap();
    admin.build(&name).unwrap();

    // second session: conf file on disk feeds the fresh configure
    let mut admin2 = awakened_admin(manifest, tmp.path()).await;
    admin2.configure(&name).unwrap();
    let merged = admin2.effective_conf(&name).unwrap();
    assert_eq!(merged.get("port"), Some(&serde_json::Value::from(9999)));
}
