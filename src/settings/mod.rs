//! Installation-scoped settings.
//!
//! A [`Settings`] bundle is the small set of install-specific values
//! (environment id, host, root path, credentials reference) read exactly once
//! per process lifetime and pushed into every configuration object that
//! declares a matching key. The bundle is immutable after load; a reload
//! requires a fresh [`SettingsLoader`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::conf::{ConfObject, ConfValue};
use crate::types::{Error, Result};

/// Mandatory settings fields, in reporting order.
const MANDATORY_FIELDS: &[&str] = &["environment", "host", "app_data_dir"];

/// Read-only bundle of install-scoped values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Installation environment id (e.g. `production`, `staging-eu`).
    pub environment: String,

    /// Host this installation runs on.
    pub host: String,

    /// Root of the install tree (the standard layout's base directory).
    pub app_data_dir: PathBuf,

    /// Reference to externally-held credentials, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<String>,
}

impl Settings {
    /// Validate a raw settings document. Any missing mandatory field fails
    /// with `SettingsIncomplete` naming the field.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            Error::settings_unavailable("settings source did not yield a mapping")
        })?;
        for field in MANDATORY_FIELDS {
            match obj.get(*field) {
                Some(Value::String(s)) if !s.is_empty() => {}
                Some(_) => {
                    return Err(Error::settings_incomplete(format!(
                        "mandatory field {} is not a string",
                        field
                    )))
                }
                None => {
                    return Err(Error::settings_incomplete(format!(
                        "mandatory field {} is missing",
                        field
                    )))
                }
            }
        }
        serde_json::from_value(value.clone()).map_err(|e| {
            Error::settings_incomplete(format!("settings document malformed: {}", e))
        })
    }

    /// Field name → value pairs, as seen by propagation.
    pub fn fields(&self) -> Vec<(&'static str, ConfValue)> {
        let mut fields = vec![
            ("environment", ConfValue::Str(self.environment.clone())),
            ("host", ConfValue::Str(self.host.clone())),
            (
                "app_data_dir",
                ConfValue::Str(self.app_data_dir.display().to_string()),
            ),
        ];
        if let Some(ref cred) = self.credentials_ref {
            fields.push(("credentials_ref", ConfValue::Str(cred.clone())));
        }
        fields
    }
}

/// Source of the raw settings document.
#[async_trait]
pub trait SettingsProvider: Send + Sync + fmt::Debug {
    /// Read the settings document. Unreadable source → `SettingsUnavailable`.
    async fn fetch(&self) -> Result<Value>;
}

/// Settings from a JSON file.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsProvider for FileProvider {
    async fn fetch(&self) -> Result<Value> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::settings_unavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            Error::settings_unavailable(format!("cannot parse {}: {}", self.path.display(), e))
        })
    }
}

/// Settings from prefixed environment variables
/// (`<PREFIX>_HOST`, `<PREFIX>_ENVIRONMENT`, ...).
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
}

impl EnvProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl SettingsProvider for EnvProvider {
    async fn fetch(&self) -> Result<Value> {
        let mut obj = serde_json::Map::new();
        for field in ["environment", "host", "app_data_dir", "credentials_ref"] {
            let var = format!("{}_{}", self.prefix, field.to_uppercase());
            if let Ok(v) = std::env::var(&var) {
                obj.insert(field.to_string(), Value::String(v));
            }
        }
        Ok(Value::Object(obj))
    }
}

/// Loads the settings bundle exactly once per loader lifetime.
///
/// Concurrent callers share one fetch; repeat calls return the cached bundle
/// even if given a different provider. Re-awakening (a reload) means building
/// a fresh loader.
#[derive(Debug, Default)]
pub struct SettingsLoader {
    cell: OnceCell<Settings>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Read and validate the settings bundle, once.
    pub async fn load(&self, provider: &dyn SettingsProvider) -> Result<&Settings> {
        self.cell
            .get_or_try_init(|| async {
                let raw = provider.fetch().await?;
                let settings = Settings::from_value(&raw)?;
                tracing::info!(
                    environment = %settings.environment,
                    host = %settings.host,
                    "settings loaded"
                );
                Ok(settings)
            })
            .await
    }

    /// The already-loaded bundle, if any.
    pub fn get(&self) -> Option<&Settings> {
        self.cell.get()
    }
}

/// Push settings values into every target that declares a matching key.
///
/// Keys present in settings but undeclared in a target are skipped; a
/// declared key with an incompatible type surfaces as `TypeMismatch`. Pure
/// function of its inputs, idempotent across calls.
pub fn propagate(settings: &Settings, targets: &mut [&mut ConfObject]) -> Result<()> {
    let fields = settings.fields();
    for target in targets.iter_mut() {
        for (name, value) in &fields {
            if target.is_declared(name) {
                target.set(name, value.clone())?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{OwnerKind, ValueKind};
    use serde_json::json;

    fn full_doc() -> Value {
        json!({
            "environment": "production",
            "host": "node-1.example.org",
            "app_data_dir": "/srv/app",
        })
    }

    #[test]
    fn test_from_value_complete() {
        let settings = Settings::from_value(&full_doc()).unwrap();
        assert_eq!(settings.environment, "production");
        assert_eq!(settings.host, "node-1.example.org");
        assert_eq!(settings.app_data_dir, PathBuf::from("/srv/app"));
        assert_eq!(settings.credentials_ref, None);
    }

    #[test]
    fn test_from_value_missing_host() {
        let doc = json!({"environment": "production", "app_data_dir": "/srv/app"});
        let err = Settings::from_value(&doc).unwrap_err();
        assert!(matches!(err, Error::SettingsIncomplete(_)));
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_from_value_not_a_mapping() {
        assert!(matches!(
            Settings::from_value(&json!("nope")),
            Err(Error::SettingsUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_file_provider_missing_file() {
        let provider = FileProvider::new("/definitely/not/here.json");
        let loader = SettingsLoader::new();
        let err = loader.load(&provider).await.unwrap_err();
        assert!(matches!(err, Error::SettingsUnavailable(_)));
        assert!(err.is_startup_fatal());
    }

    #[tokio::test]
    async fn test_loader_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, full_doc().to_string()).unwrap();

        let loader = SettingsLoader::new();
        let first = loader.load(&FileProvider::new(&path)).await.unwrap().clone();

        // source changes on disk; cached bundle stays
        std::fs::write(
            &path,
            json!({"environment": "staging", "host": "other", "app_data_dir": "/tmp"}).to_string(),
        )
        .unwrap();
        let second = loader.load(&FileProvider::new(&path)).await.unwrap();
        assert_eq!(*second, first);
    }

    #[tokio::test]
    async fn test_env_provider_missing_mandatory() {
        // prefix chosen to not exist in the test environment
        let provider = EnvProvider::new("STEWARD_TEST_UNSET_7E2");
        let loader = SettingsLoader::new();
        let err = loader.load(&provider).await.unwrap_err();
        assert!(matches!(err, Error::SettingsIncomplete(_)));
    }

    #[test]
    fn test_propagate_sets_declared_skips_undeclared() {
        let settings = Settings::from_value(&full_doc()).unwrap();

        let mut wants_host = ConfObject::new(OwnerKind::Component, "web");
        wants_host.declare("host", ValueKind::Str, None).unwrap();
        wants_host.declare("port", ValueKind::Int, Some(ConfValue::Int(80))).unwrap();

        let mut wants_nothing = ConfObject::new(OwnerKind::Service, "hive");
        wants_nothing.declare("threads", ValueKind::Int, None).unwrap();

        propagate(&settings, &mut [&mut wants_host, &mut wants_nothing]).unwrap();

        assert_eq!(
            *wants_host.get("host").unwrap(),
            ConfValue::from("node-1.example.org")
        );
        assert!(wants_nothing.get("threads").is_err());
    }

    #[test]
    fn test_propagate_idempotent() {
        let settings = Settings::from_value(&full_doc()).unwrap();

        let mut conf = ConfObject::new(OwnerKind::Component, "web");
        conf.declare("host", ValueKind::Str, None).unwrap();
        conf.declare("app_data_dir", ValueKind::Path, None).unwrap();

        propagate(&settings, &mut [&mut conf]).unwrap();
        let first = conf.dump(true);
        propagate(&settings, &mut [&mut conf]).unwrap();
        let second = conf.dump(true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_propagate_type_mismatch_surfaces() {
        let settings = Settings::from_value(&full_doc()).unwrap();
        let mut conf = ConfObject::new(OwnerKind::Component, "web");
        conf.declare("host", ValueKind::Int, None).unwrap();
        assert!(matches!(
            propagate(&settings, &mut [&mut conf]),
            Err(Error::TypeMismatch(_))
        ));
    }
}
