//! Component descriptors.
//!
//! The manifest is the external collaborator describing which components
//! exist, where they live and which configuration keys they declare. Parsing
//! is thin serde over a JSON document; everything beyond yielding descriptors
//! is out of scope here.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::conf::{ConfObject, ConfValue, OwnerKind, PathSpec, ValueKind};
use crate::types::{ComponentName, Error, Result, ServiceName};

/// How a component's main process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl EntryPoint {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One declared configuration variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDecl {
    pub name: String,
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ConfValue>,
    /// Present on variables whose value is derived from the install layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathSpec>,
}

impl KeyDecl {
    fn declare_into(&self, conf: &mut ConfObject) -> Result<()> {
        match &self.path {
            Some(spec) => conf.declare_path(&self.name, spec.clone(), self.default.clone()),
            None => conf.declare(&self.name, self.kind, self.default.clone()),
        }
    }
}

/// Service-level declaration: configuration shared by the service's components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDecl {
    pub name: ServiceName,
    #[serde(default)]
    pub conf_keys: Vec<KeyDecl>,
}

impl ServiceDecl {
    /// Build the service-level configuration object.
    pub fn service_conf(&self) -> Result<ConfObject> {
        let mut conf = ConfObject::new(OwnerKind::Service, self.name.as_str());
        for key in &self.conf_keys {
            key.declare_into(&mut conf)?;
        }
        Ok(conf)
    }
}

/// Static metadata for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub component: ComponentName,
    pub service: ServiceName,
    pub entry: EntryPoint,
    #[serde(default)]
    pub conf_keys: Vec<KeyDecl>,
    /// Importable without any configuration loaded first.
    #[serde(default)]
    pub neutral: bool,
}

impl ComponentDescriptor {
    /// Build the component-level configuration object.
    pub fn component_conf(&self) -> Result<ConfObject> {
        let mut conf = ConfObject::new(OwnerKind::Component, self.component.as_str());
        for key in &self.conf_keys {
            key.declare_into(&mut conf)?;
        }
        Ok(conf)
    }
}

/// The full descriptor set of one deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub services: Vec<ServiceDecl>,
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
}

impl Manifest {
    /// Parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// When the manifest declares services at all, every component must
    /// reference one of them. A manifest with no services section leaves
    /// service references implicit.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Ok(());
        }
        for descriptor in &self.components {
            let declared = self.services.iter().any(|s| s.name == descriptor.service);
            if !declared {
                return Err(Error::schema_violation(format!(
                    "component {} references undeclared service {}",
                    descriptor.component, descriptor.service
                )));
            }
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_manifest() {
        let doc = json!({
            "services": [
                {"name": "hive", "conf_keys": [
                    {"name": "host", "kind": "str"},
                    {"name": "threads", "kind": "int", "default": 4}
                ]}
            ],
            "components": [
                {
                    "component": "web",
                    "service": "hive",
                    "entry": {"program": "/usr/bin/hive-web", "args": ["--serve"]},
                    "conf_keys": [
                        {"name": "port", "kind": "int", "default": 8080},
                        {"name": "log_file_path", "kind": "path",
                         "path": {"category": "logging", "suffix": "main.log"}}
                    ]
                },
                {"component": "worker", "service": "hive",
                 "entry": {"program": "/usr/bin/hive-worker"}, "neutral": true}
            ]
        });

        let manifest: Manifest = serde_json::from_value(doc).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.components.len(), 2);
        assert!(manifest.components[1].neutral);
        assert_eq!(
            manifest.components[0].entry,
            EntryPoint::new("/usr/bin/hive-web", &["--serve"])
        );

        let conf = manifest.components[0].component_conf().unwrap();
        assert_eq!(conf.kind_of("port"), Some(ValueKind::Int));
        assert_eq!(conf.kind_of("log_file_path"), Some(ValueKind::Path));
    }

    #[test]
    fn test_validate_undeclared_service() {
        let manifest = Manifest {
            services: vec![ServiceDecl {
                name: ServiceName::must("hive"),
                conf_keys: vec![KeyDecl {
                    name: "host".to_string(),
                    kind: ValueKind::Str,
                    default: None,
                    path: None,
                }],
            }],
            components: vec![ComponentDescriptor {
                component: ComponentName::must("web"),
                service: ServiceName::must("ghost"),
                entry: EntryPoint::new("/bin/true", &[]),
                conf_keys: vec![],
                neutral: false,
            }],
        };
        assert!(matches!(
            manifest.validate(),
            Err(Error::SchemaViolation(_))
        ));
    }
}
