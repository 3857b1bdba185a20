//! Standard install layout.
//!
//! An installation lives under one base directory with fixed category
//! subdirectories:
//!
//! ```text
//! <base>/conf/<service>-<component>/   conf files, one per ConfObject
//! <base>/data/                         data files and directories
//! <base>/logging/                      log files
//! <base>/static/                       static assets
//! ```
//!
//! Path variables declared with a [`PathSpec`] get their concrete value
//! derived from this layout, scoped by the owner kind: package-level paths
//! use the suffix alone, service-level paths are prefixed with the service
//! name, component-level paths with `<service>-<component>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::conf::object::{ConfObject, ConfValue, OwnerKind};
use crate::types::{ComponentName, Result, ServiceName};

/// Category a derived path lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Data,
    Logging,
    Static,
}

impl FileCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Data => "data",
            FileCategory::Logging => "logging",
            FileCategory::Static => "static",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a path variable maps onto the install tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSpec {
    pub category: FileCategory,
    /// Final path segment, e.g. `main.log` or `db.sqlite3`.
    pub suffix: String,
    /// Directories are created by `build`; files only get their parent.
    #[serde(default)]
    pub is_dir: bool,
}

impl PathSpec {
    pub fn file(category: FileCategory, suffix: impl Into<String>) -> Self {
        Self {
            category,
            suffix: suffix.into(),
            is_dir: false,
        }
    }

    pub fn dir(category: FileCategory, suffix: impl Into<String>) -> Self {
        Self {
            category,
            suffix: suffix.into(),
            is_dir: true,
        }
    }
}

/// Derives concrete paths from the install base directory and materializes
/// the directory tree.
#[derive(Debug, Clone)]
pub struct StandardLayout {
    base: PathBuf,
}

impl StandardLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory holding the conf files of one component.
    pub fn conf_dir(&self, service: &ServiceName, component: &ComponentName) -> PathBuf {
        self.base
            .join("conf")
            .join(format!("{}-{}", service, component))
    }

    /// Concrete path for a spec, scoped by the owning entity's kind.
    pub fn derive_path(
        &self,
        owner_kind: OwnerKind,
        service: &ServiceName,
        component: &ComponentName,
        spec: &PathSpec,
    ) -> PathBuf {
        let stem = match owner_kind {
            OwnerKind::Package => spec.suffix.clone(),
            OwnerKind::Service => format!("{}-{}", service, spec.suffix),
            OwnerKind::Component => format!("{}-{}-{}", service, component, spec.suffix),
        };
        self.base.join(spec.category.as_str()).join(stem)
    }

    /// Fill every path variable that was not explicitly set with its derived
    /// value. Idempotent; re-running with a different base re-derives.
    pub fn standard_configure(
        &self,
        conf: &mut ConfObject,
        service: &ServiceName,
        component: &ComponentName,
    ) {
        let owner_kind = conf.owner_kind();
        for slot in conf.slots_with_path_spec() {
            if slot.explicitly_set {
                continue;
            }
            let path = self.derive_path(owner_kind, service, component, &slot.spec);
            *slot.value = Some(ConfValue::Str(path.display().to_string()));
        }
    }

    /// Materialize the install tree for one component and write its conf
    /// files. Returns the component's conf directory.
    pub fn build(
        &self,
        confs: &mut [&mut ConfObject],
        service: &ServiceName,
        component: &ComponentName,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.base)?;
        for category in ["conf", "data", "logging", "static"] {
            std::fs::create_dir_all(self.base.join(category))?;
        }

        let conf_dir = self.conf_dir(service, component);
        std::fs::create_dir_all(&conf_dir)?;

        for conf in confs.iter_mut() {
            // directory variables are created eagerly so components can rely
            // on them existing at start
            let mut dirs = Vec::new();
            for slot in conf.slots_with_path_spec() {
                if slot.spec.is_dir {
                    if let Some(ConfValue::Str(p)) = slot.value.as_ref() {
                        dirs.push(PathBuf::from(p));
                    }
                }
            }
            for dir in dirs {
                std::fs::create_dir_all(dir)?;
            }

            let path = conf_dir.join(conf.file_name());
            if path.exists() {
                tracing::debug!(path = %path.display(), "conf file already existed and was replaced");
            }
            conf.write_file(&path)?;
        }

        Ok(conf_dir)
    }
}
