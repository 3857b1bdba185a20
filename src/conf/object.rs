//! Schema-checked configuration objects.
//!
//! Variables are declared up front with a fixed type and optional default;
//! reads and writes are validated against that schema so a typo or a wrongly
//! typed value is a reportable error instead of a runtime surprise.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::conf::layout::PathSpec;
use crate::types::{Error, Result};

/// Kind of entity a configuration object is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Package,
    Service,
    Component,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::Package => write!(f, "package"),
            OwnerKind::Service => write!(f, "service"),
            OwnerKind::Component => write!(f, "component"),
        }
    }
}

/// Declared type of a configuration variable.
///
/// `Path` values are strings on the wire; the separate kind exists so the
/// standard layout can derive them from the install tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    Path,
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfValue {
    /// Whether this value satisfies the declared kind.
    pub fn matches(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (ConfValue::Bool(_), ValueKind::Bool)
                | (ConfValue::Int(_), ValueKind::Int)
                | (ConfValue::Int(_), ValueKind::Float)
                | (ConfValue::Float(_), ValueKind::Float)
                | (ConfValue::Str(_), ValueKind::Str)
                | (ConfValue::Str(_), ValueKind::Path)
        )
    }

    /// Convert a raw JSON value into a `ConfValue` of the given kind.
    fn from_json(value: &Value, kind: ValueKind) -> Option<ConfValue> {
        match kind {
            ValueKind::Bool => value.as_bool().map(ConfValue::Bool),
            ValueKind::Int => value.as_i64().map(ConfValue::Int),
            ValueKind::Float => value.as_f64().map(ConfValue::Float),
            ValueKind::Str | ValueKind::Path => {
                value.as_str().map(|s| ConfValue::Str(s.to_string()))
            }
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ConfValue::Bool(b) => Value::Bool(*b),
            ConfValue::Int(i) => Value::from(*i),
            ConfValue::Float(f) => Value::from(*f),
            ConfValue::Str(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for ConfValue {
    fn from(s: &str) -> Self {
        ConfValue::Str(s.to_string())
    }
}

impl From<i64> for ConfValue {
    fn from(i: i64) -> Self {
        ConfValue::Int(i)
    }
}

impl From<bool> for ConfValue {
    fn from(b: bool) -> Self {
        ConfValue::Bool(b)
    }
}

impl From<f64> for ConfValue {
    fn from(f: f64) -> Self {
        ConfValue::Float(f)
    }
}

/// One declared variable: schema plus current value.
#[derive(Debug, Clone)]
struct ConfSlot {
    name: String,
    kind: ValueKind,
    default: Option<ConfValue>,
    value: Option<ConfValue>,
    path_spec: Option<PathSpec>,
    /// Set through `set`/`load`, as opposed to derived by the standard
    /// layout. Derived values are recomputed on every standard_configure;
    /// explicit ones are never overwritten by it.
    explicitly_set: bool,
}

/// In-memory, schema-checked key/value store attached to a package, service
/// or component.
///
/// Declaration order is preserved; [`ConfObject::dump`] emits variables in
/// the order they were declared.
#[derive(Debug, Clone)]
pub struct ConfObject {
    owner_kind: OwnerKind,
    owner_name: String,
    slots: Vec<ConfSlot>,
    index: HashMap<String, usize>,
    dirty: bool,
}

impl ConfObject {
    pub fn new(owner_kind: OwnerKind, owner_name: impl Into<String>) -> Self {
        Self {
            owner_kind,
            owner_name: owner_name.into(),
            slots: Vec::new(),
            index: HashMap::new(),
            dirty: false,
        }
    }

    pub fn owner_kind(&self) -> OwnerKind {
        self.owner_kind
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    /// `<kind>:<name>`, written into dumped files and checked on load.
    pub fn owner_label(&self) -> String {
        format!("{}:{}", self.owner_kind, self.owner_name)
    }

    /// File name this object's durable form is stored under.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.owner_kind, self.owner_name)
    }

    /// Register a variable.
    ///
    /// Redeclaring an existing name with the same kind is a no-op; with a
    /// different kind it fails with `DuplicateKey`. Names starting with `_`
    /// are reserved.
    pub fn declare(
        &mut self,
        name: &str,
        kind: ValueKind,
        default: Option<ConfValue>,
    ) -> Result<()> {
        self.declare_slot(name, kind, default, None)
    }

    /// Register a path variable carrying a [`PathSpec`] so the standard
    /// layout can derive its value from the install tree.
    pub fn declare_path(
        &mut self,
        name: &str,
        spec: PathSpec,
        default: Option<ConfValue>,
    ) -> Result<()> {
        self.declare_slot(name, ValueKind::Path, default, Some(spec))
    }

    fn declare_slot(
        &mut self,
        name: &str,
        kind: ValueKind,
        default: Option<ConfValue>,
        path_spec: Option<PathSpec>,
    ) -> Result<()> {
        if name.is_empty() || name.starts_with('_') {
            return Err(Error::invalid_key(format!(
                "configuration variable name {:?} is reserved",
                name
            )));
        }
        if let Some(&i) = self.index.get(name) {
            if self.slots[i].kind != kind {
                return Err(Error::duplicate_key(format!(
                    "{} already declared as {:?}, redeclared as {:?}",
                    name, self.slots[i].kind, kind
                )));
            }
            return Ok(());
        }
        if let Some(ref d) = default {
            if !d.matches(kind) {
                return Err(Error::type_mismatch(format!(
                    "default for {} does not match declared kind {:?}",
                    name, kind
                )));
            }
        }
        self.index.insert(name.to_string(), self.slots.len());
        self.slots.push(ConfSlot {
            name: name.to_string(),
            kind,
            default,
            value: None,
            path_spec,
            explicitly_set: false,
        });
        Ok(())
    }

    /// Whether `name` is declared in this object's schema.
    pub fn is_declared(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declared kind of `name`, if declared.
    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.index.get(name).map(|&i| self.slots[i].kind)
    }

    /// Set a declared variable. Marks the object dirty.
    pub fn set(&mut self, name: &str, value: ConfValue) -> Result<()> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| Error::unknown_key(format!("{} (owner {})", name, self.owner_label())))?;
        let slot = &mut self.slots[i];
        if !value.matches(slot.kind) {
            return Err(Error::type_mismatch(format!(
                "{} declared as {:?}, got {:?}",
                name, slot.kind, value
            )));
        }
        slot.value = Some(value);
        slot.explicitly_set = true;
        self.dirty = true;
        Ok(())
    }

    /// Read a variable: its value, or its default when never set.
    pub fn get(&self, name: &str) -> Result<&ConfValue> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| Error::unknown_key(format!("{} (owner {})", name, self.owner_label())))?;
        let slot = &self.slots[i];
        slot.value
            .as_ref()
            .or(slot.default.as_ref())
            .ok_or_else(|| {
                Error::unknown_key(format!(
                    "{} was never set and has no default (owner {})",
                    name,
                    self.owner_label()
                ))
            })
    }

    /// Whether the object holds unacknowledged mutations.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Durable representation: name → value in declaration order, skipping
    /// variables with neither a value nor a default.
    ///
    /// Clears the dirty flag only when the caller acknowledges with `ack`.
    pub fn dump(&mut self, ack: bool) -> Map<String, Value> {
        let mut out = Map::new();
        for slot in &self.slots {
            if let Some(v) = slot.value.as_ref().or(slot.default.as_ref()) {
                out.insert(slot.name.clone(), v.to_json());
            }
        }
        if ack {
            self.dirty = false;
        }
        out
    }

    /// Apply a durable representation, validating every entry against the
    /// declared schema before touching any state.
    ///
    /// All-or-nothing: an unknown key or type mismatch fails with
    /// `SchemaViolation` and leaves the object unchanged.
    pub fn load(&mut self, repr: &Map<String, Value>) -> Result<()> {
        let mut staged: Vec<(usize, ConfValue)> = Vec::with_capacity(repr.len());
        for (name, raw) in repr {
            let i = *self.index.get(name).ok_or_else(|| {
                Error::schema_violation(format!(
                    "key {} not declared in schema of {}",
                    name,
                    self.owner_label()
                ))
            })?;
            let kind = self.slots[i].kind;
            let value = ConfValue::from_json(raw, kind).ok_or_else(|| {
                Error::schema_violation(format!(
                    "key {} declared as {:?}, representation holds {}",
                    name, kind, raw
                ))
            })?;
            staged.push((i, value));
        }
        for (i, value) in staged {
            self.slots[i].value = Some(value);
            self.slots[i].explicitly_set = true;
        }
        self.dirty = true;
        Ok(())
    }

    /// Write the durable form to a file: `{"owner": ..., "conf": {...}}`.
    ///
    /// Acknowledges the dump (clears dirty) once the write has succeeded.
    pub fn write_file(&mut self, path: &Path) -> Result<()> {
        let mut doc = Map::new();
        doc.insert("owner".to_string(), Value::String(self.owner_label()));
        doc.insert("conf".to_string(), Value::Object(self.dump(false)));
        let text = serde_json::to_string_pretty(&Value::Object(doc))?;
        std::fs::write(path, text)?;
        self.dirty = false;
        tracing::debug!(owner = %self.owner_label(), path = %path.display(), "conf file written");
        Ok(())
    }

    /// Load the durable form from a file written by [`ConfObject::write_file`].
    ///
    /// The owner header must match this object; a mismatched file fails with
    /// `SchemaViolation` without touching state.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&text)?;
        let owner = doc.get("owner").and_then(Value::as_str).ok_or_else(|| {
            Error::schema_violation(format!("conf file {} has no owner header", path.display()))
        })?;
        if owner != self.owner_label() {
            return Err(Error::schema_violation(format!(
                "conf file {} belongs to {}, not {}",
                path.display(),
                owner,
                self.owner_label()
            )));
        }
        let repr = doc.get("conf").and_then(Value::as_object).ok_or_else(|| {
            Error::schema_violation(format!("conf file {} has no conf mapping", path.display()))
        })?;
        self.load(repr)
    }

    pub(crate) fn slots_with_path_spec(&mut self) -> impl Iterator<Item = PathSlotView<'_>> {
        self.slots.iter_mut().filter_map(|slot| {
            slot.path_spec.clone().map(|spec| PathSlotView {
                explicitly_set: slot.explicitly_set,
                value: &mut slot.value,
                spec,
            })
        })
    }
}

/// Mutable view over a path-typed slot, used by the standard layout.
pub(crate) struct PathSlotView<'a> {
    pub explicitly_set: bool,
    pub value: &'a mut Option<ConfValue>,
    pub spec: PathSpec,
}
