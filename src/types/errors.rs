//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the steward runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Variable name rejected at declaration time (reserved or malformed).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Variable already declared with a different type.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Variable was never declared, or read before any value existed.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// Value's type disagrees with the declared type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Durable representation does not fit the declared schema.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Settings source could not be read. Fatal at process startup.
    #[error("settings unavailable: {0}")]
    SettingsUnavailable(String),

    /// Settings source is missing a mandatory field. Fatal at process startup.
    #[error("settings incomplete: {0}")]
    SettingsIncomplete(String),

    /// The component's main process could not be spawned.
    #[error("launch failure: {0}")]
    LaunchFailure(String),

    /// A component with that name already exists in the pool.
    #[error("name collision: {0}")]
    NameCollision(String),

    /// Component not present in the administrator's pool.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid lifecycle state transition.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Internal errors (e.g. the administrator loop is gone).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience constructors
impl Error {
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn duplicate_key(msg: impl Into<String>) -> Self {
        Self::DuplicateKey(msg.into())
    }

    pub fn unknown_key(msg: impl Into<String>) -> Self {
        Self::UnknownKey(msg.into())
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub fn schema_violation(msg: impl Into<String>) -> Self {
        Self::SchemaViolation(msg.into())
    }

    pub fn settings_unavailable(msg: impl Into<String>) -> Self {
        Self::SettingsUnavailable(msg.into())
    }

    pub fn settings_incomplete(msg: impl Into<String>) -> Self {
        Self::SettingsIncomplete(msg.into())
    }

    pub fn launch_failure(msg: impl Into<String>) -> Self {
        Self::LaunchFailure(msg.into())
    }

    pub fn name_collision(msg: impl Into<String>) -> Self {
        Self::NameCollision(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is fatal for process startup (settings layer).
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Error::SettingsUnavailable(_) | Error::SettingsIncomplete(_)
        )
    }
}
