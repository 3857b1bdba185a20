//! Strongly-typed names.
//!
//! Services and components are identified by operator-chosen names, validated
//! at construction time. Component names are globally unique within one
//! administrator's pool, even across services.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed name newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize, Deserialize.
macro_rules! define_name {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                if s.contains(['/', '\\']) {
                    return Err(concat!(
                        stringify!($name),
                        " cannot contain path separators"
                    ));
                }
                Ok(Self(s))
            }

            /// Construct from a literal known to be valid. Panics on invalid
            /// input; intended for tests and static descriptors.
            #[allow(clippy::expect_used)]
            pub fn must(s: &str) -> Self {
                Self::from_string(s.to_string()).expect("invalid name literal")
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_name!(ServiceName);
define_name!(ComponentName);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        assert!(ComponentName::from_string(String::new()).is_err());
        assert!(ServiceName::from_string(String::new()).is_err());
    }

    #[test]
    fn test_rejects_path_separators() {
        assert!(ComponentName::from_string("a/b".to_string()).is_err());
        assert!(ServiceName::from_string("a\\b".to_string()).is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let name = ComponentName::must("worker");
        assert_eq!(name.to_string(), "worker");
        assert_eq!(name.as_str(), "worker");
    }
}
