//! Configuration objects and the standard install layout.
//!
//! A [`ConfObject`] is the schema-checked key/value store attached to a
//! package, service or component. [`StandardLayout`] derives on-disk paths for
//! declared path variables and materializes the install tree.

pub mod layout;
pub mod object;

pub use layout::{FileCategory, PathSpec, StandardLayout};
pub use object::{ConfObject, ConfValue, OwnerKind, ValueKind};
