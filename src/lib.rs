//! # Steward Core - Deployment Runtime Kernel
//!
//! Rust implementation of the steward runtime providing:
//! - Schema-checked configuration objects attached to packages, services and components
//! - Install-scoped settings loaded once per process and propagated into configurations
//! - Component runtimes wrapping one long-running OS process plus strongly-owned children
//! - An administrator managing the lifecycle of a component pool across services
//!
//! ## Architecture
//!
//! The administrator follows a single-actor model where one task owns all pool state:
//! ```text
//!                    ┌─────────────────────────────────┐
//!   commands/signals │       Administrator Task        │
//!        ──────────→ │  ┌─────────┐ ┌──────────────┐   │
//!                    │  │Settings │ │  Component   │   │
//!                    │  │ Loader  │ │  Runtimes    │──→│──→ OS processes
//!                    │  └─────────┘ └──────────────┘   │     (+ children)
//!                    │  ┌─────────┐ ┌──────────────┐   │
//!                    │  │  Conf   │ │   Standard   │   │
//!                    │  │ Objects │ │   Layout     │   │
//!                    │  └─────────┘ └──────────────┘   │
//!                    └─────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod admin;
pub mod conf;
pub mod manifest;
pub mod runtime;
pub mod settings;
pub mod types;

// Internal utilities
pub mod observability;

pub use types::{Config, Error, Result};
