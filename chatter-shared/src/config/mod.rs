//! # Configuration
//!
//! Console configuration: defaults, YAML/JSON files, `CHATTER_*` environment
//! variables and command-line overrides.

pub mod console;

pub use console::{Config, ConfigError, ConfigOverrides, LogFormat};
