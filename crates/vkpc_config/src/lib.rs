//! Parsing and validation of `vkpc.toml` configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`VkpcConfig`] describing the shader cache, default build options and the
//! external shader tools.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
