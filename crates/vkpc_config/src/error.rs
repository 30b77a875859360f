//! Errors raised while reading `vkpc.toml`.
//!
//! Every variant names where the configuration came from (a file path, or
//! `vkpc.toml` for in-memory text) and, for rejected values, the dotted
//! field that was rejected.

use std::path::PathBuf;

use crate::types::MAX_CAPACITY;

/// A configuration that could not be read, parsed or accepted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The file that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The text is not valid TOML, or does not match the `vkpc.toml` schema
    /// (unknown lock kind, unsupported SPIR-V version, unknown build flag).
    #[error("{origin}: {message}")]
    Parse {
        /// Where the configuration came from.
        origin: String,
        /// The TOML parser's message, including the line and column.
        message: String,
    },

    /// A path or tool command that must be set is empty.
    #[error("{origin}: `{field}` must not be empty")]
    EmptyValue {
        /// Where the configuration came from.
        origin: String,
        /// Dotted name of the field, e.g. `tools.spirv_opt`.
        field: &'static str,
    },

    /// `cache.capacity` is zero or larger than the index can address.
    #[error("{origin}: `cache.capacity` must be between 1 and {MAX_CAPACITY}, got {capacity}")]
    CapacityOutOfRange {
        /// Where the configuration came from.
        origin: String,
        /// The rejected capacity.
        capacity: u32,
    },

    /// `build.optimization` names a recipe that does not exist.
    #[error("{origin}: `build.optimization` = {recipe} is not a known recipe (0, 1 or 2)")]
    UnknownRecipe {
        /// Where the configuration came from.
        origin: String,
        /// The rejected recipe number.
        recipe: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = ConfigError::Read {
            path: PathBuf::from("/etc/vkpc/vkpc.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        assert_eq!(
            err.to_string(),
            "cannot read /etc/vkpc/vkpc.toml: file not found"
        );
    }

    #[test]
    fn empty_value_names_the_field() {
        let err = ConfigError::EmptyValue {
            origin: "vkpc.toml".to_string(),
            field: "cache.path",
        };
        assert_eq!(err.to_string(), "vkpc.toml: `cache.path` must not be empty");
    }

    #[test]
    fn capacity_message_states_the_range() {
        let err = ConfigError::CapacityOutOfRange {
            origin: "build/vkpc.toml".to_string(),
            capacity: 0,
        };
        assert_eq!(
            err.to_string(),
            format!("build/vkpc.toml: `cache.capacity` must be between 1 and {MAX_CAPACITY}, got 0")
        );
    }

    #[test]
    fn unknown_recipe_lists_known_ones() {
        let err = ConfigError::UnknownRecipe {
            origin: "vkpc.toml".to_string(),
            recipe: 7,
        };
        assert!(err.to_string().contains("`build.optimization` = 7"));
        assert!(err.to_string().contains("0, 1 or 2"));
    }
}
