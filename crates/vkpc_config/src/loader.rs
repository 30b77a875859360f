//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{VkpcConfig, MAX_CAPACITY};
use std::path::Path;

/// Name of the configuration file looked up in a directory.
pub const CONFIG_FILE_NAME: &str = "vkpc.toml";

/// Loads and validates `<dir>/vkpc.toml`.
pub fn load_config(dir: &Path) -> Result<VkpcConfig, ConfigError> {
    load_config_file(&dir.join(CONFIG_FILE_NAME))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<VkpcConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, &path.display().to_string())
}

/// Parses and validates a `vkpc.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<VkpcConfig, ConfigError> {
    parse_config(content, CONFIG_FILE_NAME)
}

fn parse_config(content: &str, origin: &str) -> Result<VkpcConfig, ConfigError> {
    let config: VkpcConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config, origin)?;
    Ok(config)
}

/// Checks the values serde cannot: non-empty paths and commands, and ranges.
fn validate_config(config: &VkpcConfig, origin: &str) -> Result<(), ConfigError> {
    let empty = |field| ConfigError::EmptyValue {
        origin: origin.to_string(),
        field,
    };
    let cache = &config.cache;
    if cache.enabled && cache.path.as_os_str().is_empty() {
        return Err(empty("cache.path"));
    }
    if cache.capacity == 0 || cache.capacity > MAX_CAPACITY {
        return Err(ConfigError::CapacityOutOfRange {
            origin: origin.to_string(),
            capacity: cache.capacity,
        });
    }
    if config.build.optimization.0 > 2 {
        return Err(ConfigError::UnknownRecipe {
            origin: origin.to_string(),
            recipe: config.build.optimization.0,
        });
    }
    for (field, tool) in [
        ("tools.glslang", &config.tools.glslang),
        ("tools.spirv_as", &config.tools.spirv_as),
        ("tools.spirv_opt", &config.tools.spirv_opt),
        ("tools.spirv_val", &config.tools.spirv_val),
    ] {
        if tool.trim().is_empty() {
            return Err(empty(field));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LockKind;
    use std::path::PathBuf;
    use vkpc_common::{BuildFlags, OptimizationRecipe, SpirvVersion};

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.path, PathBuf::from("shadercache.bin"));
        assert_eq!(config.cache.lock, LockKind::Local);
        assert_eq!(config.build.target_version, SpirvVersion::V1_0);
        assert!(config.build.optimization.is_none());
        assert_eq!(config.tools.glslang, "glslangValidator");
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[cache]
enabled = true
path = "/var/cache/vkpc/shadercache.bin"
lock = "shared"
truncate = true
capacity = 4096
shared_memory_dir = "/tmp/vkpc"

[build]
target_version = "1.3"
flags = ["storage-buffer-storage-class", "allow-scalar-offsets"]
optimization = 2
validate = true
always_validate = false

[tools]
glslang = "/opt/vulkan/bin/glslangValidator"
spirv_opt = "/opt/vulkan/bin/spirv-opt"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache.lock, LockKind::Shared);
        assert!(config.cache.truncate);
        assert_eq!(config.cache.capacity, 4096);
        assert_eq!(
            config.cache.shared_memory_dir,
            Some(PathBuf::from("/tmp/vkpc"))
        );
        assert_eq!(config.build.target_version, SpirvVersion::V1_3);
        assert_eq!(
            config.build.build_flags(),
            BuildFlags::STORAGE_BUFFER_STORAGE_CLASS | BuildFlags::ALLOW_SCALAR_OFFSETS
        );
        assert_eq!(config.build.optimization, OptimizationRecipe::SIZE);
        assert!(config.build.validate);
        assert!(!config.build.always_validate());
        assert_eq!(config.tools.spirv_opt, "/opt/vulkan/bin/spirv-opt");
        assert_eq!(config.tools.spirv_val, "spirv-val");
    }

    #[test]
    fn empty_path_with_cache_enabled_errors() {
        let err = load_config_from_str("[cache]\npath = \"\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyValue {
                field: "cache.path",
                ..
            }
        ));
    }

    #[test]
    fn empty_path_with_cache_disabled_is_fine() {
        let config = load_config_from_str("[cache]\nenabled = false\npath = \"\"\n").unwrap();
        assert!(!config.cache.enabled);
    }

    #[test]
    fn zero_capacity_errors() {
        let err = load_config_from_str("[cache]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CapacityOutOfRange { capacity: 0, .. }
        ));
    }

    #[test]
    fn unknown_recipe_errors() {
        let err = load_config_from_str("[build]\noptimization = 7\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRecipe { recipe: 7, .. }));
    }

    #[test]
    fn unknown_lock_kind_errors() {
        let err = load_config_from_str("[cache]\nlock = \"global\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unsupported_version_errors() {
        let err = load_config_from_str("[build]\ntarget_version = \"2.0\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[cache]\nlock = \"shared\"\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.cache.lock, LockKind::Shared);
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/dir/vkpc.toml"));
    }

    #[test]
    fn file_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.toml");
        std::fs::write(&path, "[tools]\nspirv_opt = \"  \"\n").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyValue {
                field: "tools.spirv_opt",
                ..
            }
        ));
        assert!(err.to_string().starts_with(&path.display().to_string()));
    }
}
