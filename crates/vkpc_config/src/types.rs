//! Configuration types deserialized from `vkpc.toml`.

use serde::Deserialize;
use std::path::PathBuf;
use vkpc_common::{BuildFlag, BuildFlags, OptimizationRecipe, SpirvVersion};

/// Default arena capacity of the cache index, in nodes.
pub const DEFAULT_CAPACITY: u32 = 1 << 20;

/// Largest accepted arena capacity, in nodes.
pub const MAX_CAPACITY: u32 = 1 << 28;

/// The top-level configuration parsed from `vkpc.toml`.
///
/// Every section is optional; a missing section takes its defaults.
#[derive(Debug, Default, Deserialize)]
pub struct VkpcConfig {
    /// Shader cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Default build options for requests that do not override them.
    #[serde(default)]
    pub build: BuildConfig,
    /// External shader tool executables.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Which mutual-exclusion scheme guards the cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// Process-local lock; each process scans the cache file on its own.
    #[default]
    Local,
    /// Cross-process lock with the index kept in a named shared memory segment.
    Shared,
}

/// Settings for the persistent shader cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether built artifacts are looked up in and saved to the cache.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path of the cache file.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// Lock variant. Every process sharing one cache file must use the same one.
    #[serde(default)]
    pub lock: LockKind,
    /// Empty the cache file before first use.
    #[serde(default)]
    pub truncate: bool,
    /// Cache index arena capacity, in nodes.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Directory holding the shared memory segment and its lock file.
    ///
    /// Defaults to `/dev/shm` where it exists, else the system temp directory.
    #[serde(default)]
    pub shared_memory_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            lock: LockKind::default(),
            truncate: false,
            capacity: DEFAULT_CAPACITY,
            shared_memory_dir: None,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration for an enabled cache at `path` with defaults
    /// for everything else.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration with caching turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Default build options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    /// SPIR-V version binaries are produced for.
    #[serde(default)]
    pub target_version: SpirvVersion,
    /// Build flags, by name.
    #[serde(default)]
    pub flags: Vec<BuildFlag>,
    /// Optimizer recipe; `0` disables optimization.
    #[serde(default)]
    pub optimization: OptimizationRecipe,
    /// Validate every produced binary.
    #[serde(default)]
    pub validate: bool,
    /// Validate every binary regardless of `validate`.
    ///
    /// Unset means "validate always in debug builds".
    #[serde(default)]
    pub always_validate: Option<bool>,
}

impl BuildConfig {
    /// Returns the configured flags as a bit set.
    pub fn build_flags(&self) -> BuildFlags {
        self.flags.iter().copied().collect()
    }

    /// Returns whether the always-validate policy is in effect.
    pub fn always_validate(&self) -> bool {
        self.always_validate.unwrap_or(cfg!(debug_assertions))
    }
}

/// Executable names or paths of the external shader tools.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// GLSL/HLSL front-end.
    #[serde(default = "default_glslang")]
    pub glslang: String,
    /// SPIR-V assembler.
    #[serde(default = "default_spirv_as")]
    pub spirv_as: String,
    /// SPIR-V optimizer.
    #[serde(default = "default_spirv_opt")]
    pub spirv_opt: String,
    /// SPIR-V validator.
    #[serde(default = "default_spirv_val")]
    pub spirv_val: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            glslang: default_glslang(),
            spirv_as: default_spirv_as(),
            spirv_opt: default_spirv_opt(),
            spirv_val: default_spirv_val(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("shadercache.bin")
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn default_glslang() -> String {
    "glslangValidator".to_string()
}

fn default_spirv_as() -> String {
    "spirv-as".to_string()
}

fn default_spirv_opt() -> String {
    "spirv-opt".to_string()
}

fn default_spirv_val() -> String {
    "spirv-val".to_string()
}
