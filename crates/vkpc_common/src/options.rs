//! SPIR-V build option vocabulary shared by configuration, cache keys and
//! the build pipeline.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A SPIR-V target version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpirvVersion {
    /// SPIR-V 1.0 (Vulkan 1.0).
    #[default]
    #[serde(rename = "1.0")]
    V1_0,
    /// SPIR-V 1.1.
    #[serde(rename = "1.1")]
    V1_1,
    /// SPIR-V 1.2.
    #[serde(rename = "1.2")]
    V1_2,
    /// SPIR-V 1.3 (Vulkan 1.1).
    #[serde(rename = "1.3")]
    V1_3,
    /// SPIR-V 1.4.
    #[serde(rename = "1.4")]
    V1_4,
    /// SPIR-V 1.5 (Vulkan 1.2).
    #[serde(rename = "1.5")]
    V1_5,
    /// SPIR-V 1.6 (Vulkan 1.3).
    #[serde(rename = "1.6")]
    V1_6,
}

impl SpirvVersion {
    /// Every supported version, oldest first.
    pub const ALL: [SpirvVersion; 7] = [
        SpirvVersion::V1_0,
        SpirvVersion::V1_1,
        SpirvVersion::V1_2,
        SpirvVersion::V1_3,
        SpirvVersion::V1_4,
        SpirvVersion::V1_5,
        SpirvVersion::V1_6,
    ];

    /// Minor version number (major is always 1).
    pub fn minor(self) -> u32 {
        self as u32
    }

    /// The version word as encoded in a SPIR-V module header (`0x00010m00`).
    pub fn header_word(self) -> u32 {
        0x0001_0000 | (self.minor() << 8)
    }

    /// Decodes a module header version word.
    pub fn from_header_word(word: u32) -> Option<Self> {
        if word & 0xffff_00ff != 0x0001_0000 {
            return None;
        }
        let minor = (word >> 8) & 0xff;
        SpirvVersion::ALL.get(minor as usize).copied()
    }

    /// The `--target-env` value understood by shader front-ends (`spirv1.3`).
    pub fn target_env(self) -> String {
        format!("spirv1.{}", self.minor())
    }

    /// The Vulkan environment a binary of this version is validated against.
    pub fn vulkan_env(self) -> &'static str {
        match self {
            SpirvVersion::V1_0 => "vulkan1.0",
            SpirvVersion::V1_1 | SpirvVersion::V1_2 | SpirvVersion::V1_3 => "vulkan1.1",
            SpirvVersion::V1_4 => "vulkan1.1spv1.4",
            SpirvVersion::V1_5 => "vulkan1.2",
            SpirvVersion::V1_6 => "vulkan1.3",
        }
    }
}

impl fmt::Display for SpirvVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1.{}", self.minor())
    }
}

/// Error type for parsing SPIR-V version strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported SPIR-V version: '{}'", self.input)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for SpirvVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix("spirv").unwrap_or(trimmed);
        SpirvVersion::ALL
            .into_iter()
            .find(|v| v.to_string() == trimmed)
            .ok_or_else(|| ParseVersionError {
                input: s.to_string(),
            })
    }
}

/// A single named build flag, as written in configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildFlag {
    /// Use the StorageBuffer storage class for SSBOs.
    StorageBufferStorageClass,
    /// Accept relaxed block layout offsets.
    AllowRelaxedOffsets,
    /// Accept scalar block layout offsets.
    AllowScalarOffsets,
    /// Accept std430 layout for uniform buffers.
    AllowStd430Ubos,
    /// Accept scalar block layout in workgroup memory.
    AllowWorkgroupScalarOffsets,
}

bitflags! {
    /// Set of build flags that change how sources are compiled and validated.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BuildFlags: u32 {
        /// See [`BuildFlag::StorageBufferStorageClass`].
        const STORAGE_BUFFER_STORAGE_CLASS = 1 << 0;
        /// See [`BuildFlag::AllowRelaxedOffsets`].
        const ALLOW_RELAXED_OFFSETS = 1 << 1;
        /// See [`BuildFlag::AllowScalarOffsets`].
        const ALLOW_SCALAR_OFFSETS = 1 << 2;
        /// See [`BuildFlag::AllowStd430Ubos`].
        const ALLOW_STD430_UBOS = 1 << 3;
        /// See [`BuildFlag::AllowWorkgroupScalarOffsets`].
        const ALLOW_WORKGROUP_SCALAR_OFFSETS = 1 << 4;
    }
}

impl From<BuildFlag> for BuildFlags {
    fn from(flag: BuildFlag) -> Self {
        match flag {
            BuildFlag::StorageBufferStorageClass => BuildFlags::STORAGE_BUFFER_STORAGE_CLASS,
            BuildFlag::AllowRelaxedOffsets => BuildFlags::ALLOW_RELAXED_OFFSETS,
            BuildFlag::AllowScalarOffsets => BuildFlags::ALLOW_SCALAR_OFFSETS,
            BuildFlag::AllowStd430Ubos => BuildFlags::ALLOW_STD430_UBOS,
            BuildFlag::AllowWorkgroupScalarOffsets => BuildFlags::ALLOW_WORKGROUP_SCALAR_OFFSETS,
        }
    }
}

impl FromIterator<BuildFlag> for BuildFlags {
    fn from_iter<I: IntoIterator<Item = BuildFlag>>(iter: I) -> Self {
        iter.into_iter()
            .fold(BuildFlags::empty(), |acc, flag| acc | BuildFlags::from(flag))
    }
}

/// Selects the optimizer pass recipe run after compilation.
///
/// Recipe `0` disables optimization. Values other than the named constants
/// are accepted here and rejected by the optimizer, so an unknown recipe
/// fails the build rather than silently skipping optimization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptimizationRecipe(pub u32);

impl OptimizationRecipe {
    /// No optimization.
    pub const NONE: OptimizationRecipe = OptimizationRecipe(0);
    /// Performance-oriented passes (`-O`).
    pub const PERFORMANCE: OptimizationRecipe = OptimizationRecipe(1);
    /// Size-oriented passes (`-Os`).
    pub const SIZE: OptimizationRecipe = OptimizationRecipe(2);

    /// Returns `true` if this recipe disables optimization.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for OptimizationRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
