//! Shared foundational types used across the vkpc shader build cache.
//!
//! This crate provides the FNV-1 cache key hash, shader stage and source
//! language enumerations, and the SPIR-V build option vocabulary.

#![warn(missing_docs)]

pub mod hash;
pub mod options;
pub mod stage;

pub use hash::KeyHash;
pub use options::{BuildFlag, BuildFlags, OptimizationRecipe, SpirvVersion};
pub use stage::{ShaderStage, SourceLanguage};
