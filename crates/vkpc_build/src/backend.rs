//! Interfaces to the shader compiler, optimizer and validator.
//!
//! The pipeline treats each tool as an opaque service. Implementations must
//! be usable from several threads at once: builds run concurrently and only
//! the cache accesses around them are serialized.

use vkpc_common::OptimizationRecipe;

use crate::error::BuildError;
use crate::program::{BuildOptions, ProgramSource};
use crate::report::BuildLog;

/// A compiled but not yet post-processed module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    /// SPIR-V words.
    pub words: Vec<u32>,
    /// Compile and link diagnostics.
    pub log: BuildLog,
}

/// Compiles shader sources to SPIR-V.
pub trait ShaderCompiler: Send + Sync {
    /// Name and version of the compiler, part of every cache key.
    fn identity(&self) -> String;

    /// Compiles a single-stage program for `options.target_version`.
    fn compile(
        &self,
        program: &ProgramSource,
        options: &BuildOptions,
    ) -> Result<CompileOutput, BuildError>;
}

/// Runs optimization passes over a SPIR-V module.
pub trait SpirvOptimizer: Send + Sync {
    /// Name and version of the optimizer, part of every cache key.
    fn identity(&self) -> String;

    /// Optimizes `words` with the passes selected by `recipe`.
    ///
    /// Unknown recipes are an error.
    fn optimize(
        &self,
        words: &[u32],
        recipe: OptimizationRecipe,
        options: &BuildOptions,
    ) -> Result<Vec<u32>, BuildError>;
}

/// Checks a SPIR-V module against the Vulkan environment for its version.
pub trait SpirvValidator: Send + Sync {
    /// Validates `words`, returning the validator's messages on success.
    fn validate(&self, words: &[u32], options: &BuildOptions) -> Result<String, BuildError>;
}
