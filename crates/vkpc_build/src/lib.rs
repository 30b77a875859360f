//! Shader build pipeline with a persistent binary cache.
//!
//! A build turns a [`ProgramSource`] into a SPIR-V [`CachedArtifact`]:
//! look the program up in the [`ShaderCache`], and on a miss compile it,
//! strip debug information, optionally optimize and validate it, then save
//! the result. The compiler, optimizer and validator are reached through the
//! [`ShaderCompiler`], [`SpirvOptimizer`] and [`SpirvValidator`] traits;
//! [`tools`] implements them by running the standard command-line tools.
//!
//! [`CachedArtifact`]: vkpc_cache::CachedArtifact
//! [`ShaderCache`]: vkpc_cache::ShaderCache

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod pipeline;
pub mod program;
pub mod report;
pub mod spirv;
pub mod tools;

pub use backend::{CompileOutput, ShaderCompiler, SpirvOptimizer, SpirvValidator};
pub use error::BuildError;
pub use pipeline::{BuildOutput, BuildPipeline};
pub use program::{BuildOptions, ProgramSource};
pub use report::{BuildLog, StageLog};
pub use spirv::SpirvError;
pub use tools::{ExternalCompiler, ExternalOptimizer, ExternalValidator};
