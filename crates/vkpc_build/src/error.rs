//! Error types for shader builds.

use vkpc_common::{OptimizationRecipe, SpirvVersion};

use crate::spirv::SpirvError;

/// A fatal failure of one build request.
///
/// Builds are never retried; the caller reports the failure.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The compiler produced a module for a newer SPIR-V version than requested.
    #[error("compiler produced SPIR-V version word {produced:#010x} for target {requested}")]
    UnsupportedTargetVersion {
        /// The requested target version.
        requested: SpirvVersion,
        /// The version word found in the module header.
        produced: u32,
    },

    /// The program has no non-empty shader source.
    #[error("can't compile empty program")]
    EmptyProgram,

    /// The program has sources for more than one stage.
    #[error("program has {count} shader stages; only single-stage programs can be built")]
    MultipleStages {
        /// Number of non-empty stages.
        count: usize,
    },

    /// The front-end rejected a shader source.
    #[error("shader compilation failed:\n{log}")]
    Compile {
        /// Compiler output.
        log: String,
    },

    /// The front-end could not link the compiled stage.
    #[error("program linking failed:\n{log}")]
    Link {
        /// Linker output.
        log: String,
    },

    /// The compiled module could not be parsed while stripping debug info.
    #[error("failed to strip debug info: {0}")]
    StripDebugInfo(#[from] SpirvError),

    /// The optimizer failed or the recipe is unknown.
    #[error("optimization with recipe {recipe} failed:\n{log}")]
    Optimize {
        /// The requested recipe.
        recipe: OptimizationRecipe,
        /// Optimizer output.
        log: String,
    },

    /// The validator rejected the module.
    #[error("validation failed:\n{log}")]
    Validate {
        /// Validator output.
        log: String,
    },

    /// An external tool could not be run.
    #[error("failed to run {tool}: {source}")]
    Tool {
        /// The tool that failed.
        tool: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl BuildError {
    pub(crate) fn tool(tool: impl Into<String>, source: std::io::Error) -> Self {
        BuildError::Tool {
            tool: tool.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            BuildError::EmptyProgram.to_string(),
            "can't compile empty program"
        );
        let err = BuildError::Optimize {
            recipe: OptimizationRecipe(7),
            log: "unknown optimization recipe 7".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "optimization with recipe 7 failed:\nunknown optimization recipe 7"
        );
        let err = BuildError::UnsupportedTargetVersion {
            requested: SpirvVersion::V1_0,
            produced: 0x0001_0300,
        };
        assert!(err.to_string().contains("0x00010300"));
    }

    #[test]
    fn strip_errors_convert() {
        let err: BuildError = SpirvError::TooShort { words: 2 }.into();
        assert!(matches!(err, BuildError::StripDebugInfo(_)));
    }
}
