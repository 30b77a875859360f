//! Program sources and build options.

use vkpc_common::{BuildFlags, OptimizationRecipe, ShaderStage, SourceLanguage, SpirvVersion};
use vkpc_config::BuildConfig;

use crate::error::BuildError;

const STORAGE_BUFFER_PRAGMA: &str = "#pragma use_storage_buffer\n";

/// The sources of one shader program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    /// Language of every source.
    pub language: SourceLanguage,
    /// Source text per stage. Empty texts count as absent.
    pub sources: Vec<(ShaderStage, String)>,
}

impl ProgramSource {
    /// Creates a program with no sources.
    pub fn new(language: SourceLanguage) -> Self {
        Self {
            language,
            sources: Vec::new(),
        }
    }

    /// Creates a GLSL program with a single stage.
    pub fn glsl(stage: ShaderStage, text: impl Into<String>) -> Self {
        Self::new(SourceLanguage::Glsl).with_source(stage, text)
    }

    /// Creates an HLSL program with a single stage.
    pub fn hlsl(stage: ShaderStage, text: impl Into<String>) -> Self {
        Self::new(SourceLanguage::Hlsl).with_source(stage, text)
    }

    /// Creates a SPIR-V assembly program.
    pub fn spirv_asm(stage: ShaderStage, text: impl Into<String>) -> Self {
        Self::new(SourceLanguage::SpirvAssembly).with_source(stage, text)
    }

    /// Adds a stage source.
    pub fn with_source(mut self, stage: ShaderStage, text: impl Into<String>) -> Self {
        self.sources.push((stage, text.into()));
        self
    }

    /// Iterates the non-empty sources.
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, &str)> {
        self.sources
            .iter()
            .filter(|(_, text)| !text.is_empty())
            .map(|(stage, text)| (*stage, text.as_str()))
    }

    /// Returns the program's only non-empty source.
    ///
    /// Fails if there is none, or more than one.
    pub fn single_stage(&self) -> Result<(ShaderStage, &str), BuildError> {
        let mut stages = self.stages();
        let first = stages.next().ok_or(BuildError::EmptyProgram)?;
        let extra = stages.count();
        if extra > 0 {
            return Err(BuildError::MultipleStages { count: extra + 1 });
        }
        Ok(first)
    }

    /// Returns the sources as they are handed to the compiler.
    ///
    /// With [`BuildFlags::STORAGE_BUFFER_STORAGE_CLASS`], GLSL sources get
    /// `#pragma use_storage_buffer` after their `#version` line.
    pub fn prepared(&self, options: &BuildOptions) -> ProgramSource {
        let inject = self.language == SourceLanguage::Glsl
            && options
                .flags
                .contains(BuildFlags::STORAGE_BUFFER_STORAGE_CLASS);
        if !inject {
            return self.clone();
        }
        ProgramSource {
            language: self.language,
            sources: self
                .sources
                .iter()
                .map(|(stage, text)| {
                    let text = if text.is_empty() {
                        String::new()
                    } else {
                        inject_storage_buffer_pragma(text)
                    };
                    (*stage, text)
                })
                .collect(),
        }
    }
}

/// Inserts `#pragma use_storage_buffer` after the first `#version` line,
/// or at the start if there is none.
pub fn inject_storage_buffer_pragma(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + STORAGE_BUFFER_PRAGMA.len() + 1);
    let mut injected = false;
    for line in source.split_inclusive('\n') {
        out.push_str(line);
        if !injected && line.trim_start().starts_with("#version") {
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(STORAGE_BUFFER_PRAGMA);
            injected = true;
        }
    }
    if !injected {
        out.insert_str(0, STORAGE_BUFFER_PRAGMA);
    }
    out
}

/// Options for one build request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// SPIR-V version to produce.
    pub target_version: SpirvVersion,
    /// Source and validation flags.
    pub flags: BuildFlags,
    /// Optimizer recipe, 0 for none.
    pub optimization: OptimizationRecipe,
    /// Validate the result.
    pub validate: bool,
}

impl BuildOptions {
    /// Builds options from the `[build]` configuration section.
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            target_version: config.target_version,
            flags: config.build_flags(),
            optimization: config.optimization,
            validate: config.validate,
        }
    }

    /// Describes every option that changes the produced binary.
    ///
    /// Validation does not change the binary and is left out, so validated
    /// and unvalidated builds share cache entries.
    pub fn cache_description(&self) -> String {
        format!(
            "SPIR-V {} flags {:#x} optimization recipe {}",
            self.target_version,
            self.flags.bits(),
            self.optimization
        )
    }
}
