//! The build pipeline.
//!
//! ```text
//! CheckCache ─ hit ──────────────────────────────────────────────► Done
//!      └──── miss ─► Compile ─► StripDebugInfo ─► [Optimize] ─► [Validate] ─► Save ─► Done
//! ```
//!
//! CheckCache and Save each take the cache lock; the tools in between run
//! without it. Any tool failure ends the request with a [`BuildError`] and
//! nothing is saved.

use std::sync::Arc;

use vkpc_cache::{CacheKey, CachedArtifact, KeyBuilder, ShaderCache};
use vkpc_common::SpirvVersion;

use crate::backend::{ShaderCompiler, SpirvOptimizer, SpirvValidator};
use crate::error::BuildError;
use crate::program::{BuildOptions, ProgramSource};
use crate::report::BuildLog;
use crate::spirv::{check_header, strip_debug_info};

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// The SPIR-V binary.
    pub artifact: CachedArtifact,
    /// Tool diagnostics; empty for cache hits.
    pub log: BuildLog,
    /// Whether the artifact was read from the cache.
    pub from_cache: bool,
}

/// Builds shader programs through a [`ShaderCache`].
pub struct BuildPipeline {
    cache: Arc<ShaderCache>,
    compiler: Box<dyn ShaderCompiler>,
    optimizer: Box<dyn SpirvOptimizer>,
    validator: Box<dyn SpirvValidator>,
    always_validate: bool,
}

impl BuildPipeline {
    /// Creates a pipeline. Validation runs only when requested per build
    /// until [`always_validate`](Self::always_validate) says otherwise.
    pub fn new(
        cache: Arc<ShaderCache>,
        compiler: Box<dyn ShaderCompiler>,
        optimizer: Box<dyn SpirvOptimizer>,
        validator: Box<dyn SpirvValidator>,
    ) -> Self {
        Self {
            cache,
            compiler,
            optimizer,
            validator,
            always_validate: false,
        }
    }

    /// Validates every fresh build, whatever the request says.
    pub fn always_validate(mut self, enabled: bool) -> Self {
        self.always_validate = enabled;
        self
    }

    /// The cache this pipeline reads and fills.
    pub fn cache(&self) -> &ShaderCache {
        &self.cache
    }

    /// Derives the cache key of `program` built with `options`.
    pub fn cache_key(&self, program: &ProgramSource, options: &BuildOptions) -> CacheKey {
        let mut builder = KeyBuilder::new()
            .tool(self.compiler.identity())
            .tool(self.optimizer.identity())
            .options(options.cache_description())
            .language(program.language);
        for (stage, text) in program.stages() {
            builder = builder.source(stage, text);
        }
        builder.finish()
    }

    /// Builds `program`, from the cache when possible.
    pub fn build(
        &self,
        program: &ProgramSource,
        options: &BuildOptions,
    ) -> Result<BuildOutput, BuildError> {
        let (stage, _) = program.single_stage()?;
        let use_cache = self.cache.is_enabled();
        let key = use_cache.then(|| self.cache_key(program, options));

        if let Some(key) = &key {
            if let Some(artifact) = self.cache.lookup(key) {
                return Ok(BuildOutput {
                    artifact,
                    log: BuildLog::default(),
                    from_cache: true,
                });
            }
        }

        log::debug!("compiling {} shader", stage.name());
        let prepared = program.prepared(options);
        let compiled = self.compiler.compile(&prepared, options)?;
        let mut log = compiled.log;

        let version = check_header(&compiled.words)?;
        match SpirvVersion::from_header_word(version) {
            Some(produced) if produced <= options.target_version => {}
            _ => {
                return Err(BuildError::UnsupportedTargetVersion {
                    requested: options.target_version,
                    produced: version,
                })
            }
        }

        let mut words = strip_debug_info(&compiled.words)?;

        if !options.optimization.is_none() {
            words = self
                .optimizer
                .optimize(&words, options.optimization, options)?;
        }

        if options.validate || self.always_validate {
            log.validation_log = Some(self.validator.validate(&words, options)?);
        }

        let artifact = CachedArtifact::spirv(&words);
        if let Some(key) = &key {
            self.cache.save(key, &artifact);
        }

        Ok(BuildOutput {
            artifact,
            log,
            from_cache: false,
        })
    }
}
