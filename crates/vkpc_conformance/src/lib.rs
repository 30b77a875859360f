//! Conformance test helpers for the vkpc shader build cache.
//!
//! Provides deterministic stand-ins for the shader tools that count their
//! invocations, and a harness that wires them into a [`BuildPipeline`] over
//! a cache in a given directory.

#![warn(missing_docs)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vkpc_build::{
    BuildError, BuildLog, BuildOptions, BuildPipeline, CompileOutput, ProgramSource,
    ShaderCompiler, SpirvOptimizer, SpirvValidator, StageLog,
};
use vkpc_cache::ShaderCache;
use vkpc_common::{KeyHash, OptimizationRecipe, ShaderStage};
use vkpc_config::{CacheConfig, LockKind};

const OP_NAME: u32 = 5;
const OP_CAPABILITY: u32 = 17;

/// Invocation counters shared by the stand-in tools.
#[derive(Clone, Default)]
pub struct ToolCalls {
    compile: Arc<AtomicUsize>,
    optimize: Arc<AtomicUsize>,
    validate: Arc<AtomicUsize>,
}

impl ToolCalls {
    /// Number of compiler invocations.
    pub fn compiles(&self) -> usize {
        self.compile.load(Ordering::SeqCst)
    }

    /// Number of optimizer invocations.
    pub fn optimizations(&self) -> usize {
        self.optimize.load(Ordering::SeqCst)
    }

    /// Number of validator invocations.
    pub fn validations(&self) -> usize {
        self.validate.load(Ordering::SeqCst)
    }
}

/// Compiler producing a small module derived from the source hash.
///
/// The module carries an `OpName` so debug-info stripping is observable.
pub struct CountingCompiler(pub ToolCalls);

impl ShaderCompiler for CountingCompiler {
    fn identity(&self) -> String {
        "counting-compiler 1".to_string()
    }

    fn compile(
        &self,
        program: &ProgramSource,
        options: &BuildOptions,
    ) -> Result<CompileOutput, BuildError> {
        self.0.compile.fetch_add(1, Ordering::SeqCst);
        let (stage, source) = program.single_stage()?;
        if source.contains("syntax error") {
            return Err(BuildError::Compile {
                log: format!("ERROR: {}: syntax error", stage.name()),
            });
        }
        let words = vec![
            0x0723_0203,
            options.target_version.header_word(),
            0,
            8,
            0,
            (2 << 16) | OP_CAPABILITY,
            KeyHash::from_bytes(source.as_bytes()).get(),
            (3 << 16) | OP_NAME,
            1,
            0x6e69_616d,
        ];
        Ok(CompileOutput {
            words,
            log: BuildLog {
                stages: vec![StageLog {
                    stage,
                    source: source.to_string(),
                    log: String::new(),
                    succeeded: true,
                    duration: Default::default(),
                }],
                ..BuildLog::default()
            },
        })
    }
}

/// Optimizer appending one marker instruction per run.
pub struct CountingOptimizer(pub ToolCalls);

impl SpirvOptimizer for CountingOptimizer {
    fn identity(&self) -> String {
        "counting-optimizer 1".to_string()
    }

    fn optimize(
        &self,
        words: &[u32],
        recipe: OptimizationRecipe,
        _options: &BuildOptions,
    ) -> Result<Vec<u32>, BuildError> {
        self.0.optimize.fetch_add(1, Ordering::SeqCst);
        if recipe.0 > 2 {
            return Err(BuildError::Optimize {
                recipe,
                log: format!("unknown optimization recipe {recipe}"),
            });
        }
        let mut out = words.to_vec();
        out.extend_from_slice(&[(2 << 16) | OP_CAPABILITY, recipe.0]);
        Ok(out)
    }
}

/// Validator accepting every module.
pub struct CountingValidator(pub ToolCalls);

impl SpirvValidator for CountingValidator {
    fn validate(&self, _words: &[u32], _options: &BuildOptions) -> Result<String, BuildError> {
        self.0.validate.fetch_add(1, Ordering::SeqCst);
        Ok(String::new())
    }
}

/// A cache configuration rooted in `dir` with a small arena.
pub fn cache_config(dir: &Path, lock: LockKind) -> CacheConfig {
    CacheConfig {
        lock,
        capacity: 4096,
        shared_memory_dir: Some(dir.join("shm")),
        ..CacheConfig::at(dir.join("cache").join("shadercache.bin"))
    }
}

/// A pipeline over stand-in tools and its invocation counters.
pub struct Harness {
    /// Counters of the stand-in tools.
    pub calls: ToolCalls,
    /// The pipeline under test.
    pub pipeline: BuildPipeline,
}

impl Harness {
    /// Builds a harness around a fresh [`ShaderCache`] for `config`.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_cache(Arc::new(ShaderCache::new(config)))
    }

    /// Builds a harness around an existing cache.
    pub fn with_cache(cache: Arc<ShaderCache>) -> Self {
        let calls = ToolCalls::default();
        let pipeline = BuildPipeline::new(
            cache,
            Box::new(CountingCompiler(calls.clone())),
            Box::new(CountingOptimizer(calls.clone())),
            Box::new(CountingValidator(calls.clone())),
        );
        Self { calls, pipeline }
    }
}

/// A single-stage GLSL program.
pub fn glsl(stage: ShaderStage, source: &str) -> ProgramSource {
    ProgramSource::glsl(stage, source)
}
