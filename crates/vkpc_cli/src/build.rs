//! `vkpc build`: compile one shader source through the cache.

use std::error::Error;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vkpc_build::{
    BuildOptions, BuildPipeline, ExternalCompiler, ExternalOptimizer, ExternalValidator,
    ProgramSource,
};
use vkpc_cache::ShaderCache;
use vkpc_common::{OptimizationRecipe, ShaderStage, SourceLanguage};

use crate::{resolve_config, BuildArgs, GlobalArgs};

/// Runs the build command. Returns the process exit code.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = resolve_config(global)?;
    let source = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("cannot read {}: {e}", args.file.display()))?;

    let language = args
        .lang
        .map(SourceLanguage::from)
        .unwrap_or_else(|| language_for_path(&args.file));
    let stage = match args.stage {
        Some(stage) => stage,
        None => stage_for_path(&args.file).ok_or_else(|| {
            format!(
                "cannot infer the shader stage of {}; pass --stage",
                args.file.display()
            )
        })?,
    };

    let mut options = BuildOptions::from_config(&config.build);
    if let Some(target) = args.target {
        options.target_version = target;
    }
    if let Some(recipe) = args.optimize {
        options.optimization = OptimizationRecipe(recipe);
    }
    options.validate |= args.validate;

    let mut cache_config = config.cache.clone();
    cache_config.enabled &= !args.no_cache;
    let pipeline = BuildPipeline::new(
        Arc::new(ShaderCache::new(cache_config)),
        Box::new(ExternalCompiler::from_config(&config.tools)),
        Box::new(ExternalOptimizer::from_config(&config.tools)),
        Box::new(ExternalValidator::from_config(&config.tools)),
    )
    .always_validate(config.build.always_validate());

    let program = ProgramSource::new(language).with_source(stage, source);
    let output = pipeline.build(&program, &options)?;

    let out_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.file));
    std::fs::write(&out_path, output.artifact.binary())
        .map_err(|e| format!("cannot write {}: {e}", out_path.display()))?;

    if global.verbose && !output.log.is_empty() {
        eprint!("{}", output.log);
    }
    if !global.quiet {
        let origin = if output.from_cache { "cached" } else { "built" };
        println!(
            "{origin} {} ({} bytes)",
            out_path.display(),
            output.artifact.size()
        );
    }
    Ok(0)
}

/// Infers the stage from the last extension naming one (`a.frag`,
/// `a.frag.glsl`).
fn stage_for_path(path: &Path) -> Option<ShaderStage> {
    let name = path.file_name()?.to_str()?;
    let extensions: Vec<&str> = name.split('.').skip(1).collect();
    extensions
        .iter()
        .rev()
        .take(2)
        .find_map(|ext| ext.parse::<ShaderStage>().ok())
}

fn language_for_path(path: &Path) -> SourceLanguage {
    match path.extension().and_then(|e| e.to_str()) {
        Some("hlsl") => SourceLanguage::Hlsl,
        Some("spvasm") => SourceLanguage::SpirvAssembly,
        _ => SourceLanguage::Glsl,
    }
}

fn default_output(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(".spv");
    PathBuf::from(name)
}
