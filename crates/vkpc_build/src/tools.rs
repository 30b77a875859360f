//! Backends that run the standard shader tools as subprocesses.
//!
//! GLSL and HLSL go through `glslangValidator`, SPIR-V assembly through
//! `spirv-as`; `spirv-opt` and `spirv-val` post-process the result. Inputs
//! and outputs are exchanged through files in a temporary directory that
//! is removed when the call returns.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output};
use std::time::Instant;

use once_cell::sync::OnceCell;
use vkpc_common::{BuildFlags, OptimizationRecipe, ShaderStage, SourceLanguage, SpirvVersion};
use vkpc_config::ToolsConfig;

use crate::backend::{CompileOutput, ShaderCompiler, SpirvOptimizer, SpirvValidator};
use crate::error::BuildError;
use crate::program::{BuildOptions, ProgramSource};
use crate::report::{BuildLog, StageLog};
use crate::spirv::{words_from_bytes, words_to_bytes};

/// Compiler backed by `glslangValidator` and `spirv-as`.
pub struct ExternalCompiler {
    glslang: String,
    spirv_as: String,
    identity: OnceCell<String>,
}

impl ExternalCompiler {
    /// Uses the tool names from the `[tools]` configuration section.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            glslang: tools.glslang.clone(),
            spirv_as: tools.spirv_as.clone(),
            identity: OnceCell::new(),
        }
    }
}

impl ShaderCompiler for ExternalCompiler {
    fn identity(&self) -> String {
        self.identity
            .get_or_init(|| {
                format!(
                    "{}\n{}",
                    version_line(&self.glslang),
                    version_line(&self.spirv_as)
                )
            })
            .clone()
    }

    fn compile(
        &self,
        program: &ProgramSource,
        options: &BuildOptions,
    ) -> Result<CompileOutput, BuildError> {
        let (stage, source) = program.single_stage()?;
        let dir = temp_dir()?;
        let input = dir
            .path()
            .join(format!("shader.{}", input_extension(program.language)));
        let output = dir.path().join("shader.spv");
        std::fs::write(&input, source).map_err(|e| BuildError::tool("temporary file", e))?;

        let (tool, args) = match program.language {
            SourceLanguage::Glsl | SourceLanguage::Hlsl => (
                self.glslang.as_str(),
                glslang_args(
                    program.language,
                    stage,
                    options.target_version,
                    &input,
                    &output,
                ),
            ),
            SourceLanguage::SpirvAssembly => (
                self.spirv_as.as_str(),
                spirv_as_args(options.target_version, &input, &output),
            ),
        };

        let start = Instant::now();
        let result = run(tool, &args)?;
        let duration = start.elapsed();
        let messages = combined_output(&result);
        let succeeded = result.status.success();

        let log = BuildLog {
            stages: vec![StageLog {
                stage,
                source: source.to_string(),
                log: messages.clone(),
                succeeded,
                duration,
            }],
            ..BuildLog::default()
        };

        if !succeeded {
            log::debug!("{tool} failed on {} shader", stage.name());
            return Err(if messages.contains("ERROR: Linking") {
                BuildError::Link { log: messages }
            } else {
                BuildError::Compile { log: messages }
            });
        }

        let bytes = std::fs::read(&output).map_err(|e| BuildError::tool(tool, e))?;
        let words = words_from_bytes(&bytes)?;
        Ok(CompileOutput { words, log })
    }
}

/// Optimizer backed by `spirv-opt`.
pub struct ExternalOptimizer {
    spirv_opt: String,
    identity: OnceCell<String>,
}

impl ExternalOptimizer {
    /// Uses the tool name from the `[tools]` configuration section.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            spirv_opt: tools.spirv_opt.clone(),
            identity: OnceCell::new(),
        }
    }
}

impl SpirvOptimizer for ExternalOptimizer {
    fn identity(&self) -> String {
        self.identity
            .get_or_init(|| version_line(&self.spirv_opt))
            .clone()
    }

    fn optimize(
        &self,
        words: &[u32],
        recipe: OptimizationRecipe,
        options: &BuildOptions,
    ) -> Result<Vec<u32>, BuildError> {
        let dir = temp_dir()?;
        let input = dir.path().join("input.spv");
        let output = dir.path().join("output.spv");
        let args = spirv_opt_args(recipe, options.target_version, &input, &output)?;
        std::fs::write(&input, words_to_bytes(words))
            .map_err(|e| BuildError::tool("temporary file", e))?;

        let result = run(&self.spirv_opt, &args)?;
        if !result.status.success() {
            return Err(BuildError::Optimize {
                recipe,
                log: combined_output(&result),
            });
        }
        let bytes = std::fs::read(&output).map_err(|e| BuildError::tool(&self.spirv_opt, e))?;
        Ok(words_from_bytes(&bytes)?)
    }
}

/// Validator backed by `spirv-val`.
pub struct ExternalValidator {
    spirv_val: String,
}

impl ExternalValidator {
    /// Uses the tool name from the `[tools]` configuration section.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            spirv_val: tools.spirv_val.clone(),
        }
    }
}

impl SpirvValidator for ExternalValidator {
    fn validate(&self, words: &[u32], options: &BuildOptions) -> Result<String, BuildError> {
        let dir = temp_dir()?;
        let input = dir.path().join("module.spv");
        std::fs::write(&input, words_to_bytes(words))
            .map_err(|e| BuildError::tool("temporary file", e))?;

        let result = run(
            &self.spirv_val,
            &spirv_val_args(options.target_version, options.flags, &input),
        )?;
        let messages = combined_output(&result);
        if result.status.success() {
            Ok(messages)
        } else {
            Err(BuildError::Validate { log: messages })
        }
    }
}

/// Arguments for `glslangValidator`.
pub fn glslang_args(
    language: SourceLanguage,
    stage: ShaderStage,
    version: SpirvVersion,
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-V".into(),
        "--target-env".into(),
        version.target_env().into(),
        "-S".into(),
        stage.short_name().into(),
    ];
    if language == SourceLanguage::Hlsl {
        args.extend(["-D", "-e", "main"].map(OsString::from));
    }
    args.push("-o".into());
    args.push(output.into());
    args.push(input.into());
    args
}

/// Arguments for `spirv-as`.
pub fn spirv_as_args(version: SpirvVersion, input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "--target-env".into(),
        format!("spv1.{}", version.minor()).into(),
        "-o".into(),
        output.into(),
        input.into(),
    ]
}

/// Arguments for `spirv-opt`, or an error for an unknown recipe.
pub fn spirv_opt_args(
    recipe: OptimizationRecipe,
    version: SpirvVersion,
    input: &Path,
    output: &Path,
) -> Result<Vec<OsString>, BuildError> {
    let passes = match recipe {
        OptimizationRecipe::PERFORMANCE => "-O",
        OptimizationRecipe::SIZE => "-Os",
        _ => {
            return Err(BuildError::Optimize {
                recipe,
                log: format!("unknown optimization recipe {recipe}"),
            })
        }
    };
    Ok(vec![
        passes.into(),
        format!("--target-env={}", version.vulkan_env()).into(),
        "-o".into(),
        output.into(),
        input.into(),
    ])
}

/// Arguments for `spirv-val`.
pub fn spirv_val_args(version: SpirvVersion, flags: BuildFlags, input: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--target-env".into(), version.vulkan_env().into()];
    let layout = [
        (BuildFlags::ALLOW_RELAXED_OFFSETS, "--relax-block-layout"),
        (BuildFlags::ALLOW_SCALAR_OFFSETS, "--scalar-block-layout"),
        (
            BuildFlags::ALLOW_STD430_UBOS,
            "--uniform-buffer-standard-layout",
        ),
        (
            BuildFlags::ALLOW_WORKGROUP_SCALAR_OFFSETS,
            "--workgroup-scalar-block-layout",
        ),
    ];
    for (flag, option) in layout {
        if flags.contains(flag) {
            args.push(option.into());
        }
    }
    args.push(input.into());
    args
}

fn input_extension(language: SourceLanguage) -> &'static str {
    match language {
        SourceLanguage::Glsl => "glsl",
        SourceLanguage::Hlsl => "hlsl",
        SourceLanguage::SpirvAssembly => "spvasm",
    }
}

fn temp_dir() -> Result<tempfile::TempDir, BuildError> {
    tempfile::Builder::new()
        .prefix("vkpc-")
        .tempdir()
        .map_err(|e| BuildError::tool("temporary directory", e))
}

fn run(tool: &str, args: &[OsString]) -> Result<Output, BuildError> {
    log::debug!("running {tool} {args:?}");
    Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| BuildError::tool(tool, e))
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

/// First line of `<tool> --version`, or a placeholder if the tool can't run.
fn version_line(tool: &str) -> String {
    let line = Command::new(tool).arg("--version").output().ok().and_then(|out| {
        let text = combined_output(&out);
        text.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    });
    line.unwrap_or_else(|| format!("{tool} (version unknown)"))
}
