//! The vkpc command line: build SPIR-V shaders through a persistent binary cache.
//!
//! Provides `vkpc build` to compile one shader source, `vkpc inspect` to
//! summarize a cache file, and `vkpc truncate` to empty one.

#![warn(missing_docs)]

mod build;
mod inspect;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use vkpc_common::{ShaderStage, SourceLanguage, SpirvVersion};
use vkpc_config::{load_config, load_config_file, VkpcConfig, CONFIG_FILE_NAME};

/// vkpc, a caching shader build driver.
#[derive(Parser, Debug)]
#[command(name = "vkpc", version, about = "Shader build cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `vkpc.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a shader source to SPIR-V.
    Build(BuildArgs),
    /// Summarize the contents of a cache file.
    Inspect {
        /// Cache file to read (default: the configured cache path).
        path: Option<PathBuf>,
    },
    /// Empty the configured cache file.
    Truncate,
}

/// Arguments for the `vkpc build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Shader source file.
    pub file: PathBuf,

    /// Shader stage (default: inferred from the file extension).
    #[arg(short, long)]
    pub stage: Option<ShaderStage>,

    /// Source language (default: inferred from the file extension).
    #[arg(short, long, value_enum)]
    pub lang: Option<Language>,

    /// Output path for the SPIR-V binary.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// SPIR-V target version (overrides `build.target_version`).
    #[arg(long)]
    pub target: Option<SpirvVersion>,

    /// Optimization recipe: 0 none, 1 performance, 2 size.
    #[arg(short = 'O', long)]
    pub optimize: Option<u32>,

    /// Validate the produced binary.
    #[arg(long)]
    pub validate: bool,

    /// Bypass the cache for this build.
    #[arg(long)]
    pub no_cache: bool,
}

/// Shader source language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Language {
    /// OpenGL Shading Language.
    Glsl,
    /// High-Level Shading Language.
    Hlsl,
    /// SPIR-V assembly.
    #[value(name = "spvasm")]
    SpirvAssembly,
}

impl From<Language> for SourceLanguage {
    fn from(lang: Language) -> Self {
        match lang {
            Language::Glsl => SourceLanguage::Glsl,
            Language::Hlsl => SourceLanguage::Hlsl,
            Language::SpirvAssembly => SourceLanguage::SpirvAssembly,
        }
    }
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Inspect { ref path } => inspect::run_inspect(path.as_deref(), &global),
        Command::Truncate => inspect::run_truncate(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the logger. `RUST_LOG` overrides the level chosen by flags.
fn init_logging(global: &GlobalArgs) {
    env_logger::Builder::new()
        .filter_level(log_level(global))
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn log_level(global: &GlobalArgs) -> LevelFilter {
    if global.quiet {
        LevelFilter::Error
    } else if global.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Loads the configuration named by `--config`, else `vkpc.toml` in the
/// current directory, else the defaults.
pub fn resolve_config(global: &GlobalArgs) -> Result<VkpcConfig, Box<dyn std::error::Error>> {
    if let Some(ref path) = global.config {
        let path = PathBuf::from(path);
        let config = if path.is_dir() {
            load_config(&path)?
        } else {
            load_config_file(&path)?
        };
        return Ok(config);
    }
    let cwd = std::env::current_dir()?;
    if cwd.join(CONFIG_FILE_NAME).exists() {
        Ok(load_config(&cwd)?)
    } else {
        Ok(VkpcConfig::default())
    }
}
