//! Shader stages and source languages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A pipeline stage a shader source is written for.
///
/// The declaration order is significant: cache keys list stage sources in
/// exactly this order, so reordering variants invalidates every cache file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Geometry shader.
    Geometry,
    /// Tessellation control shader.
    TessControl,
    /// Tessellation evaluation shader.
    TessEval,
    /// Compute shader.
    Compute,
    /// Ray generation shader.
    RayGen,
    /// Ray any-hit shader.
    AnyHit,
    /// Ray closest-hit shader.
    ClosestHit,
    /// Ray miss shader.
    Miss,
    /// Ray intersection shader.
    Intersection,
    /// Callable shader.
    Callable,
    /// Task shader.
    Task,
    /// Mesh shader.
    Mesh,
}

impl ShaderStage {
    /// Every stage in key order.
    pub const ALL: [ShaderStage; 14] = [
        ShaderStage::Vertex,
        ShaderStage::Fragment,
        ShaderStage::Geometry,
        ShaderStage::TessControl,
        ShaderStage::TessEval,
        ShaderStage::Compute,
        ShaderStage::RayGen,
        ShaderStage::AnyHit,
        ShaderStage::ClosestHit,
        ShaderStage::Miss,
        ShaderStage::Intersection,
        ShaderStage::Callable,
        ShaderStage::Task,
        ShaderStage::Mesh,
    ];

    /// The stage name as it appears in cache keys.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessControl => "tess_control",
            ShaderStage::TessEval => "tess_eval",
            ShaderStage::Compute => "compute",
            ShaderStage::RayGen => "raygen",
            ShaderStage::AnyHit => "any_hit",
            ShaderStage::ClosestHit => "closest_hit",
            ShaderStage::Miss => "miss",
            ShaderStage::Intersection => "intersection",
            ShaderStage::Callable => "callable",
            ShaderStage::Task => "task",
            ShaderStage::Mesh => "mesh",
        }
    }

    /// Short stage suffix used by shader front-ends (`vert`, `frag`, ...).
    pub fn short_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
            ShaderStage::Geometry => "geom",
            ShaderStage::TessControl => "tesc",
            ShaderStage::TessEval => "tese",
            ShaderStage::Compute => "comp",
            ShaderStage::RayGen => "rgen",
            ShaderStage::AnyHit => "rahit",
            ShaderStage::ClosestHit => "rchit",
            ShaderStage::Miss => "rmiss",
            ShaderStage::Intersection => "rint",
            ShaderStage::Callable => "rcall",
            ShaderStage::Task => "task",
            ShaderStage::Mesh => "mesh",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error type for parsing stage names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStageError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseStageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown shader stage: '{}'", self.input)
    }
}

impl std::error::Error for ParseStageError {}

impl FromStr for ShaderStage {
    type Err = ParseStageError;

    /// Accepts both the long key name (`tess_control`) and the short
    /// front-end suffix (`tesc`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ShaderStage::ALL
            .into_iter()
            .find(|stage| stage.name() == lower || stage.short_name() == lower)
            .ok_or_else(|| ParseStageError {
                input: s.to_string(),
            })
    }
}

/// The language a shader program is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceLanguage {
    /// OpenGL Shading Language.
    Glsl,
    /// High-Level Shading Language.
    Hlsl,
    /// Textual SPIR-V assembly.
    SpirvAssembly,
}

impl SourceLanguage {
    /// The language name as it appears in cache keys.
    pub fn name(self) -> &'static str {
        match self {
            SourceLanguage::Glsl => "glsl",
            SourceLanguage::Hlsl => "hlsl",
            SourceLanguage::SpirvAssembly => "spirv-asm",
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_in_declaration_order() {
        let mut sorted = ShaderStage::ALL;
        sorted.sort();
        assert_eq!(sorted, ShaderStage::ALL);
    }

    #[test]
    fn parse_long_and_short_names() {
        assert_eq!("vertex".parse::<ShaderStage>(), Ok(ShaderStage::Vertex));
        assert_eq!("frag".parse::<ShaderStage>(), Ok(ShaderStage::Fragment));
        assert_eq!("TESC".parse::<ShaderStage>(), Ok(ShaderStage::TessControl));
        assert_eq!("rchit".parse::<ShaderStage>(), Ok(ShaderStage::ClosestHit));
    }

    #[test]
    fn parse_unknown_stage() {
        let err = "pixel".parse::<ShaderStage>().unwrap_err();
        assert_eq!(err.to_string(), "unknown shader stage: 'pixel'");
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in ShaderStage::ALL.iter().enumerate() {
            for b in &ShaderStage::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
                assert_ne!(a.short_name(), b.short_name());
            }
        }
    }

    #[test]
    fn language_names() {
        assert_eq!(SourceLanguage::Glsl.to_string(), "glsl");
        assert_eq!(SourceLanguage::SpirvAssembly.to_string(), "spirv-asm");
    }

    #[test]
    fn serde_stage_snake_case() {
        let json = serde_json::to_string(&ShaderStage::TessEval).unwrap();
        assert_eq!(json, "\"tess_eval\"");
    }
}
