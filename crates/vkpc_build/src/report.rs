//! Diagnostic output collected during a build.

use std::fmt;
use std::time::Duration;

use vkpc_common::ShaderStage;

/// Compiler output for one shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLog {
    /// The stage compiled.
    pub stage: ShaderStage,
    /// The source text handed to the compiler.
    pub source: String,
    /// Compiler messages.
    pub log: String,
    /// Whether compilation succeeded.
    pub succeeded: bool,
    /// Time spent compiling.
    pub duration: Duration,
}

/// Everything the tools reported while building one program.
///
/// Empty when the artifact came from the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLog {
    /// One entry per compiled stage.
    pub stages: Vec<StageLog>,
    /// Linker messages.
    pub link_log: String,
    /// Time spent linking.
    pub link_time: Duration,
    /// Validator messages, if validation ran.
    pub validation_log: Option<String>,
}

impl BuildLog {
    /// Returns `true` if no tool ran.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.link_log.is_empty() && self.validation_log.is_none()
    }

    /// Total compile and link time.
    pub fn total_time(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum::<Duration>() + self.link_time
    }
}

impl fmt::Display for BuildLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in &self.stages {
            let status = if stage.succeeded { "ok" } else { "failed" };
            writeln!(
                f,
                "{} shader: {status} ({:.1?})",
                stage.stage.name(),
                stage.duration
            )?;
            if !stage.log.trim().is_empty() {
                writeln!(f, "{}", stage.log.trim_end())?;
            }
        }
        if !self.link_log.trim().is_empty() {
            writeln!(f, "link ({:.1?}):", self.link_time)?;
            writeln!(f, "{}", self.link_log.trim_end())?;
        }
        if let Some(log) = &self.validation_log {
            if !log.trim().is_empty() {
                writeln!(f, "validation:")?;
                writeln!(f, "{}", log.trim_end())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log() {
        let log = BuildLog::default();
        assert!(log.is_empty());
        assert_eq!(log.to_string(), "");
    }

    #[test]
    fn display_lists_stages() {
        let log = BuildLog {
            stages: vec![StageLog {
                stage: ShaderStage::Fragment,
                source: "void main() {}".to_string(),
                log: "WARNING: unused\n".to_string(),
                succeeded: true,
                duration: Duration::from_millis(3),
            }],
            link_time: Duration::from_millis(1),
            ..BuildLog::default()
        };
        assert!(!log.is_empty());
        assert_eq!(log.total_time(), Duration::from_millis(4));
        let text = log.to_string();
        assert!(text.starts_with("fragment shader: ok"));
        assert!(text.contains("WARNING: unused"));
        assert!(!text.contains("link"));
    }
}
