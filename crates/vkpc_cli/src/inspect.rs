//! `vkpc inspect` and `vkpc truncate`: cache file maintenance.

use std::error::Error;
use std::path::Path;

use vkpc_cache::{PersistentStore, ShaderCache, StoreStats};
use vkpc_config::CacheConfig;

use crate::{resolve_config, GlobalArgs};

/// Prints a summary of a cache file. Returns the process exit code.
pub fn run_inspect(path: Option<&Path>, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => resolve_config(global)?.cache.path,
    };
    let stats = PersistentStore::new(&path).stats()?;
    println!("{}", path.display());
    print!("{}", format_stats(&stats));
    Ok(0)
}

/// Empties the configured cache file and resets its shared index.
pub fn run_truncate(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = resolve_config(global)?;
    let cache = ShaderCache::new(CacheConfig {
        enabled: true,
        truncate: true,
        ..config.cache
    });
    if !cache.initialize() {
        return Err(format!("cannot truncate cache file {}", cache.path().display()).into());
    }
    if !global.quiet {
        println!("truncated {}", cache.path().display());
    }
    Ok(0)
}

fn format_stats(stats: &StoreStats) -> String {
    let mut out = format!(
        "  chunks:          {}\n  distinct hashes: {}\n  size:            {} bytes\n",
        stats.chunks, stats.distinct_hashes, stats.file_bytes
    );
    if stats.trailing_bytes > 0 {
        out.push_str(&format!(
            "  trailing bytes:  {} (incomplete chunk; entries after it are unreachable, run `vkpc truncate`)\n",
            stats.trailing_bytes
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_summary() {
        let stats = StoreStats {
            chunks: 3,
            distinct_hashes: 2,
            file_bytes: 78,
            trailing_bytes: 3,
        };
        let text = format_stats(&stats);
        assert!(text.contains("chunks:          3"));
        assert!(text.contains("distinct hashes: 2"));
        assert!(text.contains("78 bytes"));
        assert!(text.contains("trailing bytes:  3"));
        assert!(text.contains("vkpc truncate"));
    }

    #[test]
    fn clean_file_has_no_trailing_line() {
        let text = format_stats(&StoreStats::default());
        assert!(!text.contains("trailing"));
    }

    #[test]
    fn truncate_empties_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.bin");
        std::fs::write(&cache_path, b"stale bytes").unwrap();
        let config_path = dir.path().join("vkpc.toml");
        std::fs::write(
            &config_path,
            format!("[cache]\npath = {:?}\ncapacity = 16\n", cache_path),
        )
        .unwrap();

        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(config_path.to_string_lossy().into_owned()),
        };
        assert_eq!(run_truncate(&global).unwrap(), 0);
        assert_eq!(std::fs::metadata(&cache_path).unwrap().len(), 0);
    }
}
