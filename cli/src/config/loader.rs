//! Configuration file loading and parsing
//!
//! Loads `git-serve` configuration from RON files, looking in a few standard
//! locations when no path is given.

use super::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "GIT_SERVE_CONFIG_PATH";

/// Standard config file names to search for
const CONFIG_FILENAMES: &[&str] = &["git-serve.ron", ".git-serve/config.ron"];

/// Load configuration from a specific file path
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_ron(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration with automatic file discovery
///
/// Searches for config files in the following locations (in order):
/// 1. Path specified in GIT_SERVE_CONFIG_PATH environment variable
/// 2. git-serve.ron in current directory
/// 3. .git-serve/config.ron relative to current directory
///
/// If no config file is found, returns a default configuration.
pub fn load_with_discovery() -> Result<Config> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    discover(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from), &cwd)
}

fn discover(env_path: Option<PathBuf>, base: &Path) -> Result<Config> {
    if let Some(path) = env_path {
        if path.exists() {
            tracing::info!("Loading config from {CONFIG_PATH_ENV}: {}", path.display());
            return load_from_file(&path);
        }
        tracing::warn!("{CONFIG_PATH_ENV} specified but file not found: {}", path.display());
    }

    for filename in CONFIG_FILENAMES {
        let path = base.join(filename);
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return load_from_file(&path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

/// Parse RON configuration string
fn parse_ron(content: &str) -> Result<Config> {
    ron::from_str(content).context("Failed to parse RON configuration")
}
