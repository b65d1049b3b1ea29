//! Configuration assembly: `theodore.json` (if present), then `THEODORE_*`
//! environment variables, then compiled-in defaults - one resolution pass
//! per setting, mirroring the layered config resolution the server binary
//! in this lineage uses for its own settings.
//!
//! This is the one place in the binary that reads the environment.
//! `research()` itself never does.

use std::path::Path;

use extraction::ResearchOptions;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
}

/// Optional overrides loaded from `theodore.json`. Every field is optional
/// so the file may specify only the settings it cares about.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    max_depth: Option<usize>,
    max_pages: Option<usize>,
    concurrency: Option<usize>,
    llm_rpm: Option<u32>,
    ssl_verify: Option<bool>,
    progress_path: Option<String>,
}

fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Fully resolved settings, independent of the `ResearchOptions` CLI
/// overrides layered on top in `main`.
pub struct ResolvedConfig {
    pub options: ResearchOptions,
    pub progress_path: Option<String>,
    pub openai_api_key: String,
}

/// Resolve settings in `theodore.json` < `THEODORE_*` env < default order,
/// then fail fast if the one required external credential is missing.
pub fn resolve(config_path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let file = load_config_file(config_path)?;
    let defaults = ResearchOptions::default();

    let options = ResearchOptions {
        max_depth: env_usize("THEODORE_MAX_DEPTH").or(file.max_depth).unwrap_or(defaults.max_depth),
        max_pages: env_usize("THEODORE_MAX_PAGES").or(file.max_pages).unwrap_or(defaults.max_pages),
        concurrency: env_usize("THEODORE_CONCURRENCY")
            .or(file.concurrency)
            .unwrap_or(defaults.concurrency),
        llm_rpm: env_u32("THEODORE_LLM_RPM").or(file.llm_rpm).unwrap_or(defaults.llm_rpm),
        ssl_verify: env_bool("THEODORE_SSL_VERIFY").or(file.ssl_verify).unwrap_or(defaults.ssl_verify),
        ..defaults
    };

    let progress_path = std::env::var("THEODORE_PROGRESS_PATH").ok().or(file.progress_path);

    let openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ConfigError::MissingApiKey)?;

    Ok(ResolvedConfig { options, progress_path, openai_api_key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let file = load_config_file(Path::new("/nonexistent/theodore.json")).unwrap();
        assert_eq!(file.max_depth, None);
    }

    #[test]
    fn test_parses_partial_file() {
        let dir = std::env::temp_dir().join(format!("theodore-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("theodore.json");
        std::fs::write(&path, r#"{"max_depth": 5}"#).unwrap();
        let file = load_config_file(&path).unwrap();
        assert_eq!(file.max_depth, Some(5));
        assert_eq!(file.max_pages, None);
        std::fs::remove_dir_all(&dir).ok();
    }
}
