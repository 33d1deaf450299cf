// src/config.rs

//! Run configuration
//!
//! Settings come from a TOML file (every key optional) and are then
//! overridden by command-line flags. The API token is never stored in the
//! configuration file: it is read from the process environment, or from a
//! dotenv-style file such as `.env.local`.

use crate::client::DEFAULT_API_URL;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Configuration file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "envsync.toml";

/// Default number of attempts for a transient API failure
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// `KEY=value`, `KEY="value"` or `export KEY='value'`
static ENV_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^#\s]*))"#)
        .expect("env line pattern is valid")
});

/// Settings for one migration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Content Management API base URL
    pub api_url: String,
    /// Environment whose schema is authoritative
    pub source_environment: String,
    /// Environment brought in line with the source
    pub target_environment: String,
    /// Dotenv file consulted for the token
    pub env_file: PathBuf,
    /// Variable holding the read-write API token
    pub token_variable: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            source_environment: "development".to_string(),
            target_environment: "migration-test".to_string(),
            env_file: PathBuf::from(".env.local"),
            token_variable: "DATOCMS_READWRITE_TOKEN".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SyncConfig {
    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Invalid {}: {}", path.display(), e)))
    }

    /// Load the configuration
    ///
    /// An explicit path must exist. Without one, `envsync.toml` in the
    /// working directory, then the user configuration file, are tried;
    /// defaults apply when neither exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidates = [Some(PathBuf::from(LOCAL_CONFIG_FILE)), user_config_path()];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                debug!("Using configuration {}", path.display());
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Resolve the API token
    ///
    /// The process environment wins over the env file.
    pub fn resolve_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var(&self.token_variable)
            && !token.trim().is_empty()
        {
            return Ok(token.trim().to_string());
        }

        if self.env_file.is_file() {
            let content = fs::read_to_string(&self.env_file)?;
            if let Some(token) = find_variable(&content, &self.token_variable)
                && !token.is_empty()
            {
                return Ok(token);
            }
        }

        Err(Error::CredentialsError(format!(
            "{} is not set in the environment or in {}",
            self.token_variable,
            self.env_file.display()
        )))
    }
}

/// `$XDG_CONFIG_HOME/envsync/config.toml` or the platform equivalent
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("envsync").join("config.toml"))
}

/// Value of `name` in dotenv-formatted `content`; the last assignment wins
pub fn find_variable(content: &str, name: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| ENV_LINE_RE.captures(line))
        .filter(|caps| &caps[1] == name)
        .filter_map(|caps| {
            caps.get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
        })
        .last()
}
