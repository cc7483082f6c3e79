//! Configuration system for friendrec.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **Config file** - `~/.config/friendrec/config.toml`, or `--config <path>`
//! 3. **Environment variables** - `FRIENDREC_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! embeddings = "/srv/friendrec/user_embeddings.npy"
//! directory = "/srv/friendrec/users.csv"
//!
//! [recommend]
//! top_k = 5
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//!
//! [output]
//! format = "text"
//! colors = true
//! ```

use crate::error::{FriendRecError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for friendrec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub recommend: RecommendConfig,
    pub server: ServerConfig,
    pub output: OutputConfig,
}

/// Input file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Embedding file (`.npy` or `.json`).
    /// Environment variable: `FRIENDREC_EMBEDDINGS`
    pub embeddings: Option<PathBuf>,

    /// `uid,info` CSV roster.
    /// Environment variable: `FRIENDREC_DIRECTORY`
    pub directory: Option<PathBuf>,
}

/// Recommendation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Number of friends to recommend when the caller does not say.
    /// Environment variable: `FRIENDREC_TOP_K`
    pub top_k: usize,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Environment variable: `FRIENDREC_HOST`
    pub host: String,
    /// Environment variable: `FRIENDREC_PORT`
    pub port: u16,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty, compact, csv.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            top_k: crate::DEFAULT_TOP_K,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// `explicit` is a `--config` path. Unlike the user config file, it must
    /// exist and parse.
    ///
    /// # Errors
    ///
    /// Returns [`FriendRecError::ConfigError`] if a config file exists but
    /// cannot be parsed, or an explicit path cannot be read.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::user_config_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());

        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns [`FriendRecError::ConfigError`] if the file cannot be read or
    /// is not valid TOML for this schema.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FriendRecError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| FriendRecError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("friendrec").join("config.toml"))
    }

    /// Apply `FRIENDREC_*` overrides read through `var`.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("FRIENDREC_EMBEDDINGS") {
            self.paths.embeddings = Some(PathBuf::from(path));
        }
        if let Some(path) = var("FRIENDREC_DIRECTORY") {
            self.paths.directory = Some(PathBuf::from(path));
        }
        if let Some(n) = var("FRIENDREC_TOP_K").and_then(|v| v.parse().ok()) {
            self.recommend.top_k = n;
        }
        if let Some(host) = var("FRIENDREC_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("FRIENDREC_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(format) = var("FRIENDREC_FORMAT") {
            self.output.format = format;
        }
        if var("FRIENDREC_NO_COLOR").is_some() || var("NO_COLOR").is_some() {
            self.output.colors = false;
        }
    }

    /// Embedding file path, using the data-dir default if not configured.
    #[must_use]
    pub fn embeddings_path(&self) -> PathBuf {
        self.paths
            .embeddings
            .clone()
            .unwrap_or_else(crate::default_embeddings_path)
    }

    /// Directory CSV path. The default location is used only if a file
    /// exists there, since the directory is optional.
    #[must_use]
    pub fn directory_path(&self) -> Option<PathBuf> {
        self.paths.directory.clone().or_else(|| {
            let default = crate::default_directory_path();
            default.exists().then_some(default)
        })
    }

    /// Look up a single value by dotted key (see [`crate::VALID_CONFIG_KEYS`]).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let display = |p: &Option<PathBuf>| {
            p.as_ref()
                .map_or_else(|| "(unset)".to_string(), |p| p.display().to_string())
        };
        match key {
            "paths.embeddings" => Some(display(&self.paths.embeddings)),
            "paths.directory" => Some(display(&self.paths.directory)),
            "recommend.top_k" => Some(self.recommend.top_k.to_string()),
            "server.host" => Some(self.server.host.clone()),
            "server.port" => Some(self.server.port.to_string()),
            "output.format" => Some(self.output.format.clone()),
            "output.colors" => Some(self.output.colors.to_string()),
            _ => None,
        }
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
