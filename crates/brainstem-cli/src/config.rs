//! Operator configuration for the `brainstem` binary.
//!
//! One TOML file at `~/.brainstem/config.toml` describes where the oracle
//! lives and how the thread's checkpoints are stored.  `BRAINSTEM_*`
//! environment variables override individual fields at load time, and the
//! result is validated before the driver is assembled: the thread id keys
//! checkpoint storage on disk, so a value that cannot name a directory is
//! refused up front rather than failing somewhere inside the graph.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can arise from the config vault.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config encoding error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where checkpoints are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

impl CheckpointBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(CheckpointBackend::Memory),
            "file" => Some(CheckpointBackend::File),
            "sqlite" => Some(CheckpointBackend::Sqlite),
            _ => None,
        }
    }
}

/// Operator configuration, persisted at [`vault_path`].
///
/// Missing fields take the built-in defaults, so a hand-edited file only
/// needs the lines it changes.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the OpenAI-compatible model server.
    pub oracle_url: String,
    /// Model name used for decisions.
    pub oracle_model: String,
    /// Bearer token for hosted endpoints; empty for local servers.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub oracle_api_key: String,
    /// Checkpoint storage backend.
    pub checkpoint_backend: CheckpointBackend,
    /// Directory (file backend) or database path (sqlite backend).
    pub checkpoint_path: String,
    /// Logical session key; also the on-disk checkpoint directory name.
    pub thread_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            oracle_url: "http://localhost:11434".to_string(),
            oracle_model: "qwen2.5".to_string(),
            oracle_api_key: String::new(),
            checkpoint_backend: CheckpointBackend::default(),
            checkpoint_path: ".brainstem-checkpoints".to_string(),
            thread_id: "robot_brain_main".to_string(),
        }
    }
}

// The vault can hold an API key; Debug output reports whether one is set
// without ever echoing it.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("oracle_url", &self.oracle_url)
            .field("oracle_model", &self.oracle_model)
            .field("oracle_api_key_set", &!self.oracle_api_key.is_empty())
            .field("checkpoint_backend", &self.checkpoint_backend)
            .field("checkpoint_path", &self.checkpoint_path)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

/// `~/.brainstem/config.toml`, falling back to the working directory when
/// no home directory is known.
pub fn vault_path() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".brainstem")
        .join("config.toml")
}

impl Config {
    /// Load the vault at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist yet.  Environment
    /// overrides and validation are applied to whatever was read.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let mut cfg: Config = toml::from_str(&raw)?;
        cfg.override_from_env();
        cfg.validate()?;
        Ok(Some(cfg))
    }

    /// Write the vault to `path`, creating its directory first.
    ///
    /// The directory is locked down to the owner before the file is
    /// created, so a stored API key never transits a world-readable path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
            restrict_to_owner(dir, 0o700).map_err(write_err)?;
        }
        fs::write(path, toml::to_string_pretty(self)?).map_err(write_err)?;
        restrict_to_owner(path, 0o600).map_err(write_err)?;
        Ok(())
    }

    /// Refuse values the rest of the stack cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.oracle_url.starts_with("http://") && !self.oracle_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "oracle_url must be an http(s) URL, got {:?}",
                self.oracle_url
            )));
        }
        if self.thread_id.is_empty() {
            return Err(ConfigError::Invalid("thread_id must not be empty".into()));
        }
        // The thread id becomes a checkpoint directory name and a database
        // key; path separators and whitespace would corrupt both.
        if !self
            .thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Invalid(format!(
                "thread_id {:?} may only contain [A-Za-z0-9_-]",
                self.thread_id
            )));
        }
        if self.checkpoint_backend != CheckpointBackend::Memory
            && self.checkpoint_path.trim().is_empty()
        {
            return Err(ConfigError::Invalid(format!(
                "checkpoint_path is required for the {:?} backend",
                self.checkpoint_backend
            )));
        }
        Ok(())
    }

    /// Fold `BRAINSTEM_*` environment overrides into this config.
    fn override_from_env(&mut self) {
        env_override(&mut self.oracle_url, "BRAINSTEM_ORACLE_URL");
        env_override(&mut self.oracle_model, "BRAINSTEM_MODEL");
        env_override(&mut self.oracle_api_key, "BRAINSTEM_API_KEY");
        env_override(&mut self.checkpoint_path, "BRAINSTEM_CHECKPOINT_PATH");
        env_override(&mut self.thread_id, "BRAINSTEM_THREAD_ID");
        if let Ok(v) = std::env::var("BRAINSTEM_CHECKPOINT_BACKEND") {
            if let Some(backend) = CheckpointBackend::parse(&v) {
                self.checkpoint_backend = backend;
            }
        }
    }
}

fn env_override(field: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *field = value;
        }
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
