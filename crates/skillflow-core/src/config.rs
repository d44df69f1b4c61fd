//! Configuration for the skill execution service.
//!
//! Settings come from an optional YAML file; every field has a default so an
//! empty or missing file yields a working configuration. A few environment
//! variables override the file for container deployments.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the YAML settings file.
pub const CONFIG_ENV: &str = "SKILLFLOW_CONFIG";
/// Environment variable overriding `server.bind`.
pub const BIND_ENV: &str = "SKILLFLOW_BIND";
/// Environment variable overriding `project_dir`.
pub const PROJECT_DIR_ENV: &str = "SKILLFLOW_PROJECT_DIR";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Plugin project holding `skills/<name>/SKILL.md`.
    pub project_dir: PathBuf,
    /// Language the skill documents are written in.
    pub default_language: String,
    pub server: ServerSettings,
    pub sessions: SessionSettings,
    pub runtime: RuntimeSettings,
    pub agents: AgentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            default_language: "ko".to_string(),
            server: ServerSettings::default(),
            sessions: SessionSettings::default(),
            runtime: RuntimeSettings::default(),
            agents: AgentSettings::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Allow any origin.
    pub permissive_cors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3001)),
            permissive_cors: true,
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Directory for session records; `<project_dir>/.skillflow/sessions` when unset.
    pub dir: Option<PathBuf>,
    /// Seconds of inactivity before a session is evicted from memory.
    pub inactivity_timeout_secs: Option<u64>,
}

/// Default in-memory inactivity timeout.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

impl SessionSettings {
    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout_secs
            .map_or(DEFAULT_INACTIVITY_TIMEOUT, Duration::from_secs)
    }
}

/// Agent runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Command used to launch the runtime CLI (may include arguments).
    pub command: String,
    pub model: Option<String>,
    pub max_turns: u32,
    pub permission_mode: String,
    pub disallowed_tools: Vec<String>,
    /// Upper bound on automatic continuation runs per invocation.
    pub max_auto_continues: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            model: None,
            max_turns: 50,
            permission_mode: "acceptEdits".to_string(),
            disallowed_tools: vec![
                "EnterPlanMode".to_string(),
                "ExitPlanMode".to_string(),
                "TodoWrite".to_string(),
            ],
            max_auto_continues: 5,
        }
    }
}

/// Agent roster sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// JSON file with the orchestration roster.
    pub orchestration_file: Option<PathBuf>,
    /// Directory of `<plugin_id>.json` roster files.
    pub plugin_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `path`, or defaults when `path` is `None`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse settings from YAML text.
    ///
    /// # Errors
    /// Returns error if the YAML is invalid.
    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Load from `SKILLFLOW_CONFIG` and apply environment overrides.
    ///
    /// # Errors
    /// Returns error if the file is invalid or an override does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut settings = Self::load(path.as_deref())?;
        settings.apply_overrides(
            std::env::var(BIND_ENV).ok().as_deref(),
            std::env::var(PROJECT_DIR_ENV).ok().as_deref(),
        )?;
        Ok(settings)
    }

    fn apply_overrides(
        &mut self,
        bind: Option<&str>,
        project_dir: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(bind) = bind {
            self.server.bind = bind.parse().map_err(|_| ConfigError::InvalidEnv {
                var: BIND_ENV,
                value: bind.to_string(),
            })?;
        }
        if let Some(dir) = project_dir {
            self.project_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Resolved session directory.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions
            .dir
            .clone()
            .unwrap_or_else(|| self.project_dir.join(".skillflow").join("sessions"))
    }
}
