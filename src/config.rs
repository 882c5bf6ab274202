//! Service configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration pointed at the public GEOGLOWS API. A `.env` file
//! is read first, and a handful of environment variables override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default GEOGLOWS REST endpoint (version appended separately).
pub const DEFAULT_ENDPOINT: &str = "https://geoglows.ecmwf.int/api";
/// REST API version the client speaks.
pub const DEFAULT_API_VERSION: &str = "v2";
/// Default MCP server name advertised during initialization.
pub const DEFAULT_SERVER_NAME: &str = "geoglows";
/// Default LLM model named in the agent definitions.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Seconds the agent waits on one MCP tool call.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 1500;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geoglows: GeoglowsConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
    pub verify: VerifyConfig,
}

/// Data-service client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoglowsConfig {
    pub endpoint: String,
    pub version: String,
    /// Per-request HTTP timeout. Retrospective downloads are large.
    pub timeout_secs: u64,
}

impl Default for GeoglowsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            version: DEFAULT_API_VERSION.to_owned(),
            timeout_secs: 120,
        }
    }
}

/// MCP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_owned(),
        }
    }
}

/// Agent-side settings: how the toolset launches the server, where plots go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    /// Program that speaks MCP over stdio. `None` re-launches this binary.
    pub server_command: Option<String>,
    pub server_args: Vec<String>,
    pub server_cwd: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Directory the filesystem artifact store writes into.
    pub artifact_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            server_command: None,
            server_args: vec!["serve".to_owned()],
            server_cwd: None,
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            artifact_dir: PathBuf::from("artifacts"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive.
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

/// Reaches probed by `geoglows verify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub reaches: Vec<u64>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            reaches: vec![760701588],
        }
    }
}

impl Config {
    /// Load `.env`, then the TOML file at `path` (if any), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `GEOGLOWS_*` overrides from `lookup` (normally the process env).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(endpoint) = lookup("GEOGLOWS_ENDPOINT") {
            self.geoglows.endpoint = endpoint;
        }
        if let Some(value) = lookup("GEOGLOWS_TIMEOUT_SECS") {
            self.geoglows.timeout_secs =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "GEOGLOWS_TIMEOUT_SECS",
                        value,
                    })?;
        }
        if let Some(dir) = lookup("GEOGLOWS_ARTIFACT_DIR") {
            self.agent.artifact_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("GEOGLOWS_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// The REST base including version, without a trailing slash.
    pub fn api_base(&self) -> String {
        format!(
            "{}/{}",
            self.geoglows.endpoint.trim_end_matches('/'),
            self.geoglows.version.trim_matches('/')
        )
    }
}
