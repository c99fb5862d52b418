use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Base URL prepended to storage keys when resolving download
    /// references.
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://taxcase.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            storage: StorageConfig {
                public_base_url: "http://127.0.0.1:8080/files".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    storage: Option<StoragePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Layered load: struct defaults, then the optional `taxcase.toml`
    /// patch file, then `TAXCASE_*` environment variables, then
    /// programmatic overrides, then validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("taxcase.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(public_base_url) = storage.public_base_url {
                self.storage.public_base_url = public_base_url;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TAXCASE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TAXCASE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TAXCASE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TAXCASE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TAXCASE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TAXCASE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TAXCASE_SERVER_PORT") {
            self.server.port = parse_u16("TAXCASE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TAXCASE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TAXCASE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TAXCASE_STORAGE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = value;
        }

        if let Some(value) = read_env("TAXCASE_LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("TAXCASE_LOGGING_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        if self.storage.public_base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.public_base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("taxcase.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
