//! Sync configuration: remote endpoint and per-collection schemas.
//!
//! # Responsibility
//! - Load JSON configuration files and environment overrides.
//! - Turn collection declarations into a validated `SchemaRegistry`.
//!
//! # Invariants
//! - A config that loads successfully always yields a valid registry.
//! - `timeout_ms` is never zero.

use crate::model::about::ABOUT_COLLECTION;
use crate::model::task::TASKS_COLLECTION;
use crate::schema::builtin::{about_rules, task_rules};
use crate::schema::{EntitySchema, FieldRule, SchemaError, SchemaRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default base URL of the Taskboard REST API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api/v1";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Environment variable overriding `remote.base_url`.
pub const ENV_BASE_URL: &str = "TASKBOARD_API_BASE_URL";
/// Environment variable overriding `remote.timeout_ms`.
pub const ENV_TIMEOUT_MS: &str = "TASKBOARD_API_TIMEOUT_MS";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Schema(SchemaError),
    InvalidRemote(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::InvalidRemote(message) => write!(f, "invalid remote config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::InvalidRemote(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<SchemaError> for ConfigError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Remote API endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Per-request transport timeout. Expiry is reported as a `Timeout`
    /// remote failure, never retried.
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Field declarations of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Key wrapping fields in request bodies; defaults to the collection name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_key: Option<String>,
    pub fields: Vec<FieldRule>,
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

impl SyncConfig {
    /// Configuration with the built-in `tasks` and `about` collections.
    pub fn builtin() -> Self {
        let mut collections = BTreeMap::new();
        collections.insert(
            TASKS_COLLECTION.to_string(),
            CollectionConfig {
                resource_key: Some("task".to_string()),
                fields: task_rules(),
            },
        );
        collections.insert(
            ABOUT_COLLECTION.to_string(),
            CollectionConfig {
                resource_key: Some("about".to_string()),
                fields: about_rules(),
            },
        );
        Self {
            remote: RemoteConfig::default(),
            collections,
        }
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `TASKBOARD_API_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            self.remote.base_url = base_url;
        }
        if let Ok(raw) = std::env::var(ENV_TIMEOUT_MS) {
            self.remote.timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::InvalidRemote(format!("{ENV_TIMEOUT_MS} must be an integer, got `{raw}`"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.remote.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidRemote(format!(
                "base_url must start with http:// or https://, got `{base_url}`"
            )));
        }
        if self.remote.timeout_ms == 0 {
            return Err(ConfigError::InvalidRemote(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.schema_registry().map(|_| ())
    }

    /// Builds the schema registry for every declared collection.
    pub fn schema_registry(&self) -> Result<SchemaRegistry, ConfigError> {
        let mut registry = SchemaRegistry::new();
        for (name, collection) in &self.collections {
            let schema = EntitySchema::new(
                name.as_str(),
                collection.resource_key.clone().unwrap_or_default(),
                collection.fields.clone(),
            )?;
            registry.insert(schema);
        }
        Ok(registry)
    }
}
