use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub url: String,
    #[serde(default = "default_song_pattern")]
    pub song_pattern: String,
    #[serde(default = "default_log_pattern")]
    pub log_pattern: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub url: String,
}

/// Connection settings for the object store. Only the storage layer reads these.
#[derive(Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_target_partitions")]
    pub target_partitions: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_s3_region(),
            access_key: None,
            secret_key: None,
            allow_http: false,
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_partitions: default_target_partitions(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_song_pattern() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_pattern() -> String {
    "log_data/*/*/*.json".to_string()
}

fn default_s3_region() -> String {
    "us-west-2".to_string()
}

fn default_target_partitions() -> usize {
    4
}

fn default_batch_size() -> usize {
    8192
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        Self::build(builder.build()?)
    }

    /// Loads settings from TOML text without consulting the environment.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;

        Self::build(config)
    }

    fn build(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;

        if settings.engine.target_partitions == 0 {
            return Err(ConfigError::Message(
                "engine.target_partitions must be at least 1".to_string(),
            ));
        }

        debug!(
            input = %settings.input.url,
            output = %settings.output.url,
            storage = ?settings.storage,
            "Loaded ETL settings"
        );

        Ok(settings)
    }
}
