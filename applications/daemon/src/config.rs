/// Daemon configuration
use crate::error::{DaemonError, Result};
use homekeeper_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "HOMEKEEPER_CONFIG_FILE";

/// Configuration file read from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "homekeeper.toml";

const ENV_PREFIX: &str = "HOMEKEEPER";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    /// Name of the configured rclone remote, e.g. `gdrive`
    #[serde(default)]
    pub remote_name: String,

    #[serde(default)]
    pub directories: Vec<PathBuf>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub sync: SyncConfig,
}

impl DaemonConfig {
    /// Load configuration from file and environment.
    ///
    /// The file comes from `HOMEKEEPER_CONFIG_FILE` when set, otherwise from
    /// `homekeeper.toml` in the working directory if it exists.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref(), environment())
    }

    /// Load configuration from an explicit file and environment source.
    ///
    /// An explicit `path` must exist.
    pub fn load_from(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut settings = config::Config::builder();

        settings = match path {
            Some(path) => settings.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            ),
            None => settings.add_source(
                config::File::from(Path::new(DEFAULT_CONFIG_FILE))
                    .format(config::FileFormat::Toml)
                    .required(false),
            ),
        };

        // Environment overrides the file
        settings = settings.add_source(env);

        let config = settings.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.remote_name.trim().is_empty() {
            return Err(DaemonError::Config(
                "remote name is required (set HOMEKEEPER_REMOTE_NAME)".to_string(),
            ));
        }

        if let Some(dir) = self.directories.iter().find(|dir| !dir.is_absolute()) {
            return Err(DaemonError::Config(format!(
                "directories must be absolute paths: {}",
                dir.display()
            )));
        }

        self.sync.validate()?;
        Ok(())
    }
}

/// Environment source for `HOMEKEEPER_*` variables.
///
/// Nested keys use a double underscore (`HOMEKEEPER_SYNC__WORKERS=2`); list
/// values are comma separated.
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("directories")
        .with_list_parse_key("exclude_patterns")
        .with_list_parse_key("sync.extra_args")
        .try_parsing(true)
}

fn default_exclude_patterns() -> Vec<String> {
    [".DS_Store", "Thumbs.db", "*.tmp", "*.swp", "*~"]
        .iter()
        .map(|p| (*p).to_string())
        .collect()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            remote_name: String::new(),
            directories: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
            sync: SyncConfig::default(),
        }
    }
}
