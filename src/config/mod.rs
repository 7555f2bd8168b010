pub mod cli;
pub mod toml_config;

use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use toml_config::TomlConfig;

pub const CONFIGURATION_FILE_ENV: &str = "SIMPLIFIED_CONFIGURATION_FILE";
pub const DATA_DIRECTORY_ENV: &str = "METADATA_WRANGLER_DATA_DIR";
pub const CONTENT_WEB_APP_URL_ENV: &str = "CONTENT_WEB_APP_URL";

/// Options every wrangler job accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Args)]
pub struct CliConfig {
    /// Path to the TOML configuration file
    #[arg(long, env = CONFIGURATION_FILE_ENV)]
    pub config: Option<String>,

    /// Directory holding the catalog and the materialized views
    #[arg(long, env = DATA_DIRECTORY_ENV)]
    pub data_dir: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage while the job runs")]
    pub monitor: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,
}

/// Command-line options resolved against the configuration file.
#[derive(Debug, Clone)]
pub struct WranglerConfig {
    pub cli: CliConfig,
    pub file: TomlConfig,
    data_directory: String,
}

impl WranglerConfig {
    pub fn load(cli: CliConfig) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path);
                TomlConfig::from_file(path)?
            }
            None => TomlConfig::default(),
        };
        Ok(Self::from_parts(cli, file))
    }

    pub fn from_parts(cli: CliConfig, file: TomlConfig) -> Self {
        let data_directory = cli
            .data_dir
            .clone()
            .or_else(|| file.data.directory.clone())
            .unwrap_or_else(|| "./data".to_string());
        Self {
            cli,
            file,
            data_directory,
        }
    }

    pub fn monitor_enabled(&self) -> bool {
        self.cli.monitor
    }
}

impl ConfigProvider for WranglerConfig {
    fn data_directory(&self) -> &str {
        &self.data_directory
    }

    fn oclc_linked_data_url(&self) -> &str {
        self.file.oclc_linked_data_url()
    }

    fn viaf_url(&self) -> Option<&str> {
        self.file.viaf_url()
    }

    fn content_server_url(&self) -> Option<&str> {
        self.file.content_server_url()
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.file.http.timeout_seconds.unwrap_or(30))
    }

    fn retry_attempts(&self) -> u32 {
        self.file.http.retry_attempts.unwrap_or(2)
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.file.http.retry_delay_seconds.unwrap_or(1))
    }

    fn batch_size(&self) -> usize {
        self.file.batch_size()
    }
}

impl Validate for WranglerConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("data_dir", &self.data_directory)?;
        self.file.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_data_dir_overrides_file() {
        let file = TomlConfig::from_toml_str("[data]\ndirectory = \"/from/file\"\n").unwrap();
        let cli = CliConfig {
            data_dir: Some("/from/cli".to_string()),
            ..Default::default()
        };
        let config = WranglerConfig::from_parts(cli, file.clone());
        assert_eq!(config.data_directory(), "/from/cli");

        let config = WranglerConfig::from_parts(CliConfig::default(), file);
        assert_eq!(config.data_directory(), "/from/file");
    }

    #[test]
    fn test_defaults() {
        let config = WranglerConfig::from_parts(CliConfig::default(), TomlConfig::default());
        assert_eq!(config.data_directory(), "./data");
        assert_eq!(config.retry_attempts(), 2);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }
}
