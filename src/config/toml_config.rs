use crate::utils::error::{Result, WranglerError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_OCLC_LINKED_DATA_URL: &str = "http://experiment.worldcat.org";
pub const DEFAULT_VIAF_URL: &str = "http://viaf.org";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
    pub environment: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    pub oclc_linked_data: Option<IntegrationConfig>,
    pub viaf: Option<IntegrationConfig>,
    pub content_server: Option<IntegrationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageConfig {
    pub batch_size: Option<usize>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(WranglerError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        let mut config: TomlConfig = toml::from_str(&processed_content)?;
        config.drop_unresolved_integrations();
        Ok(config)
    }

    /// 替換環境變數 (例如 ${CONTENT_WEB_APP_URL})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| WranglerError::config(format!("bad substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    // 未設定的環境變數會原樣留下 "${...}"，視同沒有設定這個整合
    fn drop_unresolved_integrations(&mut self) {
        let unresolved = |c: &Option<IntegrationConfig>| {
            c.as_ref()
                .map(|c| c.url.trim().is_empty() || c.url.contains("${"))
                .unwrap_or(false)
        };
        if unresolved(&self.integrations.oclc_linked_data) {
            self.integrations.oclc_linked_data = None;
        }
        if unresolved(&self.integrations.viaf) {
            self.integrations.viaf = None;
        }
        if unresolved(&self.integrations.content_server) {
            self.integrations.content_server = None;
        }
    }

    pub fn oclc_linked_data_url(&self) -> &str {
        self.integrations
            .oclc_linked_data
            .as_ref()
            .map(|c| c.url.as_str())
            .unwrap_or(DEFAULT_OCLC_LINKED_DATA_URL)
    }

    pub fn viaf_url(&self) -> Option<&str> {
        self.integrations.viaf.as_ref().map(|c| c.url.as_str())
    }

    pub fn content_server_url(&self) -> Option<&str> {
        self.integrations.content_server.as_ref().map(|c| c.url.as_str())
    }

    pub fn batch_size(&self) -> usize {
        self.coverage.batch_size.unwrap_or(100)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_url(
            "integrations.oclc_linked_data.url",
            self.oclc_linked_data_url(),
        )?;
        if let Some(url) = self.viaf_url() {
            validation::validate_url("integrations.viaf.url", url)?;
        }
        if let Some(url) = self.content_server_url() {
            validation::validate_url("integrations.content_server.url", url)?;
        }
        if let Some(dir) = &self.data.directory {
            validation::validate_path("data.directory", dir)?;
        }
        validation::validate_positive_number("coverage.batch_size", self.batch_size(), 1)?;
        if let Some(retries) = self.http.retry_attempts {
            validation::validate_range("http.retry_attempts", retries, 0, 10)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[data]
directory = "/var/lib/wrangler"

[integrations.oclc_linked_data]
url = "http://oclc.example.com"

[integrations.viaf]
url = "http://viaf.example.com"

[http]
timeout_seconds = 10
retry_attempts = 3

[coverage]
batch_size = 25
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.data.directory.as_deref(), Some("/var/lib/wrangler"));
        assert_eq!(config.oclc_linked_data_url(), "http://oclc.example.com");
        assert_eq!(config.viaf_url(), Some("http://viaf.example.com"));
        assert_eq!(config.content_server_url(), None);
        assert_eq!(config.batch_size(), 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.oclc_linked_data_url(), DEFAULT_OCLC_LINKED_DATA_URL);
        assert_eq!(config.batch_size(), 100);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("WRANGLER_TEST_CONTENT_SERVER", "http://content.example.com");

        let toml_content = r#"
[integrations.content_server]
url = "${WRANGLER_TEST_CONTENT_SERVER}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.content_server_url(), Some("http://content.example.com"));

        std::env::remove_var("WRANGLER_TEST_CONTENT_SERVER");
    }

    #[test]
    fn test_unset_env_var_drops_integration() {
        let toml_content = r#"
[integrations.content_server]
url = "${WRANGLER_TEST_DEFINITELY_UNSET}"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.content_server_url(), None);
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[integrations.viaf]
url = "invalid-url"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[coverage]\nbatch_size = 7\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.batch_size(), 7);
    }
}
