use thiserror::Error;

#[derive(Error, Debug)]
pub enum WranglerError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Could not parse {what}: {details}")]
    ParseError { what: String, details: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("Upstream {service} returned status {status}: {message}")]
    UpstreamError {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Coverage provider '{provider}' failed: {details}")]
    CoverageError { provider: String, details: String },

    #[error("Script '{script}' failed: {details}")]
    ScriptError { script: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Data,
    Storage,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl WranglerError {
    pub fn config(message: impl Into<String>) -> Self {
        WranglerError::ConfigError {
            message: message.into(),
        }
    }

    pub fn parse(what: impl Into<String>, details: impl Into<String>) -> Self {
        WranglerError::ParseError {
            what: what.into(),
            details: details.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        WranglerError::NotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            WranglerError::HttpError(_) | WranglerError::UpstreamError { .. } => {
                ErrorCategory::Network
            }
            WranglerError::ConfigError { .. }
            | WranglerError::ConfigValidationError { .. }
            | WranglerError::MissingConfigError { .. }
            | WranglerError::InvalidConfigValueError { .. }
            | WranglerError::UrlError(_) => ErrorCategory::Configuration,
            WranglerError::SerializationError(_)
            | WranglerError::CsvError(_)
            | WranglerError::XmlError(_)
            | WranglerError::ParseError { .. }
            | WranglerError::NotFound { .. } => ErrorCategory::Data,
            WranglerError::IoError(_) => ErrorCategory::Storage,
            WranglerError::CoverageError { .. } | WranglerError::ScriptError { .. } => {
                ErrorCategory::Processing
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Processing => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    /// 是否值得重試 (網路錯誤或上游 5xx)
    pub fn is_transient(&self) -> bool {
        match self {
            WranglerError::HttpError(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            WranglerError::UpstreamError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check network connectivity and the upstream service, then rerun the job",
            ErrorCategory::Configuration => {
                "Check the command-line arguments, environment variables and SIMPLIFIED_CONFIGURATION_FILE"
            }
            ErrorCategory::Data => "Inspect the upstream response; the record may need manual attention",
            ErrorCategory::Storage => "Check that the data directory exists and is writable",
            ErrorCategory::Processing => "Rerun with --verbose to see which item failed",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not talk to an upstream service: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Data => format!("Bad data encountered: {}", self),
            ErrorCategory::Storage => format!("Catalog storage problem: {}", self),
            ErrorCategory::Processing => format!("Job failed: {}", self),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl From<toml::de::Error> for WranglerError {
    fn from(e: toml::de::Error) -> Self {
        WranglerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, WranglerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_severity() {
        assert_eq!(WranglerError::config("x").exit_code(), 3);
        assert_eq!(WranglerError::parse("feed", "bad").exit_code(), 1);
        let upstream = WranglerError::UpstreamError {
            service: "content server".to_string(),
            status: 503,
            message: "down".to_string(),
        };
        assert_eq!(upstream.exit_code(), 2);
        assert!(upstream.is_transient());
    }

    #[test]
    fn test_client_errors_are_not_transient() {
        let upstream = WranglerError::UpstreamError {
            service: "OCLC".to_string(),
            status: 404,
            message: "gone".to_string(),
        };
        assert!(!upstream.is_transient());
        assert_eq!(upstream.category(), ErrorCategory::Network);
    }
}
