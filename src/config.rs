use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where the account documents live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    Path::new(".spotter").join("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

/// Login/signup behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Artificial delay before login, signup and profile results resolve
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Accept a signup whose email is already registered
    #[serde(default)]
    pub allow_duplicate_signups: bool,
}

fn default_delay_ms() -> u64 {
    800
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            allow_duplicate_signups: false,
        }
    }
}

/// External detection service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wait after starting the stream before the first poll
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_warmup_ms() -> u64 {
    2_000
}

fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            warmup_ms: default_warmup_ms(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// JSONL audit trail of account events
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_audit_dir() -> PathBuf {
    Path::new(".spotter").join("audit")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_audit_dir(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.spotter/config.local.toml) > project (.spotter/config.toml) > user (~/.spotter/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".spotter").join("config.toml");
            if user_config.exists() {
                config = Self::load_from(&user_config)?;
            }
        }

        // Later layers replace whole sections they mention
        for layer in ["config.toml", "config.local.toml"] {
            let path = Path::new(".spotter").join(layer);
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                config.merge_toml(&content)?;
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge a TOML document into this config. Only the sections present in
    /// `content` are replaced; missing keys inside a present section take
    /// their defaults.
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let table: toml::Table = toml::from_str(content)?;
        let other: Config = toml::from_str(content)?;

        if table.contains_key("storage") {
            self.storage = other.storage;
        }
        if table.contains_key("auth") {
            self.auth = other.auth;
        }
        if table.contains_key("detection") {
            self.detection = other.detection;
        }
        if table.contains_key("audit") {
            self.audit = other.audit;
        }
        Ok(())
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = self.detection.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "detection.base_url".to_string(),
                message: format!("Expected an http(s) URL, got '{}'", url),
            });
        }

        if self.detection.poll_interval_ms == 0 {
            errors.push(ValidationError {
                field: "detection.poll_interval_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.detection.timeout_ms == 0 {
            errors.push(ValidationError {
                field: "detection.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.detection.max_upload_bytes == 0 {
            errors.push(ValidationError {
                field: "detection.max_upload_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.storage.dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.dir".to_string(),
                message: "Must not be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auth.delay_ms, 800);
        assert!(!config.auth.allow_duplicate_signups);
        assert_eq!(config.detection.base_url, "http://localhost:5000");
        assert_eq!(config.detection.poll_interval_ms, 2_000);
        assert_eq!(config.detection.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.audit.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[detection]\nbase_url = \"http://10.0.0.5:5000\"\n\n[auth]\ndelay_ms = 0\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.detection.base_url, "http://10.0.0.5:5000");
        assert_eq!(config.detection.poll_interval_ms, 2_000);
        assert_eq!(config.auth.delay_ms, 0);
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_merge_only_touches_present_sections() {
        let mut config = Config::default();
        config.auth.delay_ms = 5;
        config
            .merge_toml("[audit]\nenabled = false\n")
            .unwrap();
        assert!(!config.audit.enabled);
        assert_eq!(config.auth.delay_ms, 5);
    }

    #[test]
    fn test_validate_bad_url_and_interval() {
        let mut config = Config::default();
        config.detection.base_url = "localhost:5000".to_string();
        config.detection.poll_interval_ms = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].field.contains("base_url"));
        assert!(errors[1].message.contains("greater than 0"));
    }
}
