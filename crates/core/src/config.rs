use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_HIGH_VALUE_THRESHOLD: u32 = 10_000;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub approvals: ApprovalSettings,
    pub notifications: NotificationSettings,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Approval workflow options, mirrored from the host plugin settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalSettings {
    pub enabled: bool,
    pub high_value_threshold: Decimal,
    /// Usernames eligible to decide high-value orders. Resolved to active
    /// user ids at decision time, so stale names drop out silently.
    pub senior_approver_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://signoff.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            approvals: ApprovalSettings::default(),
            notifications: NotificationSettings::default(),
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true, webhook_url: None }
    }
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            high_value_threshold: Decimal::from(DEFAULT_HIGH_VALUE_THRESHOLD),
            senior_approver_names: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
}

/// Raw TOML shape; every field optional so partial files merge onto
/// defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    database: Option<DatabaseSection>,
    approvals: Option<ApprovalsSection>,
    notifications: Option<NotificationsSection>,
    server: Option<ServerSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsSection {
    enabled: Option<bool>,
    high_value_threshold: Option<String>,
    senior_approver_names: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsSection {
    enabled: Option<bool>,
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Loads defaults, merges an optional TOML file, then applies
    /// `SIGNOFF_*` environment overrides (highest precedence).
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path.or_else(|| {
            let fallback = PathBuf::from("signoff.toml");
            fallback.exists().then_some(fallback)
        });

        if let Some(path) = path {
            let raw = fs::read_to_string(&path)
                .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
            let file: ConfigFile = toml::from_str(&raw)
                .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
            config.merge_file(file);
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn merge_file(&mut self, file: ConfigFile) {
        if let Some(database) = file.database {
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

        if let Some(approvals) = file.approvals {
            if let Some(enabled) = approvals.enabled {
                self.approvals.enabled = enabled;
            }
            if let Some(threshold) = approvals.high_value_threshold {
                self.approvals.high_value_threshold = parse_threshold(&threshold);
            }
            if let Some(names) = approvals.senior_approver_names {
                self.approvals.senior_approver_names = names;
            }
        }

        if let Some(notifications) = file.notifications {
            if let Some(enabled) = notifications.enabled {
                self.notifications.enabled = enabled;
            }
            if let Some(url) = notifications.webhook_url {
                self.notifications.webhook_url = (!url.is_empty()).then_some(url);
            }
        }

        if let Some(server) = file.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("SIGNOFF_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = env::var("SIGNOFF_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("SIGNOFF_LOG_FORMAT") {
            self.logging.format = match format.as_str() {
                "compact" => LogFormat::Compact,
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::InvalidEnvOverride {
                        key: "SIGNOFF_LOG_FORMAT".to_string(),
                        value: other.to_string(),
                    })
                }
            };
        }
        if let Ok(enabled) = env::var("SIGNOFF_APPROVALS_ENABLED") {
            self.approvals.enabled = parse_bool("SIGNOFF_APPROVALS_ENABLED", &enabled)?;
        }
        if let Ok(threshold) = env::var("SIGNOFF_HIGH_VALUE_THRESHOLD") {
            self.approvals.high_value_threshold = parse_threshold(&threshold);
        }
        if let Ok(names) = env::var("SIGNOFF_SENIOR_APPROVERS") {
            self.approvals.senior_approver_names = names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(enabled) = env::var("SIGNOFF_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = parse_bool("SIGNOFF_NOTIFICATIONS_ENABLED", &enabled)?;
        }
        if let Ok(url) = env::var("SIGNOFF_WEBHOOK_URL") {
            self.notifications.webhook_url = (!url.is_empty()).then_some(url);
        }
        if let Ok(bind_address) = env::var("SIGNOFF_BIND_ADDRESS") {
            self.server.bind_address = bind_address;
        }
        if let Ok(port) = env::var("SIGNOFF_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "SIGNOFF_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        Ok(())
    }
}

/// A threshold that fails to parse falls back to the default rather than
/// refusing to start, matching the host plugin's behavior.
fn parse_threshold(raw: &str) -> Decimal {
    match Decimal::from_str(raw.trim()) {
        Ok(threshold) => threshold,
        Err(_) => {
            tracing::warn!(
                raw,
                fallback = DEFAULT_HIGH_VALUE_THRESHOLD,
                "invalid high-value threshold, using default"
            );
            Decimal::from(DEFAULT_HIGH_VALUE_THRESHOLD)
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;

    use super::{parse_threshold, AppConfig, LogFormat};

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert!(config.approvals.enabled);
        assert_eq!(config.approvals.high_value_threshold, Decimal::from(10_000u32));
        assert!(config.approvals.senior_approver_names.is_empty());
        assert!(config.notifications.enabled);
        assert!(config.notifications.webhook_url.is_none());
    }

    #[test]
    fn toml_file_merges_onto_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"
[approvals]
high_value_threshold = "2500"
senior_approver_names = ["alice", "dana"]

[notifications]
webhook_url = "https://hooks.example.com/abc"

[logging]
format = "json"
"#
        )
        .expect("write");

        let config = AppConfig::load(Some(file.path().to_path_buf())).expect("load");
        assert_eq!(config.approvals.high_value_threshold, Decimal::from(2_500u32));
        assert_eq!(config.approvals.senior_approver_names, ["alice", "dana"]);
        assert_eq!(
            config.notifications.webhook_url.as_deref(),
            Some("https://hooks.example.com/abc")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        // Untouched sections keep their defaults.
        assert_eq!(config.database.url, "sqlite://signoff.db");
    }

    #[test]
    fn invalid_threshold_falls_back_to_default() {
        assert_eq!(parse_threshold("not a number"), Decimal::from(10_000u32));
        assert_eq!(parse_threshold(" 1234.50 "), Decimal::new(123_450, 2));
    }

    #[test]
    fn empty_webhook_url_means_unconfigured() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "[notifications]\nwebhook_url = \"\"\n").expect("write");

        let config = AppConfig::load(Some(file.path().to_path_buf())).expect("load");
        assert!(config.notifications.webhook_url.is_none());
    }
}
