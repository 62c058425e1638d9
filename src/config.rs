use anyhow::Result;
use chrono::Duration;
use config::{Config, Environment, File, FileFormat};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::ValidationError;

pub const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 30;
pub const MAX_RETENTION_HOURS: i64 = 24 * 365;

fn bounded(field: &'static str, got: i64, max: i64) -> Result<i64, ValidationError> {
    if (1..=max).contains(&got) {
        Ok(got)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            got,
            min: 1,
            max,
        })
    }
}

/// Credential lifetime from a minute count, limited to 1..=30 days.
pub fn token_ttl_from_minutes(minutes: i64) -> Result<Duration, ValidationError> {
    let minutes = bounded("token_ttl_minutes", minutes, MAX_TOKEN_TTL_MINUTES)?;
    Ok(Duration::minutes(minutes))
}

/// Main configuration structure for ShipTrack
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ShipTrackConfig {
    /// Credential signing settings
    pub auth: AuthConfig,
    /// Database settings (optional; the in-memory store is used without it)
    pub database: Option<DatabaseConfig>,
    /// Transition engine tuning
    pub workflow: WorkflowConfig,
    pub notifications: NotificationConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret (SHIPTRACK_AUTH__SECRET, or the shorter SHIPTRACK_SECRET)
    pub secret: Option<String>,
    pub token_ttl_minutes: i64,
    pub issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_minutes: 24 * 60,
            issuer: "shiptrack".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Result<Duration, ValidationError> {
        token_ttl_from_minutes(self.token_ttl_minutes)
    }

    /// The configured secret, or a random one for this process. Tokens signed
    /// with a generated secret do not survive a restart.
    pub fn secret_or_generate(&self) -> String {
        let from_env = std::env::var("SHIPTRACK_SECRET").ok();
        match self.secret.as_ref().or(from_env.as_ref()) {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => {
                tracing::warn!("No auth secret configured, generating an ephemeral one");
                rand::rng()
                    .sample_iter(&rand::distr::Alphanumeric)
                    .take(48)
                    .map(char::from)
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://shiptrack.db".to_string(),
            max_connections: 10,
            auto_migrate: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Attempts at the compare-and-set commit before reporting a conflict
    pub max_commit_attempts: u32,
    /// Age after which idempotency records may be purged
    pub idempotency_retention_hours: i64,
}

impl WorkflowConfig {
    /// How long idempotency records must be kept, limited to 1..=365 days.
    /// A shorter or negative window would purge records clients may still retry.
    pub fn retention(&self) -> Result<Duration, ValidationError> {
        let hours = bounded(
            "idempotency_retention_hours",
            self.idempotency_retention_hours,
            MAX_RETENTION_HOURS,
        )?;
        Ok(Duration::hours(hours))
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
            idempotency_retention_hours: 72,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl ShipTrackConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (shiptrack.toml, .shiptrack-rc)
    /// 3. Environment variables (SHIPTRACK_<SECTION>__<KEY>)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("shiptrack.toml").exists() {
            builder = builder.add_source(File::with_name("shiptrack"));
        }

        if Path::new(".shiptrack-rc").exists() {
            builder = builder.add_source(File::new(".shiptrack-rc", FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("SHIPTRACK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a single explicit file plus the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("SHIPTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings outside their allowed ranges.
    pub fn validate(&self) -> Result<()> {
        self.auth.token_ttl()?;
        self.workflow.retention()?;
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ShipTrackConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ShipTrackConfig::load_env_file();
        ShipTrackConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ShipTrackConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup) and return it
pub fn init_config() -> Result<&'static ShipTrackConfig> {
    let config = config()?;
    tracing::debug!("Configuration loaded successfully");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShipTrackConfig::default();
        assert_eq!(config.workflow.max_commit_attempts, 3);
        assert_eq!(config.auth.token_ttl_minutes, 1440);
        assert!(config.database.is_none());
        assert!(config.notifications.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("shiptrack-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partial.toml");
        std::fs::write(
            &path,
            "[workflow]\nmax_commit_attempts = 5\n\n[database]\nurl = \"sqlite::memory:\"\nmax_connections = 1\nauto_migrate = true\n",
        )
        .unwrap();

        let config = ShipTrackConfig::load_from(&path).unwrap();
        assert_eq!(config.workflow.max_commit_attempts, 5);
        assert_eq!(config.workflow.idempotency_retention_hours, 72);
        assert_eq!(config.auth.issuer, "shiptrack");
        assert_eq!(config.database.unwrap().max_connections, 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_save_round_trips() {
        let dir = std::env::temp_dir().join(format!("shiptrack-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("saved.toml");

        let mut config = ShipTrackConfig::default();
        config.auth.secret = Some("s3cret".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = ShipTrackConfig::load_from(&path).unwrap();
        assert_eq!(loaded.auth.secret.as_deref(), Some("s3cret"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        for hours in [0, -1, i64::MAX] {
            let workflow = WorkflowConfig {
                idempotency_retention_hours: hours,
                ..Default::default()
            };
            assert!(matches!(
                workflow.retention(),
                Err(ValidationError::OutOfRange { field: "idempotency_retention_hours", .. })
            ));
        }
        assert_eq!(WorkflowConfig::default().retention(), Ok(Duration::hours(72)));

        assert!(token_ttl_from_minutes(-5).is_err());
        assert!(token_ttl_from_minutes(i64::MAX).is_err());
        assert_eq!(AuthConfig::default().token_ttl(), Ok(Duration::minutes(1440)));
    }

    #[test]
    fn test_load_rejects_negative_retention() {
        let dir = std::env::temp_dir().join(format!("shiptrack-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("negative.toml");
        std::fs::write(&path, "[workflow]\nidempotency_retention_hours = -1\n").unwrap();

        let err = ShipTrackConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("idempotency_retention_hours"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_init_config_returns_the_global_instance() {
        let initialized = init_config().unwrap();
        assert!(std::ptr::eq(initialized, config().unwrap()));
        initialized.validate().unwrap();
    }

    #[test]
    fn test_generated_secret_is_used_only_when_missing() {
        let mut auth = AuthConfig::default();
        assert_eq!(auth.secret_or_generate().len(), 48);
        auth.secret = Some("fixed".to_string());
        assert_eq!(auth.secret_or_generate(), "fixed");
    }
}
