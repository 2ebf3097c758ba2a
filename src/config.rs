//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Whether an already-flagged card is re-notified on every live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenotifyPolicy {
    /// Re-notify on every event that finds the card still invalid.
    #[default]
    Always,
    /// Re-notify only when the failing rule set differs from the last notification.
    OnChange,
}

impl FromStr for RenotifyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "on-change" | "on_change" => Ok(Self::OnChange),
            other => Err(ConfigError::InvalidValue {
                key: "WARDEN_RENOTIFY".into(),
                message: format!("expected 'always' or 'on-change', got '{other}'"),
            }),
        }
    }
}

/// Card service API configuration.
#[derive(Debug, Clone)]
pub struct TrelloConfig {
    pub api_base: String,
    pub api_key: SecretString,
    pub api_token: SecretString,
}

/// Sweep pass configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Six-field cron expression (seconds first).
    pub schedule: String,
    /// Maximum number of cards re-checked in parallel.
    pub concurrency: usize,
}

impl SweepConfig {
    /// Parse `schedule` into a cron schedule.
    pub fn cron_schedule(&self) -> Result<cron::Schedule, ConfigError> {
        cron::Schedule::from_str(&self.schedule).map_err(|e| ConfigError::InvalidValue {
            key: "WARDEN_SWEEP_SCHEDULE".into(),
            message: e.to_string(),
        })
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            schedule: "0 0 * * * *".to_string(), // hourly
            concurrency: 4,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub trello: TrelloConfig,
    /// Slack incoming-webhook URL. `None` means notifications are only logged.
    pub slack_webhook_url: Option<SecretString>,
    pub db_path: PathBuf,
    pub port: u16,
    /// Public callback URL used when registering webhooks.
    pub public_url: Option<String>,
    pub sweep: SweepConfig,
    pub renotify: RenotifyPolicy,
    /// Directory for rolling log files, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
}

impl WardenConfig {
    /// Build configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let trello = TrelloConfig {
            api_base: optional("TRELLO_API_BASE")
                .unwrap_or_else(|| "https://api.trello.com/1".to_string()),
            api_key: SecretString::from(required("TRELLO_API_KEY")?),
            api_token: SecretString::from(required("TRELLO_API_TOKEN")?),
        };

        let port = match optional("WARDEN_PORT") {
            Some(raw) => parse_value("WARDEN_PORT", &raw)?,
            None => 8080,
        };

        let mut sweep = SweepConfig::default();
        if let Some(schedule) = optional("WARDEN_SWEEP_SCHEDULE") {
            sweep.schedule = schedule;
            sweep.cron_schedule()?;
        }
        if let Some(raw) = optional("WARDEN_SWEEP_CONCURRENCY") {
            let concurrency: usize = parse_value("WARDEN_SWEEP_CONCURRENCY", &raw)?;
            if concurrency == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "WARDEN_SWEEP_CONCURRENCY".into(),
                    message: "must be at least 1".into(),
                });
            }
            sweep.concurrency = concurrency;
        }

        let renotify = match optional("WARDEN_RENOTIFY") {
            Some(raw) => raw.parse()?,
            None => RenotifyPolicy::default(),
        };

        Ok(Self {
            trello,
            slack_webhook_url: optional("SLACK_WEBHOOK_URL").map(SecretString::from),
            db_path: optional("WARDEN_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/board-warden.db")),
            port,
            public_url: optional("WARDEN_PUBLIC_URL"),
            sweep,
            renotify,
            log_dir: optional("WARDEN_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
