use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::visits::SchedulerIntervals;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub api_server: ServerConfig,
    pub notifications: NotificationConfig,
    pub geoip: GeoIpConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub site_name: String,
    /// Address notifications are meant for (the site admin)
    pub recipient: String,
    pub sink: SinkMode,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "NotificationConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Path to a MaxMind City .mmdb file; locations are skipped when unset
    pub city_db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub hourly_interval_secs: u64,
    pub daily_interval_secs: u64,
}

impl NotificationConfig {
    const fn default_timeout_secs() -> u64 {
        5
    }
}

impl SchedulerConfig {
    pub fn intervals(&self) -> SchedulerIntervals {
        SchedulerIntervals {
            hourly: Duration::from_secs(self.hourly_interval_secs.max(1)),
            daily: Duration::from_secs(self.daily_interval_secs.max(1)),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a non-negative integer, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => StorageBackend::Sqlite,
            "memory" => StorageBackend::Memory,
            other => {
                tracing::warn!(
                    "Unknown STORAGE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, memory"
                );
                StorageBackend::Sqlite
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./visit-notify.db".to_string());
        let max_connections = u32::try_from(env_u64("DATABASE_MAX_CONNECTIONS", 5)?)
            .context("DATABASE_MAX_CONNECTIONS is too large")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let sink = match std::env::var("NOTIFY_SINK")
            .unwrap_or_else(|_| "log".to_string())
            .to_lowercase()
            .as_str()
        {
            "log" => SinkMode::Log,
            "webhook" => SinkMode::Webhook,
            other => {
                tracing::warn!(
                    "Unknown NOTIFY_SINK '{other}', falling back to 'log'. Supported values: log, webhook"
                );
                SinkMode::Log
            }
        };

        let webhook_url = if sink == SinkMode::Webhook {
            Some(
                std::env::var("NOTIFY_WEBHOOK_URL")
                    .context("NOTIFY_WEBHOOK_URL must be set when NOTIFY_SINK=webhook")?,
            )
        } else {
            None
        };

        let notifications = NotificationConfig {
            site_name: std::env::var("SITE_NAME").unwrap_or_else(|_| "My Site".to_string()),
            recipient: std::env::var("NOTIFY_RECIPIENT")
                .unwrap_or_else(|_| "admin@localhost".to_string()),
            sink,
            webhook_url,
            timeout_secs: env_u64(
                "NOTIFY_TIMEOUT_SECS",
                NotificationConfig::default_timeout_secs(),
            )?,
        };

        let scheduler = SchedulerConfig {
            enabled: env_flag("SCHEDULER_ENABLED", true),
            hourly_interval_secs: env_u64("SCHEDULER_HOURLY_SECS", 3600)?,
            daily_interval_secs: env_u64("SCHEDULER_DAILY_SECS", 86_400)?,
        };

        Ok(Config {
            storage: StorageConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            notifications,
            geoip: GeoIpConfig {
                city_db_path: std::env::var("GEOIP_CITY_DB").ok().filter(|p| !p.is_empty()),
            },
            scheduler,
        })
    }
}
