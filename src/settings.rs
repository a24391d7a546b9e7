//! Typed view over the option and metadata stores
//!
//! Stored values may come from hosts that write checkbox strings (`"on"`,
//! `""`, `"1"`) instead of JSON booleans. All coercion happens here; the rest
//! of the crate only sees `Settings` and `TargetConfig`.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::models::{
    Frequency, GraceContext, LoggedInOverride, Schedule, Settings, TargetConfig, TargetId,
};
use crate::storage::{MetadataStore, OptionStore, StorageResult};

pub const OPTION_PREFIX: &str = "vn_";

pub const META_ENABLED: &str = "vn_enable_notifications";
pub const META_SCHEDULE: &str = "vn_schedule";
pub const META_LOGGED_IN: &str = "vn_logged_in";
pub const META_TITLE: &str = "vn_title";

#[derive(Clone)]
pub struct SettingsStore {
    options: Arc<dyn OptionStore>,
    meta: Arc<dyn MetadataStore>,
}

impl SettingsStore {
    pub fn new(options: Arc<dyn OptionStore>, meta: Arc<dyn MetadataStore>) -> Self {
        Self { options, meta }
    }

    /// Load global settings, filling gaps with defaults
    pub async fn settings(&self) -> StorageResult<Settings> {
        let defaults = Settings::default();

        let enable_notifications = self
            .bool_option("enable_notifications", defaults.enable_notifications)
            .await?;
        let enable_logged_in_users = self
            .bool_option("enable_logged_in_users", defaults.enable_logged_in_users)
            .await?;
        let disable_crawlers = self
            .bool_option("disable_crawlers", defaults.disable_crawlers)
            .await?;
        let ip_grace_period = self
            .bool_option("ip_grace_period", defaults.ip_grace_period)
            .await?;

        let ip_grace_period_context = match self.option("ip_grace_period_context").await? {
            None => defaults.ip_grace_period_context,
            // Explicitly switched off
            Some(Value::Null) => None,
            Some(value) => {
                let parsed = value.as_str().and_then(GraceContext::parse);
                if parsed.is_none() {
                    warn!(value = %value, "Unknown ip_grace_period_context, grace period disabled");
                }
                parsed
            }
        };

        let ip_grace_period_duration = self
            .option("ip_grace_period_duration")
            .await?
            .and_then(|value| coerce_u64(&value))
            .unwrap_or(defaults.ip_grace_period_duration);

        Ok(Settings {
            enable_notifications,
            enable_logged_in_users,
            disable_crawlers,
            ip_grace_period,
            ip_grace_period_context,
            ip_grace_period_duration,
        })
    }

    pub async fn save_settings(&self, settings: &Settings) -> StorageResult<()> {
        self.set_option("enable_notifications", json!(settings.enable_notifications))
            .await?;
        self.set_option("enable_logged_in_users", json!(settings.enable_logged_in_users))
            .await?;
        self.set_option("disable_crawlers", json!(settings.disable_crawlers))
            .await?;
        self.set_option("ip_grace_period", json!(settings.ip_grace_period))
            .await?;
        let context = settings
            .ip_grace_period_context
            .map_or(Value::Null, |context| json!(context.as_str()));
        self.set_option("ip_grace_period_context", context).await?;
        self.set_option(
            "ip_grace_period_duration",
            json!(settings.ip_grace_period_duration),
        )
        .await
    }

    /// Per-target configuration; unknown enum values fall back to defaults
    pub async fn target_config(&self, target: &TargetId) -> StorageResult<TargetConfig> {
        let enabled = self
            .meta
            .get_meta(target, META_ENABLED)
            .await?
            .map(|value| coerce_bool(&value))
            .unwrap_or(false);

        let schedule = match self.meta.get_meta(target, META_SCHEDULE).await? {
            Some(value) => value.as_str().and_then(Schedule::parse).unwrap_or_else(|| {
                warn!(target_id = %target, value = %value, "Unknown schedule, using default");
                Schedule::default()
            }),
            None => Schedule::default(),
        };

        let logged_in = self
            .meta
            .get_meta(target, META_LOGGED_IN)
            .await?
            .and_then(|value| value.as_str().and_then(LoggedInOverride::parse))
            .unwrap_or_default();

        let title = self
            .meta
            .get_meta(target, META_TITLE)
            .await?
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|title| !title.is_empty());

        Ok(TargetConfig {
            enabled,
            schedule,
            logged_in,
            title,
        })
    }

    pub async fn save_target_config(
        &self,
        target: &TargetId,
        config: &TargetConfig,
    ) -> StorageResult<()> {
        self.meta
            .set_meta(target, META_ENABLED, json!(config.enabled))
            .await?;
        self.meta
            .set_meta(target, META_SCHEDULE, json!(config.schedule.as_str()))
            .await?;
        self.meta
            .set_meta(target, META_LOGGED_IN, json!(config.logged_in.as_str()))
            .await?;
        if let Some(title) = &config.title {
            self.meta.set_meta(target, META_TITLE, json!(title)).await?;
        }
        Ok(())
    }

    /// Enabled targets whose schedule batches at `frequency`
    pub async fn targets_on(&self, frequency: Frequency) -> StorageResult<Vec<TargetId>> {
        let candidates = self
            .meta
            .targets_with_meta(META_SCHEDULE, &json!(frequency.schedule().as_str()))
            .await?;

        let mut targets = Vec::with_capacity(candidates.len());
        for target in candidates {
            let enabled = self
                .meta
                .get_meta(&target, META_ENABLED)
                .await?
                .map(|value| coerce_bool(&value))
                .unwrap_or(false);
            if enabled {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    async fn option(&self, name: &str) -> StorageResult<Option<Value>> {
        self.options
            .get_option(&format!("{OPTION_PREFIX}{name}"))
            .await
    }

    async fn set_option(&self, name: &str, value: Value) -> StorageResult<()> {
        self.options
            .set_option(&format!("{OPTION_PREFIX}{name}"), value)
            .await
    }

    async fn bool_option(&self, name: &str, default: bool) -> StorageResult<bool> {
        Ok(self
            .option(name)
            .await?
            .map(|value| coerce_bool(&value))
            .unwrap_or(default))
    }
}

/// Checkbox semantics: `true`, `"on"`, `"1"`, `"yes"`, `"true"` and non-zero
/// numbers are on; everything else is off.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "on" | "1" | "yes" | "true"
        ),
        _ => false,
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
