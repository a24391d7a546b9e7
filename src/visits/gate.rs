//! Visit gate: decides whether a page view counts as a notifiable visit
//!
//! Checks run in a fixed order and stop at the first denial:
//!
//! 1. admin context
//! 2. page kind (only singular and archive pages count)
//! 3. target resolution
//! 4. per-target enabled flag
//! 5. crawler user agents (when `disable_crawlers` is set)
//! 6. logged-in users (per-target override, else the global setting)
//! 7. IP grace period (when enabled and the IP is usable). An admitted
//!    visitor starts a new period.
//!
//! Cheap request-local checks come first, store lookups last.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{PageKind, VisitContext};
use crate::settings::SettingsStore;
use crate::storage::StorageResult;
use crate::visits::anonymize::{anonymize, grace_key};
use crate::visits::grace::{GracePeriodTracker, GraceScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    AdminContext,
    UnsupportedPage,
    TargetNotFound,
    TargetDisabled,
    Crawler,
    LoggedInUser,
    GracePeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub struct VisitGate {
    settings: SettingsStore,
    grace: Arc<GracePeriodTracker>,
}

impl VisitGate {
    pub fn new(settings: SettingsStore, grace: Arc<GracePeriodTracker>) -> Self {
        Self { settings, grace }
    }

    pub async fn decide(&self, ctx: &VisitContext) -> StorageResult<Decision> {
        let decision = self.evaluate(ctx).await?;
        if let Decision::Deny(reason) = decision {
            debug!(target_id = ?ctx.target, reason = ?reason, "Visit denied");
        }
        Ok(decision)
    }

    async fn evaluate(&self, ctx: &VisitContext) -> StorageResult<Decision> {
        if ctx.is_admin_context {
            return Ok(Decision::Deny(DenyReason::AdminContext));
        }

        if ctx.page_kind == PageKind::Other {
            return Ok(Decision::Deny(DenyReason::UnsupportedPage));
        }

        let Some(target) = ctx.target else {
            info!(page_kind = ?ctx.page_kind, "Could not resolve visited object");
            return Ok(Decision::Deny(DenyReason::TargetNotFound));
        };

        let config = self.settings.target_config(&target).await?;
        if !config.enabled {
            return Ok(Decision::Deny(DenyReason::TargetDisabled));
        }

        let settings = self.settings.settings().await?;

        if settings.disable_crawlers && is_crawler(ctx.user_agent.as_deref()) {
            return Ok(Decision::Deny(DenyReason::Crawler));
        }

        let send_if_logged_in = config.logged_in.resolve(settings.enable_logged_in_users);
        if ctx.is_logged_in && !send_if_logged_in {
            return Ok(Decision::Deny(DenyReason::LoggedInUser));
        }

        if settings.ip_grace_period {
            // A missing or malformed IP skips the check rather than denying
            let anonymized = ctx.raw_ip.as_deref().and_then(anonymize);
            let scope = GraceScope::resolve(settings.ip_grace_period_context, &target);

            // An admitted visitor starts its grace period here, under the same
            // lock as the check
            if let (Some(anonymized), Some(scope)) = (anonymized, scope) {
                let admitted = self
                    .grace
                    .check_and_record(
                        scope,
                        &grace_key(&anonymized),
                        settings.ip_grace_period_duration,
                    )
                    .await?;
                if !admitted {
                    return Ok(Decision::Deny(DenyReason::GracePeriod));
                }
            }
        }

        Ok(Decision::Allow)
    }
}

fn is_crawler(user_agent: Option<&str>) -> bool {
    user_agent
        .map(|ua| ua.to_lowercase().contains("bot"))
        .unwrap_or(false)
}
