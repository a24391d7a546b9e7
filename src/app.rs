//! Application context
//!
//! Built once at start-up and shared (behind an `Arc`) by the HTTP handlers,
//! the scheduler and the admin CLI. Owns every component of the visit
//! pipeline; nothing is looked up globally.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SinkMode, StorageBackend};
use crate::migrate::check_versions;
use crate::models::{BulkAction, Frequency, TargetId, VisitContext};
use crate::notify::{LogSink, NotificationSink, WebhookSink};
use crate::settings::SettingsStore;
use crate::storage::{MemoryStore, MetadataStore, OptionStore, SqliteStore, StorageResult};
use crate::visits::{
    build_record, BatchAccumulator, Decision, DenyReason, DispatchOutcome, GeoIpService,
    GracePeriodTracker, NotificationDispatcher, TickReport, VisitGate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisitOutcome {
    /// The site-wide switch is off; nothing was evaluated
    NotificationsDisabled,
    Denied { reason: DenyReason },
    Recorded { dispatch: DispatchOutcome },
}

pub struct AppContext {
    settings: SettingsStore,
    gate: VisitGate,
    grace: Arc<GracePeriodTracker>,
    dispatcher: Arc<NotificationDispatcher>,
    geoip: Option<Arc<GeoIpService>>,
    clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(
        options: Arc<dyn OptionStore>,
        meta: Arc<dyn MetadataStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        site_name: impl Into<String>,
        geoip: Option<Arc<GeoIpService>>,
    ) -> Self {
        let settings = SettingsStore::new(Arc::clone(&options), Arc::clone(&meta));
        let grace = Arc::new(GracePeriodTracker::new(
            options,
            Arc::clone(&meta),
            Arc::clone(&clock),
        ));
        let batches = Arc::new(BatchAccumulator::new(meta));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            settings.clone(),
            batches,
            sink,
            site_name,
        ));

        Self {
            gate: VisitGate::new(settings.clone(), Arc::clone(&grace)),
            settings,
            grace,
            dispatcher,
            geoip,
            clock,
        }
    }

    /// Wire stores, sink and GeoIP database from configuration
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let (options, meta): (Arc<dyn OptionStore>, Arc<dyn MetadataStore>) =
            match config.storage.backend {
                StorageBackend::Sqlite => {
                    info!("Using SQLite storage: {}", config.storage.url);
                    let store =
                        SqliteStore::new(&config.storage.url, config.storage.max_connections)
                            .await?;
                    store.init().await?;
                    let store = Arc::new(store);
                    let options: Arc<dyn OptionStore> = store.clone();
                    let meta: Arc<dyn MetadataStore> = store;
                    (options, meta)
                }
                StorageBackend::Memory => {
                    info!("Using in-memory storage (data is lost on exit)");
                    let store = Arc::new(MemoryStore::new());
                    let options: Arc<dyn OptionStore> = store.clone();
                    let meta: Arc<dyn MetadataStore> = store;
                    (options, meta)
                }
            };

        check_versions(options.as_ref()).await?;

        let notifications = &config.notifications;
        let sink: Arc<dyn NotificationSink> = match notifications.sink {
            SinkMode::Log => Arc::new(LogSink::new(notifications.recipient.clone())),
            SinkMode::Webhook => {
                let url = notifications
                    .webhook_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("webhook sink needs a URL"))?;
                info!("Delivering notifications to webhook {}", url);
                Arc::new(WebhookSink::new(
                    url,
                    notifications.recipient.clone(),
                    Duration::from_secs(notifications.timeout_secs),
                )?)
            }
        };

        let geoip = match &config.geoip.city_db_path {
            Some(path) => {
                info!("Loading GeoIP City database from {}", path);
                Some(Arc::new(GeoIpService::new(path)?))
            }
            None => None,
        };

        Ok(Self::new(
            options,
            meta,
            sink,
            Arc::new(SystemClock),
            notifications.site_name.clone(),
            geoip,
        ))
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn batches(&self) -> &Arc<BatchAccumulator> {
        self.dispatcher.batches()
    }

    pub fn grace(&self) -> &Arc<GracePeriodTracker> {
        &self.grace
    }

    /// Run one page view through the gate and, if allowed, record it
    pub async fn record_visit(&self, ctx: &VisitContext) -> StorageResult<VisitOutcome> {
        let settings = self.settings.settings().await?;
        if !settings.enable_notifications {
            return Ok(VisitOutcome::NotificationsDisabled);
        }

        let decision = self.gate.decide(ctx).await?;
        let (Decision::Allow, Some(target)) = (decision, ctx.target) else {
            let reason = match decision {
                Decision::Deny(reason) => reason,
                Decision::Allow => DenyReason::TargetNotFound,
            };
            return Ok(VisitOutcome::Denied { reason });
        };

        // The gate already started the grace period for this visitor
        let record = build_record(ctx, self.clock.now(), self.geoip.as_deref());
        let dispatch = self.dispatcher.handle_visit(&target, record).await?;

        debug!(target_id = %target, dispatch = ?dispatch, "Visit recorded");
        Ok(VisitOutcome::Recorded { dispatch })
    }

    /// Scheduler entry point. Returns `None` while notifications are off.
    pub async fn run_tick(&self, frequency: Frequency) -> StorageResult<Option<TickReport>> {
        // Drop grace lock entries left behind by visits since the last tick
        self.grace.release_idle_locks();

        if !self.settings.settings().await?.enable_notifications {
            debug!(frequency = %frequency, "Notifications disabled, skipping tick");
            return Ok(None);
        }
        self.dispatcher.handle_tick(frequency).await.map(Some)
    }

    /// Apply a bulk action to each target; returns how many were updated
    pub async fn apply_bulk(&self, action: BulkAction, targets: &[TargetId]) -> StorageResult<usize> {
        for target in targets {
            let mut config = self.settings.target_config(target).await?;
            action.apply(&mut config);
            self.settings.save_target_config(target, &config).await?;
        }
        Ok(targets.len())
    }
}
