//! Routes allowed visits to immediate notifications or batches, and turns
//! batches into digests on scheduler ticks.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{Frequency, Schedule, TargetConfig, TargetId, VisitRecord};
use crate::notify::{NotificationPayload, NotificationSink};
use crate::settings::SettingsStore;
use crate::storage::{KeyLocks, StorageResult};
use crate::visits::batch::BatchAccumulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Single-visit notification delivered
    Sent,
    /// Added to the batch, `pending` records now waiting
    Batched { pending: usize },
    /// Immediate delivery failed; the visit is not retried
    SendFailed,
}

/// Summary of one scheduler tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub frequency: Frequency,
    pub notified: usize,
    pub skipped_empty: usize,
    pub skipped_busy: usize,
    pub failed: usize,
}

impl TickReport {
    fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            notified: 0,
            skipped_empty: 0,
            skipped_busy: 0,
            failed: 0,
        }
    }
}

pub struct NotificationDispatcher {
    settings: SettingsStore,
    batches: Arc<BatchAccumulator>,
    sink: Arc<dyn NotificationSink>,
    site_name: String,
    /// Held while a target's digest is being sent so overlapping ticks
    /// cannot emit the same batch twice
    tick_guards: KeyLocks,
}

impl NotificationDispatcher {
    pub fn new(
        settings: SettingsStore,
        batches: Arc<BatchAccumulator>,
        sink: Arc<dyn NotificationSink>,
        site_name: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            batches,
            sink,
            site_name: site_name.into(),
            tick_guards: KeyLocks::new(),
        }
    }

    pub fn batches(&self) -> &Arc<BatchAccumulator> {
        &self.batches
    }

    /// Deliver or batch one allowed visit according to the target's schedule
    pub async fn handle_visit(
        &self,
        target: &TargetId,
        record: VisitRecord,
    ) -> StorageResult<DispatchOutcome> {
        let config = self.settings.target_config(target).await?;

        if config.schedule == Schedule::OnVisit {
            let payload = NotificationPayload::Single {
                target: *target,
                title: title_for(target, &config),
                schedule: config.schedule,
                record,
            };
            return Ok(if self.emit(&payload).await {
                DispatchOutcome::Sent
            } else {
                DispatchOutcome::SendFailed
            });
        }

        let pending = self.batches.append(target, record).await?;
        debug!(target_id = %target, pending, schedule = config.schedule.as_str(), "Visit batched");
        Ok(DispatchOutcome::Batched { pending })
    }

    /// Send digests for every enabled target batching at `frequency`.
    ///
    /// Empty batches are skipped. A batch is only cleared after its digest
    /// was delivered; on failure it stays for the next tick.
    pub async fn handle_tick(&self, frequency: Frequency) -> StorageResult<TickReport> {
        let targets = self.settings.targets_on(frequency).await?;
        let mut report = TickReport::new(frequency);

        for target in targets {
            let Some(_guard) = self.tick_guards.try_lock(&target.storage_key()) else {
                debug!(target_id = %target, "Digest already in progress, skipping");
                report.skipped_busy += 1;
                continue;
            };

            match self.send_digest(&target).await {
                Ok(DigestResult::Empty) => report.skipped_empty += 1,
                Ok(DigestResult::Sent) => report.notified += 1,
                Ok(DigestResult::Failed) => report.failed += 1,
                Err(err) => {
                    error!(target_id = %target, error = %err, "Failed to read visitor batch");
                    report.failed += 1;
                }
            }
        }

        self.tick_guards.release_idle();
        self.batches.release_idle_locks();

        info!(
            frequency = %frequency,
            notified = report.notified,
            skipped_empty = report.skipped_empty,
            failed = report.failed,
            "Scheduled notifications processed"
        );
        Ok(report)
    }

    async fn send_digest(&self, target: &TargetId) -> StorageResult<DigestResult> {
        let records = self.batches.snapshot(target).await?;
        if records.is_empty() {
            return Ok(DigestResult::Empty);
        }

        let config = self.settings.target_config(target).await?;
        let payload = NotificationPayload::Grouped {
            target: *target,
            title: title_for(target, &config),
            schedule: config.schedule,
            records: records.clone(),
        };

        if !self.emit(&payload).await {
            return Ok(DigestResult::Failed);
        }

        if let Err(err) = self.batches.acknowledge(target, &records).await {
            // Delivered but not cleared: the next tick sends these again
            error!(target_id = %target, error = %err, "Failed to clear delivered visitor batch");
        }
        Ok(DigestResult::Sent)
    }

    async fn emit(&self, payload: &NotificationPayload) -> bool {
        let subject = payload.subject(&self.site_name);
        match self.sink.send(&subject, payload, payload.template_kind()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target_id = %payload.target(),
                    visits = payload.visit_count(),
                    error = %err,
                    "Notification delivery failed"
                );
                false
            }
        }
    }
}

enum DigestResult {
    Empty,
    Sent,
    Failed,
}

fn title_for(target: &TargetId, config: &TargetConfig) -> String {
    config
        .title
        .clone()
        .unwrap_or_else(|| target.to_string())
}
