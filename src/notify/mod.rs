//! Notification payloads and the sinks that deliver them
//!
//! The core only builds structured payloads plus a subject line. Rendering
//! and transport belong to the sink.

pub mod log;
pub mod memory;
pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Schedule, TargetId, VisitRecord};

pub use log::LogSink;
pub use memory::MemorySink;
pub use webhook::WebhookSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Single,
    Grouped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotificationPayload {
    /// One visit, sent as it happens
    Single {
        target: TargetId,
        title: String,
        schedule: Schedule,
        record: VisitRecord,
    },
    /// Digest of a batch, records in arrival order
    Grouped {
        target: TargetId,
        title: String,
        schedule: Schedule,
        records: Vec<VisitRecord>,
    },
}

impl NotificationPayload {
    pub fn template_kind(&self) -> TemplateKind {
        match self {
            NotificationPayload::Single { .. } => TemplateKind::Single,
            NotificationPayload::Grouped { .. } => TemplateKind::Grouped,
        }
    }

    pub fn target(&self) -> &TargetId {
        match self {
            NotificationPayload::Single { target, .. } => target,
            NotificationPayload::Grouped { target, .. } => target,
        }
    }

    pub fn visit_count(&self) -> usize {
        match self {
            NotificationPayload::Single { .. } => 1,
            NotificationPayload::Grouped { records, .. } => records.len(),
        }
    }

    pub fn subject(&self, site_name: &str) -> String {
        match self {
            NotificationPayload::Single { title, .. } => {
                format!("[{site_name}] New Visitor on {title}")
            }
            NotificationPayload::Grouped { title, .. } => {
                format!("[{site_name}] Visitor Report for {title}")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("notification rejected: {0}")]
    Rejected(String),
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// One-way delivery of notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        subject: &str,
        payload: &NotificationPayload,
        template: TemplateKind,
    ) -> Result<(), SinkError>;
}
