use async_trait::async_trait;
use tracing::info;

use super::{NotificationPayload, NotificationSink, SinkError, TemplateKind};

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogSink {
    recipient: String,
}

impl LogSink {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(
        &self,
        subject: &str,
        payload: &NotificationPayload,
        template: TemplateKind,
    ) -> Result<(), SinkError> {
        let body = serde_json::to_string(payload).map_err(|e| SinkError::Rejected(e.to_string()))?;
        info!(
            recipient = %self.recipient,
            template = ?template,
            visits = payload.visit_count(),
            "📧 {subject}: {body}"
        );
        Ok(())
    }
}
