use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{NotificationPayload, NotificationSink, SinkError, TemplateKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub subject: String,
    pub payload: NotificationPayload,
    pub template: TemplateKind,
}

/// Keeps every notification in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn send(
        &self,
        subject: &str,
        payload: &NotificationPayload,
        template: TemplateKind,
    ) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("memory sink set to fail".to_string()));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| SinkError::Transport("memory sink poisoned".to_string()))?;
        sent.push(SentNotification {
            subject: subject.to_string(),
            payload: payload.clone(),
            template,
        });
        Ok(())
    }
}
