use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{NotificationPayload, NotificationSink, SinkError, TemplateKind};

/// POSTs each notification as JSON to a configured URL
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    recipient: String,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    recipient: &'a str,
    subject: &'a str,
    template: TemplateKind,
    payload: &'a NotificationPayload,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, recipient: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            recipient: recipient.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(
        &self,
        subject: &str,
        payload: &NotificationPayload,
        template: TemplateKind,
    ) -> Result<(), SinkError> {
        let body = WebhookBody {
            recipient: &self.recipient,
            subject,
            template,
            payload,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected(format!("webhook returned {status}")));
        }

        debug!(url = %self.url, subject, "Notification delivered");
        Ok(())
    }
}
