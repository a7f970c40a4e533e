use std::time::Duration;

use serde::Serialize;

use super::{ActivationEmail, NotificationError, NotificationSender};

/// Dev transport: logs the message instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSender;

#[async_trait::async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, email: &ActivationEmail) -> Result<(), NotificationError> {
        let body = email.render();
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            template = %email.template,
            body_len = body.len(),
            "activation email (log transport)"
        );
        tracing::debug!(to = %email.to, code = %email.code, "activation code (log transport)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    template: &'a str,
    html: String,
}

/// POSTs rendered messages as JSON to an HTTP mail relay.
#[derive(Debug, Clone)]
pub struct HttpMailRelay {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl HttpMailRelay {
    pub fn new(endpoint: impl Into<String>, from: impl Into<String>) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            from: from.into(),
        })
    }
}

#[async_trait::async_trait]
impl NotificationSender for HttpMailRelay {
    async fn send(&self, email: &ActivationEmail) -> Result<(), NotificationError> {
        let message = RelayMessage {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            template: email.template.name(),
            html: email.render(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
