//! Outbound account notifications.
//!
//! Delivery is fire-and-forget: [`NotificationDispatcher::dispatch`] spawns the
//! send and returns at once. A failed send is logged and dropped; it never
//! rolls back the registration or activation that triggered it.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

pub mod sender;
pub mod template;

pub use sender::{HttpMailRelay, LogNotificationSender};
pub use template::EmailTemplate;

pub const ACTIVATION_SUBJECT: &str = "Account activation";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("mail relay rejected message with status {0}")]
    Rejected(u16),
}

/// A rendered-on-send activation message.
#[derive(Clone, PartialEq, Eq)]
pub struct ActivationEmail {
    pub to: String,
    pub display_name: String,
    pub template: EmailTemplate,
    pub activation_url: String,
    pub code: String,
    pub subject: String,
}

impl ActivationEmail {
    pub fn activate_account(
        to: impl Into<String>,
        display_name: impl Into<String>,
        activation_url: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            display_name: display_name.into(),
            template: EmailTemplate::ActivateAccount,
            activation_url: activation_url.into(),
            code: code.into(),
            subject: ACTIVATION_SUBJECT.to_string(),
        }
    }

    pub fn render(&self) -> String {
        self.template
            .render(&self.display_name, &self.activation_url, &self.code)
    }
}

impl std::fmt::Debug for ActivationEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationEmail")
            .field("to", &self.to)
            .field("template", &self.template)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Mail transport contract.
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, email: &ActivationEmail) -> Result<(), NotificationError>;
}

#[async_trait::async_trait]
impl<S> NotificationSender for Arc<S>
where
    S: NotificationSender + ?Sized,
{
    async fn send(&self, email: &ActivationEmail) -> Result<(), NotificationError> {
        (**self).send(email).await
    }
}

/// Spawns sends on the tokio runtime.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// Queue `email` for delivery. The returned handle may be ignored.
    pub fn dispatch(&self, email: ActivationEmail) -> JoinHandle<()> {
        let sender = Arc::clone(&self.sender);
        tokio::spawn(async move {
            match sender.send(&email).await {
                Ok(()) => tracing::info!(to = %email.to, template = %email.template, "notification sent"),
                Err(e) => tracing::warn!(to = %email.to, error = %e, "notification delivery failed"),
            }
        })
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}
