// Outbound notifications
// Delivery is fire-and-forget: callers log failures and carry on.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use crate::workflows::WorkflowRecord;

pub mod templates;

pub use templates::{render, TemplateCatalog, RECLASS_EXPIRED_TEMPLATE, REPURCHASE_TEMPLATE};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("No recipient configured for {0}")]
    MissingRecipient(String),

    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// A rendered notification ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub sender: Option<String>,
    pub template: String,
    pub subject: String,
    pub body: String,
    pub request_number: String,
    pub loan_number: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        record: &WorkflowRecord,
    ) -> Result<(), NotificationError>;
}

/// Shared rendering used by the concrete channels
#[derive(Debug, Clone, Default)]
pub struct NotificationRenderer {
    catalog: TemplateCatalog,
    sender: Option<String>,
    // logical recipient selector -> address
    recipients: HashMap<String, String>,
}

impl NotificationRenderer {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self {
            catalog,
            sender: None,
            recipients: HashMap::new(),
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_recipient(mut self, selector: impl Into<String>, address: impl Into<String>) -> Self {
        self.recipients.insert(selector.into(), address.into());
        self
    }

    /// Selectors without a mapping are used as literal addresses.
    pub fn render(
        &self,
        recipient: &str,
        template: &str,
        record: &WorkflowRecord,
    ) -> Result<Notification, NotificationError> {
        let address = self
            .recipients
            .get(recipient)
            .map(String::as_str)
            .unwrap_or(recipient);
        if address.trim().is_empty() {
            return Err(NotificationError::MissingRecipient(template.to_string()));
        }

        Ok(Notification {
            recipient: address.to_string(),
            sender: self.sender.clone(),
            template: template.to_string(),
            subject: self.catalog.subject(template, record),
            body: render(&self.catalog.body(template), record),
            request_number: record.request_number.clone(),
            loan_number: record.loan_number.clone(),
        })
    }
}

/// Writes notifications to the structured log; used when no mail transport is wired
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationChannel {
    renderer: NotificationRenderer,
}

impl TracingNotificationChannel {
    pub fn new(renderer: NotificationRenderer) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl NotificationChannel for TracingNotificationChannel {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        record: &WorkflowRecord,
    ) -> Result<(), NotificationError> {
        let notification = self.renderer.render(recipient, template, record)?;
        info!(
            recipient = %notification.recipient,
            template = %notification.template,
            subject = %notification.subject,
            request_number = %notification.request_number,
            loan_number = %notification.loan_number,
            body = %notification.body,
            "Notification sent"
        );
        Ok(())
    }
}

/// Hands rendered notifications to an in-process queue consumer
#[derive(Debug, Clone)]
pub struct QueueNotificationChannel {
    renderer: NotificationRenderer,
    queue: mpsc::Sender<Notification>,
}

impl QueueNotificationChannel {
    pub fn new(renderer: NotificationRenderer, capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (Self { renderer, queue }, rx)
    }
}

#[async_trait]
impl NotificationChannel for QueueNotificationChannel {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        record: &WorkflowRecord,
    ) -> Result<(), NotificationError> {
        let notification = self.renderer.render(recipient, template, record)?;
        self.queue
            .try_send(notification)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Closed(_) => NotificationError::ChannelClosed,
                mpsc::error::TrySendError::Full(_) => {
                    NotificationError::DeliveryFailed("notification queue is full".to_string())
                }
            })
    }
}
