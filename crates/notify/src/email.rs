//! Email transport seam. The dispatcher renders messages; delivery is
//! behind a trait so deployments can wire in SMTP, a relay API, or
//! nothing at all.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("email delivery failed: {0}")]
pub struct EmailError(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Default transport: logs the message instead of sending it. Useful for
/// development and for deployments that only want the webhook channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOnlyEmailTransport;

#[async_trait]
impl EmailTransport for LogOnlyEmailTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email transport disabled, message logged only"
        );
        Ok(())
    }
}

/// Transport fake that records every message handed to it.
#[derive(Clone, Default)]
pub struct RecordingEmailTransport {
    delivered: Arc<Mutex<Vec<EmailMessage>>>,
}

impl RecordingEmailTransport {
    pub fn delivered(&self) -> Vec<EmailMessage> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EmailTransport for RecordingEmailTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), EmailError> {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}
