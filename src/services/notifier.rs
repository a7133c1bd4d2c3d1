//! Notification seam used by the lending core

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::AppResult;

/// Delivers a message to a user. Best effort: the lending core logs failures
/// and carries on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Writes notifications to the log only (email disabled)
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> AppResult<()> {
        tracing::info!(to = address, subject, "Notification (not delivered): {}", body);
        Ok(())
    }
}

/// A message captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every message in memory
#[derive(Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentMessage {
                address: address.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

/// Message telling a queued user that a copy waits for them
pub fn document_ready(full_name: &str, title: &str) -> (String, String) {
    (
        "Document is ready".to_string(),
        format!(
            "Dear {},\nQueued document \"{}\" for you is ready.\n",
            full_name, title
        ),
    )
}
