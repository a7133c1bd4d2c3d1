//! Business logic services

pub mod email;
pub mod fines;
pub mod lending;
pub mod locks;
pub mod notifier;

use std::sync::Arc;

use crate::{
    config::{EmailConfig, LendingConfig},
    repository::Repository,
};

use notifier::{LogNotifier, Notifier};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub lending: lending::LendingService,
}

impl Services {
    /// Create all services with the given repository and notifier
    pub fn new(
        repository: Repository,
        notifier: Arc<dyn Notifier>,
        lending_config: &LendingConfig,
    ) -> Self {
        Self {
            lending: lending::LendingService::new(repository, notifier, lending_config),
        }
    }

    /// Pick the notifier matching the email configuration
    pub fn notifier_for(email_config: &EmailConfig) -> Arc<dyn Notifier> {
        if email_config.enabled {
            Arc::new(email::EmailNotifier::new(email_config.clone()))
        } else {
            Arc::new(LogNotifier)
        }
    }
}
