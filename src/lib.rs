//! Library lending coordinator
//!
//! Coordinates check-outs, returns, renewals, waiting queues and outstanding
//! requests for the physical copies of a document collection, and exposes
//! them over a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
