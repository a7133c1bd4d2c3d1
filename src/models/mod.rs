//! Data models for the lending core

pub mod copy;
pub mod document;
pub mod history;
pub mod lending;
pub mod queue;
pub mod request;
pub mod user;

// Re-export commonly used types
pub use copy::{CopyStatus, DocumentCopy};
pub use document::Document;
pub use history::{HistoryEntry, NewHistoryEntry};
pub use lending::{
    CheckOutOutcome, CopyDisposition, Outcome, Rejection, RenewOutcome, RequestOutcome,
    ReturnOutcome,
};
pub use queue::QueueEntry;
pub use request::OutstandingRequest;
pub use user::{Group, User};
