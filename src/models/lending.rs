//! Outcomes of lending operations.
//!
//! Every operation answers with an outcome value; a policy refusal is the
//! `Rejected` variant, not an error.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{history::HistoryEntry, queue::QueueEntry, request::OutstandingRequest};

/// Why a lending operation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    UserDeleted,
    DocumentInactive,
    NonCirculating,
    DuplicateLoan,
    AlreadyQueued,
    AlreadyReturned,
    NotCheckedOut,
    Overdue,
    Requested,
    AlreadyRenewed,
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::UserDeleted => "user deleted",
            Rejection::DocumentInactive => "document inactive",
            Rejection::NonCirculating => "non-circulating",
            Rejection::DuplicateLoan => "duplicate loan",
            Rejection::AlreadyQueued => "already queued",
            Rejection::AlreadyReturned => "already returned",
            Rejection::NotCheckedOut => "not checked out",
            Rejection::Overdue => "overdue, cannot renew",
            Rejection::Requested => "requested, cannot renew",
            Rejection::AlreadyRenewed => "already renewed",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Common view over operation outcomes
pub trait Outcome {
    fn rejection(&self) -> Option<Rejection>;

    fn is_rejected(&self) -> bool {
        self.rejection().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutOutcome {
    /// A loan was opened; `via_reservation` when a held copy was consumed
    CheckedOut {
        entry: HistoryEntry,
        via_reservation: bool,
    },
    /// No copy available, the user now waits in the queue
    Queued { entry: QueueEntry },
    Rejected { reason: Rejection },
}

impl Outcome for CheckOutOutcome {
    fn rejection(&self) -> Option<Rejection> {
        match self {
            CheckOutOutcome::Rejected { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// Where a freed copy went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum CopyDisposition {
    /// Checked out to the user of the active outstanding request
    FulfilledRequest { request_id: i32, entry: HistoryEntry },
    /// Held for the next queued user, who was notified
    AssignedToQueue { entry: QueueEntry },
    /// Nobody waits, the copy is simply available
    NoClaimants { copy_id: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReturnOutcome {
    Returned {
        entry: HistoryEntry,
        /// Fine added to the user for this loan
        fine: i64,
        copy: CopyDisposition,
    },
    Rejected { reason: Rejection },
}

impl Outcome for ReturnOutcome {
    fn rejection(&self) -> Option<Rejection> {
        match self {
            ReturnOutcome::Rejected { reason } => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenewOutcome {
    /// `closed` is the superseded loan, `entry` the new one
    Renewed {
        closed: HistoryEntry,
        entry: HistoryEntry,
    },
    Rejected { reason: Rejection },
}

impl Outcome for RenewOutcome {
    fn rejection(&self) -> Option<Rejection> {
        match self {
            RenewOutcome::Rejected { reason } => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// A copy is free right now; no request was stored
    CopyAlreadyFree { copy_id: i32 },
    /// Flushing the queue released a held copy, which went to the user
    CheckedOutAfterFlush { entry: HistoryEntry, flushed: usize },
    RequestPlaced {
        request: OutstandingRequest,
        flushed: usize,
    },
    Rejected { reason: Rejection },
}

impl Outcome for RequestOutcome {
    fn rejection(&self) -> Option<Rejection> {
        match self {
            RequestOutcome::Rejected { reason } => Some(*reason),
            _ => None,
        }
    }
}
