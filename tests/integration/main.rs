//! Integration tests for the lending server
//!
//! Everything runs against the in-memory store with a fixed clock.

mod api_router;
mod common;
mod store_failures;
