//! Shared fixtures

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use library_lending::{
    config::LendingConfig,
    models::{CopyStatus, Document, DocumentCopy, Group, HistoryEntry, User},
    repository::{MemoryStore, Repository},
    services::{lending::LendingService, notifier::MemoryNotifier, Services},
};

pub const LIBRARIAN: &str = "marie";

pub const DELETED_GROUP: i32 = 1;
pub const READERS_GROUP: i32 = 2;

pub const ALICE: i32 = 10;
pub const BOB: i32 = 11;
pub const CAROL: i32 = 12;
pub const DAVE: i32 = 13;

/// Circulating document with a single copy
pub const NOVEL: i32 = 100;
pub const NOVEL_COPY: i32 = 1000;
/// Circulating document with two copies
pub const MANUAL: i32 = 101;
pub const MANUAL_COPIES: [i32; 2] = [1010, 1011];
/// Reference-only document
pub const DICTIONARY: i32 = 102;
/// Withdrawn document
pub const WITHDRAWN: i32 = 103;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

pub fn days_ago(days: i64) -> NaiveDate {
    today() - Duration::days(days)
}

pub struct Fixture {
    pub store: MemoryStore,
    pub notifier: MemoryNotifier,
    pub lending: LendingService,
}

pub fn fixture() -> Fixture {
    let store = seeded_store();
    let notifier = MemoryNotifier::new();
    let services = Services::new(
        Repository::in_memory(store.clone()),
        Arc::new(notifier.clone()),
        &LendingConfig::default(),
    );
    let lending = services.lending.with_clock(Arc::new(today));
    Fixture {
        store,
        notifier,
        lending,
    }
}

pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_group(Group {
        id: DELETED_GROUP,
        name: "Deleted".to_string(),
    });
    store.insert_group(Group {
        id: READERS_GROUP,
        name: "Readers".to_string(),
    });

    for (id, name) in [(ALICE, "Alice"), (BOB, "Bob"), (CAROL, "Carol"), (DAVE, "Dave")] {
        store.insert_user(User {
            id,
            name: name.to_string(),
            surname: "Reader".to_string(),
            email: format!("{}@example.org", name.to_lowercase()),
            group_id: Some(READERS_GROUP),
            fine: 0,
        });
    }

    for (id, title, active, keywords) in [
        (NOVEL, "Dune", true, vec![]),
        (MANUAL, "The Rust Programming Language", true, vec!["programming"]),
        (DICTIONARY, "Oxford English Dictionary", true, vec!["reference"]),
        (WITHDRAWN, "Old Almanac", false, vec![]),
    ] {
        store.insert_document(Document {
            id,
            title: title.to_string(),
            active,
            keywords: keywords.into_iter().map(String::from).collect(),
            requested: false,
        });
    }

    let copies = [
        (NOVEL_COPY, NOVEL),
        (MANUAL_COPIES[0], MANUAL),
        (MANUAL_COPIES[1], MANUAL),
        (1020, DICTIONARY),
        (1030, WITHDRAWN),
    ];
    for (id, document_id) in copies {
        store.insert_copy(DocumentCopy {
            id,
            document_id,
            active: true,
            checked_out: CopyStatus::Available,
        });
    }

    store
}

/// Record a loan directly in the ledger, bypassing every check
pub fn backdated_loan(store: &MemoryStore, id: i32, user_id: i32, copy_id: i32, days: i64) -> HistoryEntry {
    let entry = HistoryEntry {
        id,
        user_id,
        copy_id,
        librarian_co: LIBRARIAN.to_string(),
        date_check_out: days_ago(days),
        librarian_re: None,
        date_return: None,
        renewed: false,
    };
    store.insert_history(entry.clone());
    store.set_copy_status(copy_id, CopyStatus::CheckedOut);
    entry
}
