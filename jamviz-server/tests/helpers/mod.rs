//! Shared fixtures for jamviz-server integration tests

#![allow(dead_code)]

pub mod signals;

use jamviz_server::db::{init_memory_pool, HistoryStore};

/// History store over a fresh in-memory database
pub async fn memory_history(max_entries: usize) -> HistoryStore {
    let pool = init_memory_pool().await.expect("in-memory database");
    HistoryStore::new(pool, max_entries)
}
