// Copyright (c) 2026 Forge Labs
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/forge-labs/forge-core

//! Durable job records.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Durable job record keyed by job id. Upserted after every state
/// transition; `get` returns whatever snapshot was last written.
pub trait PersistentStore: Send + Sync {
    fn upsert(&self, job_id: &str, snapshot: Value);
    fn get(&self, job_id: &str) -> Option<Value>;
}

/// In-process store backed by a locked map. The default backend; swap in
/// a database-backed implementation for deployments that must survive a
/// restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentStore for MemoryStore {
    fn upsert(&self, job_id: &str, snapshot: Value) {
        let mut records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.insert(job_id.to_owned(), snapshot);
    }

    fn get(&self, job_id: &str) -> Option<Value> {
        let records = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.get(job_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_then_get() {
        let store = MemoryStore::new();
        store.upsert("a", json!({"status": "queued"}));
        store.upsert("a", json!({"status": "processing"}));
        assert_eq!(store.get("a").unwrap()["status"], "processing");
        assert!(store.get("b").is_none());
    }
}
