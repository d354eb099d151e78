use crate::{Record, RecordStore, StoreError, validate_collection};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Keeps records in process memory. Used for development and tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: Mutex<HashMap<String, Vec<Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records stored so far in `collection`, oldest first.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.collections.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        validate_collection(collection)?;
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}
