//! Persistence of form submissions.
//!
//! A [`RecordStore`] writes one [`Record`] into a named collection. The backend
//! is chosen from configuration with [`get_store`].

pub mod config;
mod credentials;
pub mod dynamodb;
pub mod filesystem;
pub mod id;
pub mod memory;
mod sigv4;

use async_trait::async_trait;
use config::RecordStoreType;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One stored item: field name to value, in insertion order.
pub type Record = IndexMap<String, String>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("datastore rejected the write ({status}): {kind}: {message}")]
    Rejected {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("write did not complete within {0:?}")]
    Timeout(Duration),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("missing datastore credentials")]
    MissingCredentials,

    #[error("could not obtain datastore credentials from {0}")]
    CredentialsUnavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &'static str;

    /// Persists one record under `collection`. No retries are attempted.
    async fn put(&self, collection: &str, record: &Record) -> Result<(), StoreError>;
}

pub fn get_store(store_type: &RecordStoreType) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match store_type {
        RecordStoreType::Dynamodb(config) => Arc::new(dynamodb::DynamoDbRecordStore::new(config)?),
        RecordStoreType::Filesystem { base_dir } => {
            Arc::new(filesystem::FilesystemRecordStore::new(base_dir))
        }
        RecordStoreType::Memory => {
            tracing::warn!("Using the in-memory record store. Submissions are lost on restart.");
            Arc::new(memory::MemoryRecordStore::new())
        }
    };

    tracing::info!(backend = store.name(), "Record store ready");
    Ok(store)
}

/// Writes `record` with an upper bound on how long the write may take, and
/// logs the outcome. The caller decides what a failure means for the client.
pub async fn store_record(
    store: &dyn RecordStore,
    collection: &str,
    record: &Record,
    timeout: Duration,
) -> Result<(), StoreError> {
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, store.put(collection, record)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    };

    match &result {
        Ok(()) => tracing::info!(
            collection,
            backend = store.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Record inserted"
        ),
        Err(e) => tracing::error!(
            collection,
            backend = store.name(),
            error = %e,
            "Error inserting record"
        ),
    }

    result
}

/// Collection names become table names and file names.
pub(crate) fn validate_collection(collection: &str) -> Result<(), StoreError> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !collection.starts_with('.');

    match valid {
        true => Ok(()),
        false => Err(StoreError::InvalidCollection(collection.to_string())),
    }
}
