use async_trait::async_trait;
use recordstore::{Record, RecordStore, StoreError};

/// A store whose every write is rejected.
pub struct FailingRecordStore;

#[async_trait]
impl RecordStore for FailingRecordStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn put(&self, _collection: &str, _record: &Record) -> Result<(), StoreError> {
        Err(StoreError::Rejected {
            status: 503,
            kind: "ServiceUnavailable".into(),
            message: "simulated outage".into(),
        })
    }
}
