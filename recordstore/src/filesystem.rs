use crate::{Record, RecordStore, StoreError, validate_collection};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends records as JSON lines to `<base_dir>/<collection>.jsonl`.
pub struct FilesystemRecordStore {
    base_dir: PathBuf,
    // Serializes appends so concurrent lines never interleave.
    write_lock: Mutex<()>,
}

impl FilesystemRecordStore {
    pub fn new(base_dir: &str) -> Self {
        FilesystemRecordStore {
            base_dir: Path::new(base_dir).to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, collection: &str) -> PathBuf {
        self.base_dir.join(format!("{collection}.jsonl"))
    }

    /// Reads back every record of `collection`. A missing file is an empty collection.
    #[cfg(test)]
    pub(crate) async fn load(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        validate_collection(collection)?;
        let contents = match fs::read_to_string(self.path(collection)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl RecordStore for FilesystemRecordStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn put(&self, collection: &str, record: &Record) -> Result<(), StoreError> {
        validate_collection(collection)?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.base_dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(collection))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}
