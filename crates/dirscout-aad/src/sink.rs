//! Destinations for enumerated records.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{AadError, AadResult, DirectoryRecord};

/// Receives records per object type.
///
/// Implementations must accept concurrent calls for different types and
/// serialize writes within one type.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, type_name: &str, record: &DirectoryRecord) -> AadResult<()>;

    /// Flushes buffered output. The default does nothing.
    async fn flush(&self) -> AadResult<()> {
        Ok(())
    }
}

/// Writes one JSON document per line to `<dir>/<TypeName>.jsonl`.
#[derive(Debug)]
pub struct JsonLinesSink {
    dir: PathBuf,
    files: StdMutex<HashMap<String, Arc<Mutex<File>>>>,
}

impl JsonLinesSink {
    /// Creates the output directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `AadError::Io` if the directory cannot be created.
    pub async fn create(dir: impl Into<PathBuf>) -> AadResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            files: StdMutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `type_name` records.
    #[must_use]
    pub fn path_for(&self, type_name: &str) -> PathBuf {
        self.dir.join(format!("{type_name}.jsonl"))
    }

    async fn file_for(&self, type_name: &str) -> AadResult<Arc<Mutex<File>>> {
        if let Some(file) = self.lookup(type_name)? {
            return Ok(file);
        }

        let path = self.path_for(type_name);
        debug!(path = %path.display(), "opening output file");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let mut files = self
            .files
            .lock()
            .map_err(|_| AadError::Sink("output file table poisoned".to_string()))?;
        // Another writer may have opened it meanwhile; keep the first handle.
        Ok(Arc::clone(
            files
                .entry(type_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(file))),
        ))
    }

    fn lookup(&self, type_name: &str) -> AadResult<Option<Arc<Mutex<File>>>> {
        let files = self
            .files
            .lock()
            .map_err(|_| AadError::Sink("output file table poisoned".to_string()))?;
        Ok(files.get(type_name).cloned())
    }

    fn handles(&self) -> AadResult<Vec<Arc<Mutex<File>>>> {
        let files = self
            .files
            .lock()
            .map_err(|_| AadError::Sink("output file table poisoned".to_string()))?;
        Ok(files.values().cloned().collect())
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn append(&self, type_name: &str, record: &DirectoryRecord) -> AadResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let file = self.file_for(type_name).await?;
        let mut file = file.lock().await;
        file.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> AadResult<()> {
        for file in self.handles()? {
            file.lock().await.flush().await?;
        }
        Ok(())
    }
}

/// Keeps records in memory, grouped by type.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: StdMutex<HashMap<String, Vec<DirectoryRecord>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written for `type_name`, in arrival order.
    #[must_use]
    pub fn records(&self, type_name: &str) -> Vec<DirectoryRecord> {
        self.records
            .lock()
            .map(|records| records.get(type_name).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Total number of records across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .map(|records| records.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn append(&self, type_name: &str, record: &DirectoryRecord) -> AadResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AadError::Sink("memory sink poisoned".to_string()))?;
        records
            .entry(type_name.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}
