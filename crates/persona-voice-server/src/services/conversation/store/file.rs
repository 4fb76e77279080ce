use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ContextStore, StoredRecord};
use crate::services::conversation::types::ConversationContext;

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileDocument {
    records: Vec<StoredRecord>,
}

/// Flat-file JSON store:
/// `{ "records": [ { userInput, modelResponse, timestamp }, .. ] }`.
///
/// Every write rewrites the whole document through a temp file and a rename,
/// so a crash mid-write leaves the previous version in place.
pub struct FileContextStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the document.
    write_lock: Mutex<()>,
}

impl FileContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<FileDocument> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileDocument::default())
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(FileDocument::default());
        }

        serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid context document in {}", self.path.display()))
    }

    async fn write_document(&self, document: &FileDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(document)?;
        let tmp_path = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(
            "Wrote {} context record(s) to {}",
            document.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContextStore for FileContextStore {
    async fn load_latest(&self) -> Result<Option<ConversationContext>> {
        let document = self.read_document().await?;
        Ok(document.records.into_iter().last().map(|r| r.context))
    }

    async fn upsert_current(&self, context: &ConversationContext) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;

        let record = StoredRecord::now(context);
        match document.records.last_mut() {
            Some(last) => *last = record,
            None => document.records.push(record),
        }

        self.write_document(&document).await
    }

    async fn insert_new(&self, context: &ConversationContext) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        document.records.push(StoredRecord::now(context));
        self.write_document(&document).await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
