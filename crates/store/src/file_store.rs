//! File-based document store implementation.
//!
//! # Directory Structure
//!
//! ```text
//! data/
//! ├── {doc_id}.json       # Whole document: collaborators, versions, comments
//! └── {doc_id}.json.tmp   # Present only while a save is in flight
//! ```
//!
//! Saves write a temp file and rename it over the old one, so a crash
//! mid-save leaves the previous state intact.

use crate::storage::DocumentStore;
use crate::{StoreError, StoreResult};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thesis_collab::{DocId, Document};

const DOCUMENT_EXTENSION: &str = "json";

/// File-based implementation of `DocumentStore`
pub struct FileDocumentStore {
    /// Base directory for all document files
    base_path: PathBuf,
}

impl FileDocumentStore {
    /// Create a store rooted at `base_path`, creating the directory if needed
    pub fn new(base_path: impl AsRef<Path>) -> StoreResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        tracing::debug!(path = %base_path.display(), "file document store opened");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a document
    fn doc_path(&self, doc_id: &DocId) -> StoreResult<PathBuf> {
        if !is_safe_file_stem(doc_id.as_str()) {
            return Err(StoreError::InvalidDocumentId(doc_id.clone()));
        }
        Ok(self
            .base_path
            .join(format!("{}.{}", doc_id, DOCUMENT_EXTENSION)))
    }
}

/// Write `value` as pretty JSON to `<path>.tmp`, sync it, then rename it
/// over `path`. Readers see either the old file or the new one.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(temp_path, path)?;
    Ok(())
}

/// Ids become file names, so they may not name a path
fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl DocumentStore for FileDocumentStore {
    fn load(&self, doc_id: &DocId) -> StoreResult<Document> {
        let path = self.doc_path(doc_id)?;
        if !path.exists() {
            return Err(StoreError::DocumentNotFound(doc_id.clone()));
        }

        let reader = BufReader::new(File::open(&path)?);
        let document: Document = serde_json::from_reader(reader)?;
        if document.id() != doc_id {
            return Err(StoreError::Corrupt(format!(
                "file for {} holds document {}",
                doc_id,
                document.id()
            )));
        }
        Ok(document)
    }

    fn save(&self, document: &Document) -> StoreResult<()> {
        let path = self.doc_path(document.id())?;
        write_json_atomic(&path, document)
    }

    fn list(&self) -> StoreResult<Vec<DocId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(DocId::from(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, doc_id: &DocId) -> StoreResult<bool> {
        Ok(self.doc_path(doc_id)?.exists())
    }
}
