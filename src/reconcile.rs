use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PhotoMeta;
use crate::storage::{ByteStream, PhotoStore, PhotoStoreError, MAX_CHUNK};

/// One uploaded binary as handed over by the transport layer. Only the
/// extension of the original filename survives into storage.
pub struct PhotoUpload {
    pub filename: Option<String>,
    pub stream: ByteStream,
}

impl PhotoUpload {
    pub fn new(filename: Option<String>, stream: ByteStream) -> Self {
        Self { filename, stream }
    }

    /// Wraps an already-buffered body, re-chunked to the storage chunk
    /// bound. Used by the transport edge and by tests.
    pub fn from_bytes(filename: Option<String>, bytes: Vec<u8>) -> Self {
        let chunks: Vec<std::io::Result<Bytes>> = bytes
            .chunks(MAX_CHUNK)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Self {
            filename,
            stream: Box::pin(stream::iter(chunks)),
        }
    }
}

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Photo count mismatch: {declared} declared, {supplied} supplied")]
    CountMismatch { declared: usize, supplied: usize },
    #[error("Photo saving error: {0}")]
    WriteFailed(#[source] PhotoStoreError),
}

/// A photo whose metadata and binary now both exist.
#[derive(Debug, Clone)]
pub struct StoredPhoto {
    pub meta: PhotoMeta,
    pub file_name: String,
    pub bytes_written: u64,
}

/// Storage name of a photo binary: hyphenless uuid hex plus the original
/// upload's extension, if it had one. This name is the only link between
/// metadata and binary; downstream photo servers depend on it.
pub fn storage_name(id: Uuid, original_filename: Option<&str>) -> String {
    let ext = original_filename
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("{}{}", id.simple(), ext)
}

/// Pairs declared photo metadata with uploaded binaries and persists each
/// binary under its deterministic name.
pub struct PhotoReconciler {
    store: Arc<dyn PhotoStore>,
}

impl PhotoReconciler {
    pub fn new(store: Arc<dyn PhotoStore>) -> Self {
        Self { store }
    }

    /// Pairing is position-for-position: the i-th meta binds to the i-th
    /// upload. Counts are checked before anything is written; a write
    /// failure aborts the batch and leaves the already-written prefix in
    /// place (no rollback). Uploads process strictly in sequence, one at
    /// a time, and every input stream is dropped on every exit path.
    pub async fn reconcile(
        &self,
        metas: &[PhotoMeta],
        uploads: Vec<PhotoUpload>,
    ) -> Result<Vec<StoredPhoto>, PhotoError> {
        if metas.len() != uploads.len() {
            return Err(PhotoError::CountMismatch {
                declared: metas.len(),
                supplied: uploads.len(),
            });
        }
        let mut stored = Vec::with_capacity(metas.len());
        for (meta, upload) in metas.iter().zip(uploads) {
            let file_name = storage_name(meta.id, upload.filename.as_deref());
            let bytes_written = self
                .store
                .save_stream(&file_name, upload.stream)
                .await
                .map_err(PhotoError::WriteFailed)?;
            stored.push(StoredPhoto {
                meta: meta.clone(),
                file_name,
                bytes_written,
            });
        }
        Ok(stored)
    }
}
