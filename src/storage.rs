use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use log::{error, info, warn};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::config::S3Config;

/// Upper bound on a single chunk handed to [`PhotoStore::save_stream`].
/// Producers must not yield larger chunks; memory use per in-flight
/// upload stays bounded by this.
pub const MAX_CHUNK: usize = 1 << 20;

/// Chunked binary payload. Dropping the stream releases the underlying
/// source on every exit path.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum PhotoStoreError {
    #[error("not_found")]
    NotFound,
    #[error("invalid file name: {0}")]
    BadName(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

/// Blob storage for photo binaries, keyed by the deterministic file name
/// `<photo-id-hex>.<ext>` that submissions assign.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Stream-copies `stream` to storage under `name`; returns bytes written.
    async fn save_stream(&self, name: &str, stream: ByteStream) -> Result<u64, PhotoStoreError>;
    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), PhotoStoreError>;
    async fn delete(&self, name: &str) -> Result<(), PhotoStoreError>;
    /// Removes every stored file whose stem (name without extension)
    /// matches; used when a pass and its photos are cascade-deleted and
    /// the original upload extension is no longer known.
    async fn delete_stem(&self, stem: &str) -> Result<u32, PhotoStoreError>;
}

fn check_name(name: &str) -> Result<(), PhotoStoreError> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        return Err(PhotoStoreError::BadName(name.to_string()));
    }
    Ok(())
}

fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

// ---------------- Filesystem implementation (primary backend) ----------------

/// Writes photo binaries directly under the configured upload directory.
/// Each write goes through a `.tmp` sibling and is renamed into place, so
/// a reader never observes a half-written photo.
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        std::fs::create_dir_all(root.join(".tmp"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn final_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.root.join(".tmp").join(name)
    }
}

#[async_trait]
impl PhotoStore for FsPhotoStore {
    async fn save_stream(&self, name: &str, mut stream: ByteStream) -> Result<u64, PhotoStoreError> {
        check_name(name)?;
        let tmp = self.temp_path(name);
        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut written: u64 = 0;
        loop {
            let chunk = match stream.try_next().await {
                Ok(Some(c)) => c,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(e.into());
                }
            };
            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e.into());
            }
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        if let Err(e) = tokio::fs::rename(&tmp, self.final_path(name)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(written)
    }

    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), PhotoStoreError> {
        check_name(name)?;
        match tokio::fs::read(self.final_path(name)).await {
            Ok(bytes) => {
                let mime = sniff_mime(&bytes);
                Ok((bytes, mime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PhotoStoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), PhotoStoreError> {
        check_name(name)?;
        match tokio::fs::remove_file(self.final_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_stem(&self, stem: &str) -> Result<u32, PhotoStoreError> {
        check_name(stem)?;
        let mut removed = 0u32;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s == stem)
                .unwrap_or(false);
            if matches {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ---------------- S3 implementation (MinIO compatible) ----------------

pub struct S3PhotoStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
}

impl S3PhotoStore {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let region = cfg.region.clone();
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(cfg.endpoint.clone());
        if !cfg.access_key.is_empty() && !cfg.secret_key.is_empty() {
            let creds = Credentials::new(
                cfg.access_key.clone(),
                cfg.secret_key.clone(),
                None,
                None,
                "static",
            );
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing: required for most MinIO/local endpoints
        // without wildcard DNS.
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized S3/MinIO photo store (path-style addressing)");

        // Ensure bucket exists (create if missing).
        if let Err(e) = client.head_bucket().bucket(&cfg.bucket).send().await {
            warn!("head_bucket failed for '{}' (will attempt create): {e:?}", cfg.bucket);
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&cfg.bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{}' (attempt {attempt})", cfg.bucket);
                        break;
                    }
                    Err(e2) => {
                        if attempt >= max_attempts {
                            error!(
                                "create_bucket failed for '{}' after {attempt} attempts: {e2:?}",
                                cfg.bucket
                            );
                            return Err(anyhow::anyhow!(
                                "failed to ensure bucket '{}': {e2}",
                                cfg.bucket
                            ));
                        }
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!(
                            "create_bucket attempt {attempt} failed for '{}': {e2:?} (retrying in {backoff_ms}ms)",
                            cfg.bucket
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64))
                            .await;
                    }
                }
            }
        }

        Ok(Self {
            bucket: cfg.bucket.clone(),
            client,
            prefix: cfg.prefix.clone(),
        })
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

#[async_trait]
impl PhotoStore for S3PhotoStore {
    async fn save_stream(&self, name: &str, mut stream: ByteStream) -> Result<u64, PhotoStoreError> {
        check_name(name)?;
        // The SDK wants the whole body up front; the transport edge caps
        // upload size, so buffering here stays bounded.
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            bytes.extend_from_slice(&chunk);
        }
        let written = bytes.len() as u64;
        let key = self.key_for(name);
        let content_type = sniff_mime(&bytes);
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(aws_sdk_s3::primitives::ByteStream::from(bytes))
            .content_type(content_type);
        if let Err(e) = put.send().await {
            error!("put_object failed name={name} key={key} bucket={}: {e:?}", self.bucket);
            return Err(PhotoStoreError::Other(e.to_string()));
        }
        Ok(written)
    }

    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), PhotoStoreError> {
        check_name(name)?;
        let key = self.key_for(name);
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| PhotoStoreError::NotFound)?;
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| PhotoStoreError::Other(e.to_string()))?;
        let bytes = Vec::from(data.into_bytes().as_ref());
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }

    async fn delete(&self, name: &str) -> Result<(), PhotoStoreError> {
        check_name(name)?;
        let key = self.key_for(name);
        // Best-effort delete: treat not found as success.
        let _ = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;
        Ok(())
    }

    async fn delete_stem(&self, stem: &str) -> Result<u32, PhotoStoreError> {
        check_name(stem)?;
        let list = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(format!("{}/{}", self.prefix, stem))
            .send()
            .await
            .map_err(|e| PhotoStoreError::Other(e.to_string()))?;
        let mut removed = 0u32;
        for obj in list.contents() {
            if let Some(key) = obj.key() {
                let _ = self
                    .client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Backend selection: S3 when configured, local filesystem otherwise.
pub async fn build_photo_store(
    upload_dir: &Path,
    s3: Option<&S3Config>,
) -> anyhow::Result<Arc<dyn PhotoStore>> {
    match s3 {
        Some(cfg) => Ok(Arc::new(S3PhotoStore::new(cfg).await?)),
        None => {
            let store = FsPhotoStore::new(upload_dir)?;
            info!("photo storage: filesystem at '{}'", upload_dir.display());
            Ok(Arc::new(store))
        }
    }
}
