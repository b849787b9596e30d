use std::path::PathBuf;

use anyhow::Context;

/// Process-wide configuration, built once at startup from the
/// environment and passed into component constructors. Read-only after
/// construction.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where photo binaries land (`<upload_dir>/<photo-id-hex>.<ext>`).
    pub upload_dir: PathBuf,
    /// In-memory store snapshot directory.
    pub data_dir: PathBuf,
    pub bind: String,
    /// Required only when the `postgres-store` backend is compiled in.
    pub database_url: Option<String>,
    /// When set, photo binaries go to S3/MinIO instead of the local fs.
    pub s3: Option<S3Config>,
    pub frontend_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub prefix: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let upload_dir = std::env::var("PASSREG_UPLOAD_DIR")
            .map(PathBuf::from)
            .context("PASSREG_UPLOAD_DIR must be set (photo upload directory)")?;
        let data_dir = std::env::var("PASSREG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let bind = std::env::var("PASSREG_BIND").unwrap_or_else(|_| "0.0.0.0:8080".into());

        let s3 = match std::env::var("S3_ENDPOINT") {
            Ok(endpoint) => Some(S3Config {
                bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "passreg-photos".into()),
                endpoint,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
                access_key: std::env::var("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: std::env::var("S3_SECRET_KEY").unwrap_or_default(),
                prefix: "photos".into(),
            }),
            Err(_) => None,
        };

        Ok(Self {
            upload_dir,
            data_dir,
            bind,
            database_url: std::env::var("DATABASE_URL").ok(),
            s3,
            frontend_url: std::env::var("FRONTEND_URL").ok(),
        })
    }
}
