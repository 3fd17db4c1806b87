//! Durable storage for per-student booklet documents.
//!
//! Two backends implement [`DocumentStore`]: [`LocalDocumentStore`] for
//! development and single-host deployments, and [`S3DocumentStore`] for the
//! bucket the conversion fleet reads from.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use examsplit_core::naming::PREFIX_NAMESPACE;

use crate::config::{S3Credentials, StoreConfig};

/// Key namespace of persisted booklet documents.
pub const DOCUMENT_NAMESPACE: &str = "exam-pdf/";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid document key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Where booklet documents are kept once split off the source.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous content.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Storage key of the booklet document named by `prefix`.
///
/// The key reuses the random token of the image prefix, so a booklet's
/// document and its images are easy to correlate.
pub fn document_key(prefix: &str) -> String {
    let token = prefix.strip_prefix(PREFIX_NAMESPACE).unwrap_or(prefix);
    format!("{DOCUMENT_NAMESPACE}{token}.pdf")
}

/// Build the store selected by configuration.
pub async fn from_config(config: &StoreConfig) -> Box<dyn DocumentStore> {
    match config {
        StoreConfig::Local { root } => Box::new(LocalDocumentStore::new(root.clone())),
        StoreConfig::S3 {
            bucket,
            credentials,
        } => Box::new(S3DocumentStore::connect(bucket.clone(), credentials.as_ref()).await),
    }
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// Documents as files under a root directory.
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve `key` under the root, refusing anything that could escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        crate::scratch::remove_file(&path).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

/// Documents as objects in an S3 bucket.
pub struct S3DocumentStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3DocumentStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Build a client from the standard AWS environment.
    ///
    /// Explicit `credentials` take precedence over the default provider
    /// chain, so the store writes with the same identity that is forwarded
    /// to the conversion fleet.
    pub async fn connect(bucket: String, credentials: Option<&S3Credentials>) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);

        if let Some(keys) = credentials {
            builder = builder.credentials_provider(aws_credential_types::Credentials::new(
                keys.access_key_id.clone(),
                keys.secret_access_key.clone(),
                None,
                None,
                "examsplit-config",
            ));
        }

        Self::new(aws_sdk_s3::Client::from_conf(builder.build()), bucket)
    }
}

#[async_trait]
impl DocumentStore for S3DocumentStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/pdf")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
