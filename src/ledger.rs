//! Dedup ledger: the set of item identifiers that have already been posted.
//!
//! The ledger is persisted as one blob of newline-separated identifiers under
//! a fixed key, either a local file ([`FileStore`]) or an S3 object
//! ([`S3Store`], `aws` feature). A missing blob means nothing has been posted
//! yet. Every successful publish rewrites the whole blob, so a crash can lose
//! at most the in-flight item.

use crate::error::LedgerError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Backing storage for the ledger blob.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the blob. `Ok(None)` when it does not exist yet.
    async fn read(&self) -> Result<Option<String>, LedgerError>;

    /// Replace the blob. Readers must observe either the old or the new
    /// contents, never a mix.
    async fn write(&self, contents: &str) -> Result<(), LedgerError>;

    fn describe(&self) -> String;
}

pub fn parse_ids(blob: &str) -> BTreeSet<String> {
    blob.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn render_ids(ids: &BTreeSet<String>) -> String {
    ids.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}

/// In-memory view of the ledger plus the store it came from.
pub struct DedupLedger {
    store: Arc<dyn LedgerStore>,
    posted: BTreeSet<String>,
}

impl DedupLedger {
    /// Load the posted set from `store`.
    #[instrument(level = "info", skip_all, fields(store = %store.describe()))]
    pub async fn load(store: Arc<dyn LedgerStore>) -> Result<Self, LedgerError> {
        let posted = match store.read().await? {
            Some(blob) => parse_ids(&blob),
            None => {
                info!("No ledger yet; treating as empty");
                BTreeSet::new()
            }
        };
        info!(count = posted.len(), "Loaded dedup ledger");
        Ok(Self { store, posted })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.posted.contains(id)
    }

    pub fn len(&self) -> usize {
        self.posted.len()
    }

    /// Mark `id` as posted and persist the full set.
    ///
    /// The id stays in the in-memory set even if the write fails, so the
    /// current run will not post it twice.
    #[instrument(level = "info", skip(self))]
    pub async fn record(&mut self, id: &str) -> Result<(), LedgerError> {
        if !self.posted.insert(id.to_string()) {
            debug!("Already recorded");
            return Ok(());
        }
        match self.store.write(&render_ids(&self.posted)).await {
            Ok(()) => {
                info!(count = self.posted.len(), "Ledger persisted");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Ledger write failed");
                Err(e)
            }
        }
    }
}

/// Ledger kept in a local file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LedgerStore for FileStore {
    async fn read(&self) -> Result<Option<String>, LedgerError> {
        match fs::read_to_string(&self.path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, contents: &str) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        // rename is atomic on the same filesystem
        let tmp = self.temp_path();
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Ledger kept as a single S3 object.
#[cfg(feature = "aws")]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
}

#[cfg(feature = "aws")]
impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, key: String) -> Self {
        Self { client, bucket, key }
    }
}

#[cfg(feature = "aws")]
#[async_trait]
impl LedgerStore for S3Store {
    async fn read(&self) -> Result<Option<String>, LedgerError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await;
        let object = match resp {
            Ok(object) => object,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(LedgerError::Storage(service_error.to_string()));
            }
        };
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?
            .into_bytes();
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn write(&self, contents: &str) -> Result<(), LedgerError> {
        // PutObject replaces the object in one step
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(aws_sdk_s3::primitives::ByteStream::from(contents.as_bytes().to_vec()))
            .send()
            .await
            .map_err(|e| LedgerError::Storage(e.into_service_error().to_string()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
