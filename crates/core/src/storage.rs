use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::document::DocumentCategory;
use crate::domain::filing::FilingId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("upload store failure: {0}")]
pub struct StorageError(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Blob storage boundary. The blob is always written before the document
/// row commits, so the acceptable failure mode is an orphaned blob (garbage
/// collectable by key prefix), never a row referencing a missing blob.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    fn url_for(&self, key: &str) -> String;
}

/// Deterministic storage key: owner / filing (or `unassigned`) / category /
/// timestamp-filename.
pub fn storage_key(
    owner: &UserId,
    filing_id: Option<&FilingId>,
    category: DocumentCategory,
    uploaded_at: DateTime<Utc>,
    file_name: &str,
) -> String {
    let filing_segment = filing_id.map_or("unassigned", |filing_id| filing_id.0.as_str());
    format!(
        "uploads/{}/{}/{}/{}-{}",
        owner.0,
        filing_segment,
        category.as_str(),
        uploaded_at.timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[derive(Default)]
pub struct InMemoryUploadStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryUploadStore {
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl UploadStore for InMemoryUploadStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StoredObject, StorageError> {
        let mut objects = self.objects.write().await;
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(StoredObject { key: key.to_string(), url: self.url_for(key) })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        objects.remove(key);
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}
