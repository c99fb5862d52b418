//! Document Version Store
//!
//! Owns upload, re-upload and deletion of document chains. The blob is
//! always written before the row commits; an orphaned blob is garbage
//! collectable by key prefix, a row referencing a missing blob is not.

use std::sync::Arc;

use chrono::Utc;

use taxcase_core::audit::AuditRecord;
use taxcase_core::domain::document::{
    Document, DocumentCategory, DocumentId, DocumentStatus, UploadPolicy,
};
use taxcase_core::domain::filing::FilingId;
use taxcase_core::domain::user::UserId;
use taxcase_core::errors::CoreError;
use taxcase_core::events::{DomainEvent, EventPublisher};
use taxcase_core::storage::{storage_key, UploadStore};
use taxcase_db::repositories::{
    DocumentChainSummary, DocumentFilter, DocumentRepository, FilingRepository,
};

use crate::storage_error;

#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub struct DocumentVersionStore {
    documents: Arc<dyn DocumentRepository>,
    filings: Arc<dyn FilingRepository>,
    uploads: Arc<dyn UploadStore>,
    events: Arc<dyn EventPublisher>,
    policy: UploadPolicy,
}

impl DocumentVersionStore {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        filings: Arc<dyn FilingRepository>,
        uploads: Arc<dyn UploadStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { documents, filings, uploads, events, policy: UploadPolicy::default() }
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Creates version 1 of a new chain. An associated filing must belong
    /// to the uploader.
    pub async fn upload(
        &self,
        owner: &UserId,
        category: DocumentCategory,
        filing_id: Option<FilingId>,
        file: UploadRequest,
    ) -> Result<Document, CoreError> {
        self.policy.validate(&file.mime_type, file.bytes.len() as u64)?;

        if let Some(ref filing_id) = filing_id {
            let filing =
                self.filings.find_by_id(filing_id).await.map_err(storage_error)?;
            match filing {
                Some(filing) if &filing.owner_user_id == owner => {}
                _ => {
                    return Err(CoreError::bad_request(
                        "filing does not exist or does not belong to the uploader",
                    ));
                }
            }
        }

        let now = Utc::now();
        let key = storage_key(owner, filing_id.as_ref(), category, now, &file.file_name);
        self.uploads
            .put(&key, &file.bytes)
            .await
            .map_err(|error| CoreError::Storage(error.to_string()))?;

        let document = Document::new_root(
            owner.clone(),
            filing_id,
            category,
            file.file_name,
            key,
            file.bytes.len() as u64,
            file.mime_type,
            now,
        );
        let audit = AuditRecord::new(
            owner.clone(),
            "document.uploaded",
            "document",
            document.id.0.clone(),
            now,
        )
        .with_new_value(DocumentStatus::Pending.as_str());

        self.documents.insert(&document, &audit).await.map_err(storage_error)?;

        tracing::info!(
            document_id = %document.id.0,
            category = document.category.as_str(),
            "document uploaded"
        );
        self.events.publish(DomainEvent::DocumentUploaded {
            document_id: document.id.clone(),
            owner_user_id: document.owner_user_id.clone(),
            category: document.category,
            version: document.version,
        });

        Ok(document)
    }

    /// Appends version N+1 to an existing chain. Legal only while the
    /// chain's current version is rejected or awaiting a re-upload.
    pub async fn reupload(
        &self,
        owner: &UserId,
        document_id: &DocumentId,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Document, CoreError> {
        let target = self.find_owned(document_id, owner).await?;
        let current = self
            .documents
            .current_version(&target.chain_root_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| CoreError::not_found("document", document_id.0.clone()))?;

        if !current.status.allows_reupload() {
            return Err(CoreError::bad_request(format!(
                "document is {} and cannot be re-uploaded",
                current.status.as_str()
            )));
        }
        self.policy.validate(mime_type, bytes.len() as u64)?;

        let now = Utc::now();
        let key = storage_key(
            owner,
            current.filing_id.as_ref(),
            current.category,
            now,
            &current.file_name,
        );
        self.uploads
            .put(&key, &bytes)
            .await
            .map_err(|error| CoreError::Storage(error.to_string()))?;

        let replacement = current.next_version(key, bytes.len() as u64, mime_type, now);
        let audit = AuditRecord::new(
            owner.clone(),
            "document.reuploaded",
            "document",
            replacement.id.0.clone(),
            now,
        )
        .with_old_value(current.status.as_str())
        .with_new_value(DocumentStatus::Pending.as_str());

        self.documents.insert(&replacement, &audit).await.map_err(storage_error)?;

        self.events.publish(DomainEvent::DocumentReuploaded {
            document_id: replacement.id.clone(),
            owner_user_id: replacement.owner_user_id.clone(),
            category: replacement.category,
            version: replacement.version,
        });

        Ok(replacement)
    }

    /// Tombstones the chain. Accepted chains are immutable and cannot be
    /// deleted.
    pub async fn delete(&self, owner: &UserId, document_id: &DocumentId) -> Result<(), CoreError> {
        let target = self.find_owned(document_id, owner).await?;
        let current = self
            .documents
            .current_version(&target.chain_root_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| CoreError::not_found("document", document_id.0.clone()))?;

        if current.status == DocumentStatus::Accepted {
            return Err(CoreError::forbidden("accepted documents cannot be deleted"));
        }

        let now = Utc::now();
        let audit = AuditRecord::new(
            owner.clone(),
            "document.deleted",
            "document",
            target.chain_root_id.0.clone(),
            now,
        )
        .with_old_value(current.status.as_str());

        self.documents
            .tombstone_chain(&target.chain_root_id, now, &audit)
            .await
            .map_err(storage_error)?;

        tracing::info!(document_id = %document_id.0, "document chain deleted");
        Ok(())
    }

    pub async fn list_roots(
        &self,
        owner: &UserId,
        filter: &DocumentFilter,
    ) -> Result<Vec<DocumentChainSummary>, CoreError> {
        self.documents.list_roots(owner, filter).await.map_err(storage_error)
    }

    pub async fn list_all(&self, filter: &DocumentFilter) -> Result<Vec<Document>, CoreError> {
        self.documents.list_all(filter).await.map_err(storage_error)
    }

    pub async fn chains_for_filing(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<Document>, CoreError> {
        self.documents.current_chains_for_filing(filing_id).await.map_err(storage_error)
    }

    /// Resolves a download URL for the stored blob. Non-staff callers may
    /// only reach their own documents; foreign ids read as missing.
    pub async fn download_reference(
        &self,
        requester: &UserId,
        staff: bool,
        document_id: &DocumentId,
    ) -> Result<String, CoreError> {
        let document = self
            .documents
            .find_by_id(document_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| CoreError::not_found("document", document_id.0.clone()))?;
        if !staff && &document.owner_user_id != requester {
            return Err(CoreError::not_found("document", document_id.0.clone()));
        }
        Ok(self.uploads.url_for(&document.storage_key))
    }

    async fn find_owned(
        &self,
        document_id: &DocumentId,
        owner: &UserId,
    ) -> Result<Document, CoreError> {
        let document = self
            .documents
            .find_by_id(document_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| CoreError::not_found("document", document_id.0.clone()))?;
        if document.is_deleted() || &document.owner_user_id != owner {
            return Err(CoreError::not_found("document", document_id.0.clone()));
        }
        Ok(document)
    }
}
