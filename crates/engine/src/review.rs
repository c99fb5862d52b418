//! Document Review Pipeline
//!
//! Transitions a pending document version to its terminal review state.
//! The decision is a compare-and-swap on `pending`, so a version is
//! reviewed exactly once even under concurrent staff requests.

use std::sync::Arc;

use chrono::Utc;

use taxcase_core::audit::AuditRecord;
use taxcase_core::domain::document::{
    Document, DocumentCategory, DocumentId, DocumentStatus, ReviewOutcome,
};
use taxcase_core::domain::filing::FilingId;
use taxcase_core::domain::user::UserId;
use taxcase_core::errors::CoreError;
use taxcase_core::events::{DomainEvent, EventPublisher};
use taxcase_db::repositories::DocumentRepository;

use crate::storage_error;

pub struct DocumentReviewPipeline {
    documents: Arc<dyn DocumentRepository>,
    events: Arc<dyn EventPublisher>,
}

impl DocumentReviewPipeline {
    pub fn new(documents: Arc<dyn DocumentRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { documents, events }
    }

    pub async fn review(
        &self,
        document_id: &DocumentId,
        outcome: ReviewOutcome,
        rejection_note: Option<String>,
        reviewer: &UserId,
    ) -> Result<Document, CoreError> {
        let mut document = self
            .documents
            .find_by_id(document_id)
            .await
            .map_err(storage_error)?
            .filter(|document| !document.is_deleted())
            .ok_or_else(|| CoreError::not_found("document", document_id.0.clone()))?;

        if document.status != DocumentStatus::Pending {
            return Err(CoreError::bad_request(format!(
                "document version was already reviewed as {}",
                document.status.as_str()
            )));
        }
        outcome.validate_note(rejection_note.as_deref())?;
        let note = if outcome.requires_note() { rejection_note } else { None };

        let now = Utc::now();
        let new_status = outcome.to_status();
        let mut audit = AuditRecord::new(
            reviewer.clone(),
            "document.reviewed",
            "document",
            document.id.0.clone(),
            now,
        )
        .with_old_value(DocumentStatus::Pending.as_str())
        .with_new_value(new_status.as_str());
        if let Some(ref note) = note {
            audit.new_value = Some(format!("{}: {note}", new_status.as_str()));
        }

        let applied = self
            .documents
            .record_review(&document.id, new_status, note.as_deref(), reviewer, now, &audit)
            .await
            .map_err(storage_error)?;
        if !applied {
            // Lost the race against a concurrent reviewer.
            return Err(CoreError::conflict("document version was already reviewed"));
        }

        document.status = new_status;
        document.rejection_note = note.clone();
        document.reviewed_by_user_id = Some(reviewer.clone());
        document.reviewed_at = Some(now);

        tracing::info!(
            document_id = %document.id.0,
            outcome = new_status.as_str(),
            "document reviewed"
        );
        self.events.publish(DomainEvent::DocumentReviewed {
            document_id: document.id.clone(),
            owner_user_id: document.owner_user_id.clone(),
            category: document.category,
            outcome: new_status,
            rejection_note: note,
        });

        Ok(document)
    }

    /// Pure notification side-channel: asks a customer for one more
    /// document. No trackable request entity is created; a later upload in
    /// the category is not linked back to this call.
    pub async fn request_additional(
        &self,
        target_user_id: UserId,
        category: DocumentCategory,
        filing_id: Option<FilingId>,
        note: String,
        requested_by: &UserId,
    ) -> Result<(), CoreError> {
        if note.trim().is_empty() {
            return Err(CoreError::bad_request("a note describing the request is required"));
        }

        self.events.publish(DomainEvent::AdditionalDocumentRequested {
            target_user_id,
            category,
            filing_id,
            note,
            requested_by: requested_by.clone(),
        });

        Ok(())
    }
}
