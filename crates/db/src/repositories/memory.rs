use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use taxcase_core::audit::{AuditRecord, AuditSink};
use taxcase_core::domain::document::{Document, DocumentId, DocumentStatus};
use taxcase_core::domain::filing::{Filing, FilingId, FilingStatus, FilingStatusLogEntry};
use taxcase_core::domain::user::UserId;

use super::{
    DocumentChainSummary, DocumentFilter, DocumentRepository, FilingFilter, FilingRepository,
    FilingStats, RepositoryError, ServiceTypeCount, StatusCount,
};

/// Test/standalone double for [`SqlFilingRepository`], emulating the unique
/// index and the conditional transition write.
///
/// [`SqlFilingRepository`]: super::SqlFilingRepository
pub struct InMemoryFilingRepository {
    filings: RwLock<HashMap<String, Filing>>,
    status_log: RwLock<Vec<FilingStatusLogEntry>>,
    audit: Arc<dyn AuditSink>,
}

impl InMemoryFilingRepository {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            filings: RwLock::new(HashMap::new()),
            status_log: RwLock::new(Vec::new()),
            audit,
        }
    }
}

#[async_trait::async_trait]
impl FilingRepository for InMemoryFilingRepository {
    async fn create(
        &self,
        filing: &Filing,
        log: &FilingStatusLogEntry,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut filings = self.filings.write().await;
        let duplicate = filings.values().any(|existing| {
            existing.owner_user_id == filing.owner_user_id
                && existing.assessment_year == filing.assessment_year
        });
        if duplicate {
            return Err(RepositoryError::UniqueViolation(
                "filing.owner_user_id, filing.assessment_year".to_string(),
            ));
        }

        filings.insert(filing.id.0.clone(), filing.clone());
        self.status_log.write().await.push(log.clone());
        self.audit.append(audit.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &FilingId) -> Result<Option<Filing>, RepositoryError> {
        let filings = self.filings.read().await;
        Ok(filings.get(&id.0).cloned())
    }

    async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Filing>, RepositoryError> {
        let filings = self.filings.read().await;
        let mut owned: Vec<Filing> =
            filings.values().filter(|filing| &filing.owner_user_id == owner).cloned().collect();
        owned.sort_by(|a, b| b.assessment_year.cmp(&a.assessment_year));
        Ok(owned)
    }

    async fn list_filtered(&self, filter: &FilingFilter) -> Result<Vec<Filing>, RepositoryError> {
        let filings = self.filings.read().await;
        let mut matched: Vec<Filing> = filings
            .values()
            .filter(|filing| {
                filter.status.map_or(true, |status| filing.status == status)
                    && filter
                        .assessment_year
                        .as_ref()
                        .map_or(true, |year| &filing.assessment_year == year)
                    && filter
                        .service_type
                        .map_or(true, |service_type| filing.service_type == service_type)
                    && filter
                        .advisor_user_id
                        .as_ref()
                        .map_or(true, |advisor| filing.advisor_user_id.as_ref() == Some(advisor))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn apply_transition(
        &self,
        filing: &Filing,
        expected_from: FilingStatus,
        log: &FilingStatusLogEntry,
        audit: &AuditRecord,
    ) -> Result<bool, RepositoryError> {
        let mut filings = self.filings.write().await;
        let Some(stored) = filings.get_mut(&filing.id.0) else {
            return Ok(false);
        };
        if stored.status != expected_from {
            return Ok(false);
        }

        *stored = filing.clone();
        self.status_log.write().await.push(log.clone());
        self.audit.append(audit.clone());
        Ok(true)
    }

    async fn update_details(
        &self,
        filing: &Filing,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut filings = self.filings.write().await;
        if let Some(stored) = filings.get_mut(&filing.id.0) {
            stored.advisor_user_id = filing.advisor_user_id.clone();
            stored.total_income = filing.total_income;
            stored.tax_payable = filing.tax_payable;
            stored.tax_paid = filing.tax_paid;
            stored.refund_amount = filing.refund_amount;
            stored.deadline = filing.deadline;
            stored.internal_notes = filing.internal_notes.clone();
            stored.updated_at = filing.updated_at;
            self.audit.append(audit.clone());
        }
        Ok(())
    }

    async fn status_log_for(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<FilingStatusLogEntry>, RepositoryError> {
        let status_log = self.status_log.read().await;
        Ok(status_log.iter().filter(|entry| &entry.filing_id == filing_id).cloned().collect())
    }

    async fn stats(&self) -> Result<FilingStats, RepositoryError> {
        let filings = self.filings.read().await;

        let mut status_counts: HashMap<&'static str, (FilingStatus, i64)> = HashMap::new();
        let mut type_counts: HashMap<&'static str, (taxcase_core::ServiceType, i64)> =
            HashMap::new();
        for filing in filings.values() {
            status_counts.entry(filing.status.as_str()).or_insert((filing.status, 0)).1 += 1;
            type_counts
                .entry(filing.service_type.as_str())
                .or_insert((filing.service_type, 0))
                .1 += 1;
        }

        let mut by_status: Vec<StatusCount> = status_counts
            .into_values()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        by_status.sort_by_key(|entry| entry.status.as_str());
        let mut by_service_type: Vec<ServiceTypeCount> = type_counts
            .into_values()
            .map(|(service_type, count)| ServiceTypeCount { service_type, count })
            .collect();
        by_service_type.sort_by_key(|entry| entry.service_type.as_str());

        Ok(FilingStats { total: filings.len() as i64, by_status, by_service_type })
    }
}

/// Test/standalone double for [`SqlDocumentRepository`], with the same
/// conditional-review and tombstone semantics.
///
/// [`SqlDocumentRepository`]: super::SqlDocumentRepository
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<String, Document>>,
    audit: Arc<dyn AuditSink>,
}

impl InMemoryDocumentRepository {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { documents: RwLock::new(HashMap::new()), audit }
    }
}

fn current_of_chain(documents: &HashMap<String, Document>, chain_root_id: &DocumentId) -> Option<Document> {
    documents
        .values()
        .filter(|document| &document.chain_root_id == chain_root_id && !document.is_deleted())
        .max_by_key(|document| document.version)
        .cloned()
}

#[async_trait::async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(
        &self,
        document: &Document,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        let duplicate = documents.values().any(|existing| {
            existing.chain_root_id == document.chain_root_id
                && existing.version == document.version
        });
        if duplicate {
            return Err(RepositoryError::UniqueViolation(
                "document.chain_root_id, document.version".to_string(),
            ));
        }

        documents.insert(document.id.0.clone(), document.clone());
        self.audit.append(audit.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&id.0).cloned())
    }

    async fn current_version(
        &self,
        chain_root_id: &DocumentId,
    ) -> Result<Option<Document>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(current_of_chain(&documents, chain_root_id))
    }

    async fn list_roots(
        &self,
        owner: &UserId,
        filter: &DocumentFilter,
    ) -> Result<Vec<DocumentChainSummary>, RepositoryError> {
        let documents = self.documents.read().await;
        let mut summaries: Vec<DocumentChainSummary> = documents
            .values()
            .filter(|root| {
                root.version == 1 && !root.is_deleted() && &root.owner_user_id == owner
            })
            .filter(|root| {
                filter.category.map_or(true, |category| root.category == category)
                    && filter
                        .filing_id
                        .as_ref()
                        .map_or(true, |filing| root.filing_id.as_ref() == Some(filing))
            })
            .filter_map(|root| {
                let current = current_of_chain(&documents, &root.chain_root_id)?;
                if filter.status.is_some_and(|status| current.status != status) {
                    return None;
                }
                let version_count = documents
                    .values()
                    .filter(|document| {
                        document.chain_root_id == root.chain_root_id && !document.is_deleted()
                    })
                    .count() as u32;
                Some(DocumentChainSummary {
                    root: root.clone(),
                    current_status: current.status,
                    version_count,
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.root.created_at.cmp(&a.root.created_at));
        Ok(summaries)
    }

    async fn list_all(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RepositoryError> {
        let documents = self.documents.read().await;
        let mut matched: Vec<Document> = documents
            .values()
            .filter(|document| {
                !document.is_deleted()
                    && filter.category.map_or(true, |category| document.category == category)
                    && filter.status.map_or(true, |status| document.status == status)
                    && filter
                        .filing_id
                        .as_ref()
                        .map_or(true, |filing| document.filing_id.as_ref() == Some(filing))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn current_chains_for_filing(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<Document>, RepositoryError> {
        let documents = self.documents.read().await;
        let mut latest_per_chain: HashMap<String, Document> = HashMap::new();
        for document in documents.values() {
            if document.is_deleted() || document.filing_id.as_ref() != Some(filing_id) {
                continue;
            }
            latest_per_chain
                .entry(document.chain_root_id.0.clone())
                .and_modify(|current| {
                    if document.version > current.version {
                        *current = document.clone();
                    }
                })
                .or_insert_with(|| document.clone());
        }
        let mut chains: Vec<Document> = latest_per_chain.into_values().collect();
        chains.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(chains)
    }

    async fn record_review(
        &self,
        id: &DocumentId,
        outcome: DocumentStatus,
        rejection_note: Option<&str>,
        reviewer: &UserId,
        reviewed_at: DateTime<Utc>,
        audit: &AuditRecord,
    ) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;
        let Some(stored) = documents.get_mut(&id.0) else {
            return Ok(false);
        };
        if stored.status != DocumentStatus::Pending || stored.is_deleted() {
            return Ok(false);
        }

        stored.status = outcome;
        stored.rejection_note = rejection_note.map(str::to_string);
        stored.reviewed_by_user_id = Some(reviewer.clone());
        stored.reviewed_at = Some(reviewed_at);
        self.audit.append(audit.clone());
        Ok(true)
    }

    async fn tombstone_chain(
        &self,
        chain_root_id: &DocumentId,
        deleted_at: DateTime<Utc>,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        for document in documents.values_mut() {
            if &document.chain_root_id == chain_root_id && !document.is_deleted() {
                document.deleted_at = Some(deleted_at);
            }
        }
        self.audit.append(audit.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use taxcase_core::audit::{AuditRecord, InMemoryAuditSink};
    use taxcase_core::domain::document::{Document, DocumentCategory, DocumentStatus};
    use taxcase_core::domain::filing::{
        Filing, FilingStatus, FilingStatusLogEntry, ServiceType,
    };
    use taxcase_core::domain::user::UserId;

    use super::super::{DocumentFilter, DocumentRepository, FilingRepository, RepositoryError};
    use super::{InMemoryDocumentRepository, InMemoryFilingRepository};

    fn audit_record(action: &str) -> AuditRecord {
        AuditRecord::new(UserId("S-1".to_string()), action, "test", "T-1", Utc::now())
    }

    fn filing() -> Filing {
        Filing::new(UserId("U-1".to_string()), "2025-2026", ServiceType::Individual, Utc::now())
    }

    fn creation_log(filing: &Filing) -> FilingStatusLogEntry {
        FilingStatusLogEntry::new(
            filing.id.clone(),
            FilingStatus::Initiated,
            FilingStatus::Initiated,
            filing.owner_user_id.clone(),
            None,
            filing.created_at,
        )
    }

    #[tokio::test]
    async fn duplicate_owner_year_is_a_unique_violation() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let repo = InMemoryFilingRepository::new(sink);

        let first = filing();
        repo.create(&first, &creation_log(&first), &audit_record("filing.initiated"))
            .await
            .expect("first create");

        let second = filing();
        let error = repo
            .create(&second, &creation_log(&second), &audit_record("filing.initiated"))
            .await
            .expect_err("duplicate create");
        assert!(matches!(error, RepositoryError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn transition_cas_misses_on_stale_status() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let repo = InMemoryFilingRepository::new(sink);

        let mut stored = filing();
        repo.create(&stored, &creation_log(&stored), &audit_record("filing.initiated"))
            .await
            .expect("create");

        stored.transition_to(FilingStatus::DocumentsReceived, Utc::now()).expect("transition");
        let log = FilingStatusLogEntry::new(
            stored.id.clone(),
            FilingStatus::Initiated,
            FilingStatus::DocumentsReceived,
            UserId("S-1".to_string()),
            None,
            Utc::now(),
        );

        let applied = repo
            .apply_transition(&stored, FilingStatus::Initiated, &log, &audit_record("t"))
            .await
            .expect("apply");
        assert!(applied);

        // Second apply with the stale expectation loses the race.
        let applied_again = repo
            .apply_transition(&stored, FilingStatus::Initiated, &log, &audit_record("t"))
            .await
            .expect("apply again");
        assert!(!applied_again);
    }

    #[tokio::test]
    async fn review_is_single_shot_per_version() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let repo = InMemoryDocumentRepository::new(sink.clone());

        let document = Document::new_root(
            UserId("U-1".to_string()),
            None,
            DocumentCategory::SalaryCertificate,
            "salary.pdf",
            "uploads/U-1/salary.pdf",
            1024,
            "application/pdf",
            Utc::now(),
        );
        repo.insert(&document, &audit_record("document.uploaded")).await.expect("insert");

        let first = repo
            .record_review(
                &document.id,
                DocumentStatus::Rejected,
                Some("blurry scan, please redo"),
                &UserId("S-1".to_string()),
                Utc::now(),
                &audit_record("document.reviewed"),
            )
            .await
            .expect("first review");
        assert!(first);

        let second = repo
            .record_review(
                &document.id,
                DocumentStatus::Accepted,
                None,
                &UserId("S-1".to_string()),
                Utc::now(),
                &audit_record("document.reviewed"),
            )
            .await
            .expect("second review");
        assert!(!second);
    }

    #[tokio::test]
    async fn tombstoned_chains_leave_listings() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let repo = InMemoryDocumentRepository::new(sink);

        let document = Document::new_root(
            UserId("U-1".to_string()),
            None,
            DocumentCategory::BankStatement,
            "statement.pdf",
            "uploads/U-1/statement.pdf",
            1024,
            "application/pdf",
            Utc::now(),
        );
        repo.insert(&document, &audit_record("document.uploaded")).await.expect("insert");

        repo.tombstone_chain(&document.chain_root_id, Utc::now(), &audit_record("document.deleted"))
            .await
            .expect("tombstone");

        let roots = repo
            .list_roots(&UserId("U-1".to_string()), &DocumentFilter::default())
            .await
            .expect("list roots");
        assert!(roots.is_empty());

        // The row itself is retained for audit readability.
        let retained = repo.find_by_id(&document.id).await.expect("find");
        assert!(retained.expect("row kept").is_deleted());
    }
}
