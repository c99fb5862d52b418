use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use taxcase_core::audit::AuditRecord;
use taxcase_core::domain::document::{
    Document, DocumentCategory, DocumentId, DocumentStatus,
};
use taxcase_core::domain::filing::{
    Filing, FilingId, FilingStatus, FilingStatusLogEntry, ServiceType,
};
use taxcase_core::domain::user::UserId;

mod audit;
pub mod document;
pub mod filing;
pub mod memory;
pub mod user;

pub use document::SqlDocumentRepository;
pub use filing::SqlFilingRepository;
pub use memory::{InMemoryDocumentRepository, InMemoryFilingRepository};
pub use user::SqlStaffDirectory;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                Self::UniqueViolation(db_error.message().to_string())
            }
            _ => Self::Database(error),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilingFilter {
    pub status: Option<FilingStatus>,
    pub assessment_year: Option<String>,
    pub service_type: Option<ServiceType>,
    pub advisor_user_id: Option<UserId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentFilter {
    pub category: Option<DocumentCategory>,
    pub status: Option<DocumentStatus>,
    pub filing_id: Option<FilingId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: FilingStatus,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceTypeCount {
    pub service_type: ServiceType,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilingStats {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
    pub by_service_type: Vec<ServiceTypeCount>,
}

/// A chain-root row annotated for "my documents" listings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentChainSummary {
    pub root: Document,
    pub current_status: DocumentStatus,
    pub version_count: u32,
}

/// Filing persistence. The mutating calls commit the entity change, the
/// status-log append and the audit append in one transaction.
#[async_trait]
pub trait FilingRepository: Send + Sync {
    /// Inserts a new filing together with its creation self-transition log
    /// row. Surfaces the (owner, assessment_year) unique index as
    /// [`RepositoryError::UniqueViolation`].
    async fn create(
        &self,
        filing: &Filing,
        log: &FilingStatusLogEntry,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &FilingId) -> Result<Option<Filing>, RepositoryError>;

    async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Filing>, RepositoryError>;

    async fn list_filtered(&self, filter: &FilingFilter) -> Result<Vec<Filing>, RepositoryError>;

    /// Conditional write: persists the already-transitioned filing only if
    /// the stored status still equals `expected_from`. Returns `false` on a
    /// lost race; the caller surfaces that as a conflict, never a silent
    /// no-op.
    async fn apply_transition(
        &self,
        filing: &Filing,
        expected_from: FilingStatus,
        log: &FilingStatusLogEntry,
        audit: &AuditRecord,
    ) -> Result<bool, RepositoryError>;

    /// Persists advisor assignment and financial-field changes. No status
    /// or log side effects.
    async fn update_details(
        &self,
        filing: &Filing,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError>;

    async fn status_log_for(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<FilingStatusLogEntry>, RepositoryError>;

    async fn stats(&self) -> Result<FilingStats, RepositoryError>;
}

/// Document-chain persistence. Review is a compare-and-swap on the pending
/// status; deletion is a tombstone.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(
        &self,
        document: &Document,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;

    /// Highest live (non-deleted) version of a chain.
    async fn current_version(
        &self,
        chain_root_id: &DocumentId,
    ) -> Result<Option<Document>, RepositoryError>;

    async fn list_roots(
        &self,
        owner: &UserId,
        filter: &DocumentFilter,
    ) -> Result<Vec<DocumentChainSummary>, RepositoryError>;

    async fn list_all(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RepositoryError>;

    /// Highest live version per chain associated with the filing.
    async fn current_chains_for_filing(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<Document>, RepositoryError>;

    /// Conditional review write: decides the version only while it is still
    /// pending. Returns `false` if the version was already decided.
    #[allow(clippy::too_many_arguments)]
    async fn record_review(
        &self,
        id: &DocumentId,
        outcome: DocumentStatus,
        rejection_note: Option<&str>,
        reviewer: &UserId,
        reviewed_at: DateTime<Utc>,
        audit: &AuditRecord,
    ) -> Result<bool, RepositoryError>;

    /// Tombstones every live row of the chain; rows and blob keys are
    /// retained so audit entries stay readable.
    async fn tombstone_chain(
        &self,
        chain_root_id: &DocumentId,
        deleted_at: DateTime<Utc>,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError>;
}
