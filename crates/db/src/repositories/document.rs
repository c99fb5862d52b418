use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use taxcase_core::audit::AuditRecord;
use taxcase_core::domain::document::{
    Document, DocumentCategory, DocumentId, DocumentStatus,
};
use taxcase_core::domain::filing::FilingId;
use taxcase_core::domain::user::UserId;

use super::audit::insert_audit;
use super::{
    DocumentChainSummary, DocumentFilter, DocumentRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DOCUMENT_COLUMNS: &str = "id, owner_user_id, filing_id, category, file_name, storage_key,
    file_size_bytes, mime_type, status, version, chain_root_id, rejection_note,
    reviewed_by_user_id, reviewed_at, deleted_at, created_at";

fn decode_status(value: &str) -> Result<DocumentStatus, RepositoryError> {
    DocumentStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown document status `{value}`")))
}

fn decode_datetime(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{value}`: {e}")))
}

fn decode_optional_datetime(
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.as_deref().map(decode_datetime).transpose()
}

fn row_to_document(row: &SqliteRow) -> Result<Document, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let category_str: String = row.try_get("category").map_err(decode)?;
    let status_str: String = row.try_get("status").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;
    let file_size: i64 = row.try_get("file_size_bytes").map_err(decode)?;
    let version: i64 = row.try_get("version").map_err(decode)?;

    Ok(Document {
        id: DocumentId(row.try_get("id").map_err(decode)?),
        owner_user_id: UserId(row.try_get("owner_user_id").map_err(decode)?),
        filing_id: row.try_get::<Option<String>, _>("filing_id").map_err(decode)?.map(FilingId),
        category: DocumentCategory::parse(&category_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown document category `{category_str}`"))
        })?,
        file_name: row.try_get("file_name").map_err(decode)?,
        storage_key: row.try_get("storage_key").map_err(decode)?,
        file_size_bytes: u64::try_from(file_size)
            .map_err(|_| RepositoryError::Decode(format!("negative file size `{file_size}`")))?,
        mime_type: row.try_get("mime_type").map_err(decode)?,
        status: decode_status(&status_str)?,
        version: u32::try_from(version)
            .map_err(|_| RepositoryError::Decode(format!("bad version `{version}`")))?,
        chain_root_id: DocumentId(row.try_get("chain_root_id").map_err(decode)?),
        rejection_note: row.try_get("rejection_note").map_err(decode)?,
        reviewed_by_user_id: row
            .try_get::<Option<String>, _>("reviewed_by_user_id")
            .map_err(decode)?
            .map(UserId),
        reviewed_at: decode_optional_datetime(row.try_get("reviewed_at").map_err(decode)?)?,
        deleted_at: decode_optional_datetime(row.try_get("deleted_at").map_err(decode)?)?,
        created_at: decode_datetime(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn insert(
        &self,
        document: &Document,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO document (id, owner_user_id, filing_id, category, file_name,
                                   storage_key, file_size_bytes, mime_type, status, version,
                                   chain_root_id, rejection_note, reviewed_by_user_id,
                                   reviewed_at, deleted_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id.0)
        .bind(&document.owner_user_id.0)
        .bind(document.filing_id.as_ref().map(|filing| filing.0.as_str()))
        .bind(document.category.as_str())
        .bind(&document.file_name)
        .bind(&document.storage_key)
        .bind(i64::try_from(document.file_size_bytes).unwrap_or(i64::MAX))
        .bind(&document.mime_type)
        .bind(document.status.as_str())
        .bind(i64::from(document.version))
        .bind(&document.chain_root_id.0)
        .bind(document.rejection_note.as_deref())
        .bind(document.reviewed_by_user_id.as_ref().map(|reviewer| reviewer.0.as_str()))
        .bind(document.reviewed_at.map(|value| value.to_rfc3339()))
        .bind(document.deleted_at.map(|value| value.to_rfc3339()))
        .bind(document.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn current_version(
        &self,
        chain_root_id: &DocumentId,
    ) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document
             WHERE chain_root_id = ? AND deleted_at IS NULL
             ORDER BY version DESC
             LIMIT 1"
        ))
        .bind(&chain_root_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_roots(
        &self,
        owner: &UserId,
        filter: &DocumentFilter,
    ) -> Result<Vec<DocumentChainSummary>, RepositoryError> {
        let category = filter.category.map(|category| category.as_str());
        let status = filter.status.map(|status| status.as_str());

        let rows = sqlx::query(
            "SELECT r.id, r.owner_user_id, r.filing_id, r.category, r.file_name, r.storage_key,
                    r.file_size_bytes, r.mime_type, r.status, r.version, r.chain_root_id,
                    r.rejection_note, r.reviewed_by_user_id, r.reviewed_at, r.deleted_at,
                    r.created_at,
                    agg.version_count AS chain_version_count,
                    cur.status AS chain_current_status
             FROM document r
             JOIN (SELECT chain_root_id, COUNT(*) AS version_count, MAX(version) AS max_version
                   FROM document
                   WHERE deleted_at IS NULL
                   GROUP BY chain_root_id) agg
               ON agg.chain_root_id = r.chain_root_id
             JOIN document cur
               ON cur.chain_root_id = r.chain_root_id AND cur.version = agg.max_version
             WHERE r.version = 1
               AND r.deleted_at IS NULL
               AND r.owner_user_id = ?
               AND (? IS NULL OR r.category = ?)
               AND (? IS NULL OR cur.status = ?)
               AND (? IS NULL OR r.filing_id = ?)
             ORDER BY r.created_at DESC",
        )
        .bind(&owner.0)
        .bind(category)
        .bind(category)
        .bind(status)
        .bind(status)
        .bind(filter.filing_id.as_ref().map(|filing| filing.0.as_str()))
        .bind(filter.filing_id.as_ref().map(|filing| filing.0.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                let current_status_str: String =
                    row.try_get("chain_current_status").map_err(decode)?;
                let version_count: i64 = row.try_get("chain_version_count").map_err(decode)?;
                Ok(DocumentChainSummary {
                    root: row_to_document(row)?,
                    current_status: decode_status(&current_status_str)?,
                    version_count: u32::try_from(version_count).unwrap_or(0),
                })
            })
            .collect()
    }

    async fn list_all(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RepositoryError> {
        let category = filter.category.map(|category| category.as_str());
        let status = filter.status.map(|status| status.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document
             WHERE deleted_at IS NULL
               AND (? IS NULL OR category = ?)
               AND (? IS NULL OR status = ?)
               AND (? IS NULL OR filing_id = ?)
             ORDER BY created_at DESC"
        ))
        .bind(category)
        .bind(category)
        .bind(status)
        .bind(status)
        .bind(filter.filing_id.as_ref().map(|filing| filing.0.as_str()))
        .bind(filter.filing_id.as_ref().map(|filing| filing.0.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn current_chains_for_filing(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<Document>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT d.id, d.owner_user_id, d.filing_id, d.category, d.file_name, d.storage_key,
                    d.file_size_bytes, d.mime_type, d.status, d.version, d.chain_root_id,
                    d.rejection_note, d.reviewed_by_user_id, d.reviewed_at, d.deleted_at,
                    d.created_at
             FROM document d
             JOIN (SELECT chain_root_id, MAX(version) AS max_version
                   FROM document
                   WHERE filing_id = ? AND deleted_at IS NULL
                   GROUP BY chain_root_id) latest
               ON latest.chain_root_id = d.chain_root_id AND latest.max_version = d.version
             WHERE d.deleted_at IS NULL
             ORDER BY d.created_at ASC",
        )
        .bind(&filing_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
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
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE document
             SET status = ?, rejection_note = ?, reviewed_by_user_id = ?, reviewed_at = ?
             WHERE id = ? AND status = 'pending' AND deleted_at IS NULL",
        )
        .bind(outcome.as_str())
        .bind(rejection_note)
        .bind(&reviewer.0)
        .bind(reviewed_at.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn tombstone_chain(
        &self,
        chain_root_id: &DocumentId,
        deleted_at: DateTime<Utc>,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE document SET deleted_at = ? WHERE chain_root_id = ? AND deleted_at IS NULL",
        )
        .bind(deleted_at.to_rfc3339())
        .bind(&chain_root_id.0)
        .execute(&mut *tx)
        .await?;

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(())
    }
}
