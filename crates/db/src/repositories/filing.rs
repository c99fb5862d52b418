use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use taxcase_core::audit::AuditRecord;
use taxcase_core::domain::filing::{
    Filing, FilingId, FilingStatus, FilingStatusLogEntry, FilingStatusLogId, ServiceType,
};
use taxcase_core::domain::user::UserId;

use super::audit::insert_audit;
use super::{
    FilingFilter, FilingRepository, FilingStats, RepositoryError, ServiceTypeCount, StatusCount,
};
use crate::DbPool;

pub struct SqlFilingRepository {
    pool: DbPool,
}

impl SqlFilingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const FILING_COLUMNS: &str = "id, owner_user_id, assessment_year, service_type, status,
    held_from_status, advisor_user_id, total_income, tax_payable, tax_paid, refund_amount,
    deadline, internal_notes, filed_at, acknowledged_at, created_at, updated_at";

fn decode_status(value: &str) -> Result<FilingStatus, RepositoryError> {
    FilingStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown filing status `{value}`")))
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

fn decode_optional_decimal(value: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    value
        .as_deref()
        .map(|raw| {
            raw.parse::<Decimal>()
                .map_err(|e| RepositoryError::Decode(format!("bad decimal `{raw}`: {e}")))
        })
        .transpose()
}

fn row_to_filing(row: &SqliteRow) -> Result<Filing, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let status_str: String = row.try_get("status").map_err(decode)?;
    let held_from_str: Option<String> = row.try_get("held_from_status").map_err(decode)?;
    let service_type_str: String = row.try_get("service_type").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode)?;

    Ok(Filing {
        id: FilingId(row.try_get("id").map_err(decode)?),
        owner_user_id: UserId(row.try_get("owner_user_id").map_err(decode)?),
        assessment_year: row.try_get("assessment_year").map_err(decode)?,
        service_type: ServiceType::parse(&service_type_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown service type `{service_type_str}`"))
        })?,
        status: decode_status(&status_str)?,
        held_from_status: held_from_str.as_deref().map(decode_status).transpose()?,
        advisor_user_id: row
            .try_get::<Option<String>, _>("advisor_user_id")
            .map_err(decode)?
            .map(UserId),
        total_income: decode_optional_decimal(row.try_get("total_income").map_err(decode)?)?,
        tax_payable: decode_optional_decimal(row.try_get("tax_payable").map_err(decode)?)?,
        tax_paid: decode_optional_decimal(row.try_get("tax_paid").map_err(decode)?)?,
        refund_amount: decode_optional_decimal(row.try_get("refund_amount").map_err(decode)?)?,
        deadline: decode_optional_datetime(row.try_get("deadline").map_err(decode)?)?,
        internal_notes: row.try_get("internal_notes").map_err(decode)?,
        filed_at: decode_optional_datetime(row.try_get("filed_at").map_err(decode)?)?,
        acknowledged_at: decode_optional_datetime(row.try_get("acknowledged_at").map_err(decode)?)?,
        created_at: decode_datetime(&created_at_str)?,
        updated_at: decode_datetime(&updated_at_str)?,
    })
}

fn row_to_log_entry(row: &SqliteRow) -> Result<FilingStatusLogEntry, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let from_str: String = row.try_get("from_status").map_err(decode)?;
    let to_str: String = row.try_get("to_status").map_err(decode)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode)?;

    Ok(FilingStatusLogEntry {
        id: FilingStatusLogId(row.try_get("id").map_err(decode)?),
        filing_id: FilingId(row.try_get("filing_id").map_err(decode)?),
        from_status: decode_status(&from_str)?,
        to_status: decode_status(&to_str)?,
        changed_by_user_id: UserId(row.try_get("changed_by_user_id").map_err(decode)?),
        note: row.try_get("note").map_err(decode)?,
        created_at: decode_datetime(&created_at_str)?,
    })
}

async fn insert_status_log(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    log: &FilingStatusLogEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO filing_status_log (id, filing_id, from_status, to_status,
                                        changed_by_user_id, note, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&log.id.0)
    .bind(&log.filing_id.0)
    .bind(log.from_status.as_str())
    .bind(log.to_status.as_str())
    .bind(&log.changed_by_user_id.0)
    .bind(log.note.as_deref())
    .bind(log.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl FilingRepository for SqlFilingRepository {
    async fn create(
        &self,
        filing: &Filing,
        log: &FilingStatusLogEntry,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO filing (id, owner_user_id, assessment_year, service_type, status,
                                 held_from_status, advisor_user_id, total_income, tax_payable,
                                 tax_paid, refund_amount, deadline, internal_notes, filed_at,
                                 acknowledged_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&filing.id.0)
        .bind(&filing.owner_user_id.0)
        .bind(&filing.assessment_year)
        .bind(filing.service_type.as_str())
        .bind(filing.status.as_str())
        .bind(filing.held_from_status.map(|status| status.as_str()))
        .bind(filing.advisor_user_id.as_ref().map(|advisor| advisor.0.as_str()))
        .bind(filing.total_income.map(|value| value.to_string()))
        .bind(filing.tax_payable.map(|value| value.to_string()))
        .bind(filing.tax_paid.map(|value| value.to_string()))
        .bind(filing.refund_amount.map(|value| value.to_string()))
        .bind(filing.deadline.map(|value| value.to_rfc3339()))
        .bind(filing.internal_notes.as_deref())
        .bind(filing.filed_at.map(|value| value.to_rfc3339()))
        .bind(filing.acknowledged_at.map(|value| value.to_rfc3339()))
        .bind(filing.created_at.to_rfc3339())
        .bind(filing.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_status_log(&mut tx, log).await?;
        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &FilingId) -> Result<Option<Filing>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {FILING_COLUMNS} FROM filing WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_filing).transpose()
    }

    async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Filing>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FILING_COLUMNS} FROM filing
             WHERE owner_user_id = ?
             ORDER BY assessment_year DESC"
        ))
        .bind(&owner.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_filing).collect()
    }

    async fn list_filtered(&self, filter: &FilingFilter) -> Result<Vec<Filing>, RepositoryError> {
        let status = filter.status.map(|status| status.as_str());
        let service_type = filter.service_type.map(|service_type| service_type.as_str());
        let advisor = filter.advisor_user_id.as_ref().map(|advisor| advisor.0.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {FILING_COLUMNS} FROM filing
             WHERE (? IS NULL OR status = ?)
               AND (? IS NULL OR assessment_year = ?)
               AND (? IS NULL OR service_type = ?)
               AND (? IS NULL OR advisor_user_id = ?)
             ORDER BY created_at DESC"
        ))
        .bind(status)
        .bind(status)
        .bind(filter.assessment_year.as_deref())
        .bind(filter.assessment_year.as_deref())
        .bind(service_type)
        .bind(service_type)
        .bind(advisor)
        .bind(advisor)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_filing).collect()
    }

    async fn apply_transition(
        &self,
        filing: &Filing,
        expected_from: FilingStatus,
        log: &FilingStatusLogEntry,
        audit: &AuditRecord,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE filing
             SET status = ?, held_from_status = ?, filed_at = ?, acknowledged_at = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(filing.status.as_str())
        .bind(filing.held_from_status.map(|status| status.as_str()))
        .bind(filing.filed_at.map(|value| value.to_rfc3339()))
        .bind(filing.acknowledged_at.map(|value| value.to_rfc3339()))
        .bind(filing.updated_at.to_rfc3339())
        .bind(&filing.id.0)
        .bind(expected_from.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        insert_status_log(&mut tx, log).await?;
        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn update_details(
        &self,
        filing: &Filing,
        audit: &AuditRecord,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE filing
             SET advisor_user_id = ?, total_income = ?, tax_payable = ?, tax_paid = ?,
                 refund_amount = ?, deadline = ?, internal_notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(filing.advisor_user_id.as_ref().map(|advisor| advisor.0.as_str()))
        .bind(filing.total_income.map(|value| value.to_string()))
        .bind(filing.tax_payable.map(|value| value.to_string()))
        .bind(filing.tax_paid.map(|value| value.to_string()))
        .bind(filing.refund_amount.map(|value| value.to_string()))
        .bind(filing.deadline.map(|value| value.to_rfc3339()))
        .bind(filing.internal_notes.as_deref())
        .bind(filing.updated_at.to_rfc3339())
        .bind(&filing.id.0)
        .execute(&mut *tx)
        .await?;

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn status_log_for(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<FilingStatusLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, filing_id, from_status, to_status, changed_by_user_id, note, created_at
             FROM filing_status_log
             WHERE filing_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&filing_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_log_entry).collect()
    }

    async fn stats(&self) -> Result<FilingStats, RepositoryError> {
        let total = sqlx::query("SELECT COUNT(*) AS count FROM filing")
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("count")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let status_rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM filing GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        let by_status = status_rows
            .iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                let status_str: String = row.try_get("status").map_err(decode)?;
                Ok(StatusCount {
                    status: decode_status(&status_str)?,
                    count: row.try_get("count").map_err(decode)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        let type_rows = sqlx::query(
            "SELECT service_type, COUNT(*) AS count FROM filing
             GROUP BY service_type ORDER BY service_type",
        )
        .fetch_all(&self.pool)
        .await?;
        let by_service_type = type_rows
            .iter()
            .map(|row| {
                let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
                let type_str: String = row.try_get("service_type").map_err(decode)?;
                Ok(ServiceTypeCount {
                    service_type: ServiceType::parse(&type_str).ok_or_else(|| {
                        RepositoryError::Decode(format!("unknown service type `{type_str}`"))
                    })?,
                    count: row.try_get("count").map_err(decode)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(FilingStats { total, by_status, by_service_type })
    }
}
