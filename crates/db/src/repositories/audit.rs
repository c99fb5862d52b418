use taxcase_core::audit::AuditRecord;

use super::RepositoryError;

/// Appends the audit row inside the caller's transaction so the mutation
/// and its trail commit or roll back together.
pub(crate) async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &AuditRecord,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO audit_log (id, actor_user_id, action, entity_type, entity_id,
                                old_value, new_value, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.actor_user_id.0)
    .bind(&record.action)
    .bind(&record.entity_type)
    .bind(&record.entity_id)
    .bind(record.old_value.as_deref())
    .bind(record.new_value.as_deref())
    .bind(record.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}
