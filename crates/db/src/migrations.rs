use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "filing",
        "filing_status_log",
        "document",
        "audit_log",
        "app_user",
        "uq_filing_owner_assessment_year",
        "uq_document_chain_version",
        "idx_filing_status",
        "idx_filing_service_type",
        "idx_filing_advisor_user_id",
        "idx_filing_status_log_filing_id",
        "idx_document_owner_user_id",
        "idx_document_filing_id",
        "idx_document_status",
        "idx_audit_log_entity",
        "idx_audit_log_actor_user_id",
    ];

    #[tokio::test]
    async fn migrations_create_every_managed_object() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE name = ?",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count");
            assert_eq!(count, 1, "expected schema object `{object}`");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent_per_version() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run is a no-op");
    }
}
