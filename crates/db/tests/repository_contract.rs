use chrono::Utc;
use sqlx::Row;

use taxcase_core::audit::AuditRecord;
use taxcase_core::domain::document::{Document, DocumentCategory, DocumentStatus};
use taxcase_core::domain::filing::{Filing, FilingStatus, FilingStatusLogEntry, ServiceType};
use taxcase_core::domain::user::{StaffDirectory, UserId, UserProfile, UserRole};

use taxcase_db::repositories::{
    DocumentFilter, DocumentRepository, FilingFilter, FilingRepository, RepositoryError,
    SqlDocumentRepository, SqlFilingRepository, SqlStaffDirectory,
};
use taxcase_db::{connect_with_settings, migrations, DbPool};

async fn pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    pool
}

fn audit(action: &str) -> AuditRecord {
    AuditRecord::new(UserId("S-1".to_string()), action, "test", "T-1", Utc::now())
}

fn filing_for(owner: &str, year: &str) -> Filing {
    Filing::new(UserId(owner.to_string()), year, ServiceType::Individual, Utc::now())
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

fn root_document(owner: &str, category: DocumentCategory) -> Document {
    Document::new_root(
        UserId(owner.to_string()),
        None,
        category,
        "scan.pdf",
        format!("uploads/{owner}/unassigned/{}/scan.pdf", category.as_str()),
        2048,
        "application/pdf",
        Utc::now(),
    )
}

#[tokio::test]
async fn duplicate_filing_per_owner_year_hits_the_unique_index() {
    let pool = pool().await;
    let repo = SqlFilingRepository::new(pool);

    let first = filing_for("U-1", "2025-2026");
    repo.create(&first, &creation_log(&first), &audit("filing.initiated"))
        .await
        .expect("first create");

    let second = filing_for("U-1", "2025-2026");
    let error = repo
        .create(&second, &creation_log(&second), &audit("filing.initiated"))
        .await
        .expect_err("duplicate create must fail");
    assert!(matches!(error, RepositoryError::UniqueViolation(_)));

    // A different year for the same owner is fine.
    let other_year = filing_for("U-1", "2026-2027");
    repo.create(&other_year, &creation_log(&other_year), &audit("filing.initiated"))
        .await
        .expect("different year");
}

#[tokio::test]
async fn transition_commits_filing_log_and_audit_together() {
    let pool = pool().await;
    let repo = SqlFilingRepository::new(pool.clone());

    let mut filing = filing_for("U-1", "2025-2026");
    repo.create(&filing, &creation_log(&filing), &audit("filing.initiated"))
        .await
        .expect("create");

    let from = filing.status;
    filing.transition_to(FilingStatus::DocumentsReceived, Utc::now()).expect("legal move");
    let log = FilingStatusLogEntry::new(
        filing.id.clone(),
        from,
        FilingStatus::DocumentsReceived,
        UserId("S-1".to_string()),
        Some("docs ok".to_string()),
        Utc::now(),
    );

    let applied = repo
        .apply_transition(&filing, from, &log, &audit("filing.status_changed"))
        .await
        .expect("apply");
    assert!(applied);

    let entries = repo.status_log_for(&filing.id).await.expect("status log");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].to_status, FilingStatus::DocumentsReceived);
    assert_eq!(entries[1].note.as_deref(), Some("docs ok"));

    let audit_count = sqlx::query("SELECT COUNT(*) AS count FROM audit_log")
        .fetch_one(&pool)
        .await
        .expect("count audit rows")
        .get::<i64, _>("count");
    assert_eq!(audit_count, 2);

    // A stale expected-from status must miss, leaving no extra rows.
    let stale = repo
        .apply_transition(&filing, from, &log, &audit("filing.status_changed"))
        .await
        .expect("stale apply");
    assert!(!stale);
    assert_eq!(repo.status_log_for(&filing.id).await.expect("status log").len(), 2);
}

#[tokio::test]
async fn filtered_listing_and_stats_group_by_status_and_type() {
    let pool = pool().await;
    let repo = SqlFilingRepository::new(pool);

    let individual = filing_for("U-1", "2025-2026");
    repo.create(&individual, &creation_log(&individual), &audit("filing.initiated"))
        .await
        .expect("create individual");

    let mut corporate =
        Filing::new(UserId("U-2".to_string()), "2025-2026", ServiceType::Corporate, Utc::now());
    repo.create(&corporate, &creation_log(&corporate), &audit("filing.initiated"))
        .await
        .expect("create corporate");
    let from = corporate.status;
    corporate.transition_to(FilingStatus::UnderPreparation, Utc::now()).expect("move");
    let log = FilingStatusLogEntry::new(
        corporate.id.clone(),
        from,
        FilingStatus::UnderPreparation,
        UserId("S-1".to_string()),
        None,
        Utc::now(),
    );
    repo.apply_transition(&corporate, from, &log, &audit("filing.status_changed"))
        .await
        .expect("apply");

    let initiated_only = repo
        .list_filtered(&FilingFilter {
            status: Some(FilingStatus::Initiated),
            ..FilingFilter::default()
        })
        .await
        .expect("filtered list");
    assert_eq!(initiated_only.len(), 1);
    assert_eq!(initiated_only[0].id, individual.id);

    let stats = repo.stats().await.expect("stats");
    assert_eq!(stats.total, 2);
    assert!(stats
        .by_status
        .iter()
        .any(|entry| entry.status == FilingStatus::UnderPreparation && entry.count == 1));
    assert!(stats
        .by_service_type
        .iter()
        .any(|entry| entry.service_type == ServiceType::Individual && entry.count == 1));
}

#[tokio::test]
async fn review_is_a_conditional_update_on_pending() {
    let pool = pool().await;
    let repo = SqlDocumentRepository::new(pool);

    let document = root_document("U-1", DocumentCategory::SalaryCertificate);
    repo.insert(&document, &audit("document.uploaded")).await.expect("insert");

    let first = repo
        .record_review(
            &document.id,
            DocumentStatus::Rejected,
            Some("blurry scan, please redo"),
            &UserId("S-1".to_string()),
            Utc::now(),
            &audit("document.reviewed"),
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
            &audit("document.reviewed"),
        )
        .await
        .expect("second review");
    assert!(!second, "a decided version must not be re-reviewed");

    let stored = repo.find_by_id(&document.id).await.expect("find").expect("exists");
    assert_eq!(stored.status, DocumentStatus::Rejected);
    assert_eq!(stored.rejection_note.as_deref(), Some("blurry scan, please redo"));
    assert!(stored.reviewed_at.is_some());
}

#[tokio::test]
async fn chains_report_their_highest_live_version() {
    let pool = pool().await;
    let repo = SqlDocumentRepository::new(pool);

    let mut rejected = root_document("U-1", DocumentCategory::SalaryCertificate);
    repo.insert(&rejected, &audit("document.uploaded")).await.expect("insert v1");
    repo.record_review(
        &rejected.id,
        DocumentStatus::Rejected,
        Some("blurry scan, please redo"),
        &UserId("S-1".to_string()),
        Utc::now(),
        &audit("document.reviewed"),
    )
    .await
    .expect("reject v1");
    rejected.status = DocumentStatus::Rejected;

    let replacement =
        rejected.next_version("uploads/U-1/unassigned/salary_certificate/scan-v2.pdf", 4096, "application/pdf", Utc::now());
    repo.insert(&replacement, &audit("document.reuploaded")).await.expect("insert v2");

    let current =
        repo.current_version(&rejected.chain_root_id).await.expect("current").expect("chain live");
    assert_eq!(current.version, 2);
    assert_eq!(current.status, DocumentStatus::Pending);

    let roots = repo
        .list_roots(&UserId("U-1".to_string()), &DocumentFilter::default())
        .await
        .expect("roots");
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].root.version, 1);
    assert_eq!(roots[0].version_count, 2);
    assert_eq!(roots[0].current_status, DocumentStatus::Pending);
}

#[tokio::test]
async fn tombstoning_hides_the_chain_but_keeps_the_rows() {
    let pool = pool().await;
    let repo = SqlDocumentRepository::new(pool);

    let document = root_document("U-1", DocumentCategory::BankStatement);
    repo.insert(&document, &audit("document.uploaded")).await.expect("insert");

    repo.tombstone_chain(&document.chain_root_id, Utc::now(), &audit("document.deleted"))
        .await
        .expect("tombstone");

    assert!(repo
        .current_version(&document.chain_root_id)
        .await
        .expect("current")
        .is_none());
    assert!(repo
        .list_roots(&UserId("U-1".to_string()), &DocumentFilter::default())
        .await
        .expect("roots")
        .is_empty());

    let retained = repo.find_by_id(&document.id).await.expect("find").expect("row kept");
    assert!(retained.is_deleted());
    assert_eq!(retained.storage_key, document.storage_key);
}

#[tokio::test]
async fn staff_directory_reports_role_and_activity() {
    let pool = pool().await;
    let directory = SqlStaffDirectory::new(pool);

    directory
        .upsert_user(&UserProfile {
            id: UserId("A-1".to_string()),
            role: UserRole::Advisor,
            active: true,
        })
        .await
        .expect("upsert advisor");
    directory
        .upsert_user(&UserProfile {
            id: UserId("C-1".to_string()),
            role: UserRole::Customer,
            active: false,
        })
        .await
        .expect("upsert customer");

    let advisor = directory
        .find(&UserId("A-1".to_string()))
        .await
        .expect("find advisor")
        .expect("advisor exists");
    assert_eq!(advisor.role, UserRole::Advisor);
    assert!(advisor.active);

    let customer = directory
        .find(&UserId("C-1".to_string()))
        .await
        .expect("find customer")
        .expect("customer exists");
    assert_eq!(customer.role, UserRole::Customer);
    assert!(!customer.active);

    assert!(directory.find(&UserId("missing".to_string())).await.expect("lookup").is_none());
}
