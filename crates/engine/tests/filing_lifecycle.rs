use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use taxcase_core::audit::InMemoryAuditSink;
use taxcase_core::domain::filing::{FilingStatus, FinancialUpdate, ServiceType};
use taxcase_core::domain::user::{InMemoryStaffDirectory, UserId, UserProfile, UserRole};
use taxcase_core::errors::{CoreError, ErrorKind};
use taxcase_core::events::{DomainEvent, InMemoryPublisher};
use taxcase_core::notify::InMemoryNotificationSink;

use taxcase_db::repositories::InMemoryFilingRepository;
use taxcase_engine::{compute_progress, FilingLifecycleManager, NotificationDispatcher};

struct Stack {
    manager: FilingLifecycleManager,
    audit: Arc<InMemoryAuditSink>,
    events: Arc<InMemoryPublisher>,
    staff: Arc<InMemoryStaffDirectory>,
}

fn stack() -> Stack {
    let audit = Arc::new(InMemoryAuditSink::default());
    let filings = Arc::new(InMemoryFilingRepository::new(audit.clone()));
    let staff = Arc::new(InMemoryStaffDirectory::default());
    let events = Arc::new(InMemoryPublisher::default());
    let manager = FilingLifecycleManager::new(filings, staff.clone(), events.clone());
    Stack { manager, audit, events, staff }
}

fn owner() -> UserId {
    UserId("U-1".to_string())
}

fn staff_user() -> UserId {
    UserId("S-1".to_string())
}

#[tokio::test]
async fn initiate_creates_the_filing_with_a_self_transition_log() {
    let stack = stack();

    let filing = stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Individual)
        .await
        .expect("initiate");

    assert_eq!(filing.status, FilingStatus::Initiated);
    assert_eq!(filing.assessment_year, "2025-2026");

    let log = stack.manager.status_log(&filing.id).await.expect("status log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].from_status, FilingStatus::Initiated);
    assert_eq!(log[0].to_status, FilingStatus::Initiated);

    assert_eq!(stack.audit.records().len(), 1);
    assert_eq!(stack.audit.records()[0].action, "filing.initiated");

    let events = stack.events.events();
    assert!(matches!(events.as_slice(), [DomainEvent::FilingInitiated { .. }]));
}

#[tokio::test]
async fn second_initiate_for_the_same_year_conflicts() {
    let stack = stack();

    stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Individual)
        .await
        .expect("first initiate");
    let error = stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Corporate)
        .await
        .expect_err("duplicate year");
    assert_eq!(error.kind(), ErrorKind::Conflict);

    // A different year is still fine.
    stack
        .manager
        .initiate(owner(), "2026-2027", ServiceType::Individual)
        .await
        .expect("next year");
}

#[tokio::test]
async fn malformed_assessment_year_is_rejected_up_front() {
    let stack = stack();
    let error = stack
        .manager
        .initiate(owner(), "2025/2026", ServiceType::Individual)
        .await
        .expect_err("bad year");
    assert_eq!(error.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn transition_appends_one_log_row_and_one_owner_notification() {
    let stack = stack();
    let filing = stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Individual)
        .await
        .expect("initiate");

    let updated = stack
        .manager
        .transition(
            &filing.id,
            FilingStatus::DocumentsReceived,
            Some("docs ok".to_string()),
            &staff_user(),
        )
        .await
        .expect("transition");

    assert_eq!(updated.status, FilingStatus::DocumentsReceived);

    let log = stack.manager.status_log(&filing.id).await.expect("status log");
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].from_status, FilingStatus::Initiated);
    assert_eq!(log[1].to_status, FilingStatus::DocumentsReceived);
    assert_eq!(log[1].changed_by_user_id, staff_user());
    assert_eq!(log[1].note.as_deref(), Some("docs ok"));

    // Exactly one owner notification for the status change event.
    let sink = InMemoryNotificationSink::default();
    let status_event = stack
        .events
        .events()
        .into_iter()
        .find(|event| matches!(event, DomainEvent::FilingStatusChanged { .. }))
        .expect("status change event");
    NotificationDispatcher::deliver(&sink, &status_event).await;
    assert_eq!(sink.sent_to(&owner()).len(), 1);

    let progress = compute_progress(&updated, Utc::now());
    assert_eq!(progress.percent, 33);
}

#[tokio::test]
async fn illegal_jumps_are_rejected_without_side_effects() {
    let stack = stack();
    let filing = stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Individual)
        .await
        .expect("initiate");
    stack
        .manager
        .transition(&filing.id, FilingStatus::UnderPreparation, None, &staff_user())
        .await
        .expect("forward");

    let backward = stack
        .manager
        .transition(&filing.id, FilingStatus::DocumentsPending, None, &staff_user())
        .await
        .expect_err("backward jump");
    assert_eq!(backward.kind(), ErrorKind::BadRequest);

    let same_state = stack
        .manager
        .transition(&filing.id, FilingStatus::UnderPreparation, None, &staff_user())
        .await
        .expect_err("same-state jump");
    assert_eq!(same_state.kind(), ErrorKind::BadRequest);

    assert_eq!(stack.manager.status_log(&filing.id).await.expect("log").len(), 2);
}

#[tokio::test]
async fn hold_and_resume_round_trip_through_the_side_state() {
    let stack = stack();
    let filing = stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Individual)
        .await
        .expect("initiate");
    stack
        .manager
        .transition(&filing.id, FilingStatus::ReviewReady, None, &staff_user())
        .await
        .expect("advance");

    let held = stack
        .manager
        .transition(&filing.id, FilingStatus::OnHold, Some("awaiting client".to_string()), &staff_user())
        .await
        .expect("hold");
    assert_eq!(held.status, FilingStatus::OnHold);
    assert_eq!(held.held_from_status, Some(FilingStatus::ReviewReady));

    let resumed = stack
        .manager
        .transition(&filing.id, FilingStatus::ReviewReady, None, &staff_user())
        .await
        .expect("resume");
    assert_eq!(resumed.status, FilingStatus::ReviewReady);
    assert_eq!(resumed.held_from_status, None);

    assert_eq!(stack.manager.status_log(&filing.id).await.expect("log").len(), 4);
}

#[tokio::test]
async fn advisor_assignment_requires_an_active_advisor() {
    let stack = stack();
    stack.staff.add(UserProfile {
        id: UserId("C-1".to_string()),
        role: UserRole::Customer,
        active: true,
    });
    stack.staff.add(UserProfile {
        id: UserId("A-1".to_string()),
        role: UserRole::Advisor,
        active: false,
    });
    stack.staff.add(UserProfile {
        id: UserId("A-2".to_string()),
        role: UserRole::Advisor,
        active: true,
    });

    let filing = stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Individual)
        .await
        .expect("initiate");

    let customer_target = stack
        .manager
        .assign_advisor(&filing.id, UserId("C-1".to_string()), &staff_user())
        .await
        .expect_err("customer cannot be an advisor");
    assert_eq!(customer_target.kind(), ErrorKind::BadRequest);

    let inactive_target = stack
        .manager
        .assign_advisor(&filing.id, UserId("A-1".to_string()), &staff_user())
        .await
        .expect_err("inactive advisor");
    assert_eq!(inactive_target.kind(), ErrorKind::BadRequest);

    // Failed attempts leave the filing unassigned.
    let unchanged = stack.manager.get(&filing.id).await.expect("reload");
    assert_eq!(unchanged.advisor_user_id, None);

    let assigned = stack
        .manager
        .assign_advisor(&filing.id, UserId("A-2".to_string()), &staff_user())
        .await
        .expect("assign");
    assert_eq!(assigned.advisor_user_id, Some(UserId("A-2".to_string())));

    let event = stack
        .events
        .events()
        .into_iter()
        .find(|event| matches!(event, DomainEvent::AdvisorAssigned { .. }))
        .expect("assignment event");
    let sink = InMemoryNotificationSink::default();
    NotificationDispatcher::deliver(&sink, &event).await;
    assert_eq!(sink.sent_to(&owner()).len(), 1);
    assert_eq!(sink.sent_to(&UserId("A-2".to_string())).len(), 1);
}

#[tokio::test]
async fn financial_update_changes_only_supplied_fields() {
    let stack = stack();
    let filing = stack
        .manager
        .initiate(owner(), "2025-2026", ServiceType::Individual)
        .await
        .expect("initiate");

    let updated = stack
        .manager
        .update_financials(
            &filing.id,
            FinancialUpdate {
                total_income: Some(Decimal::new(1_250_000, 2)),
                internal_notes: Some("waiting on bank statement".to_string()),
                ..FinancialUpdate::default()
            },
            &staff_user(),
        )
        .await
        .expect("update");

    assert_eq!(updated.total_income, Some(Decimal::new(1_250_000, 2)));
    assert_eq!(updated.internal_notes.as_deref(), Some("waiting on bank statement"));
    assert_eq!(updated.tax_payable, None);
    assert_eq!(updated.refund_amount, None);
    assert_eq!(updated.status, FilingStatus::Initiated);

    // No status-log side effects.
    assert_eq!(stack.manager.status_log(&filing.id).await.expect("log").len(), 1);
}

#[tokio::test]
async fn transitions_on_missing_filings_read_as_not_found() {
    let stack = stack();
    let error = stack
        .manager
        .transition(
            &taxcase_core::FilingId("missing".to_string()),
            FilingStatus::DocumentsReceived,
            None,
            &staff_user(),
        )
        .await
        .expect_err("missing filing");
    assert!(matches!(error, CoreError::NotFound { .. }));
}
