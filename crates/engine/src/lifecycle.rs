//! Filing Lifecycle Manager
//!
//! Owns filing creation, status transitions, advisor assignment and the
//! staff-side financial fields. Every transition appends a status-log row
//! and an audit record atomically with the entity change; events are
//! published only after the write committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taxcase_core::audit::AuditRecord;
use taxcase_core::domain::filing::{
    validate_assessment_year, Filing, FilingId, FilingStatus, FilingStatusLogEntry,
    FinancialUpdate, ServiceType,
};
use taxcase_core::domain::user::{StaffDirectory, UserId, UserRole};
use taxcase_core::errors::CoreError;
use taxcase_core::events::{DomainEvent, EventPublisher};
use taxcase_db::repositories::{
    FilingFilter, FilingRepository, FilingStats, RepositoryError,
};

use crate::storage_error;

pub struct FilingLifecycleManager {
    filings: Arc<dyn FilingRepository>,
    staff: Arc<dyn StaffDirectory>,
    events: Arc<dyn EventPublisher>,
}

impl FilingLifecycleManager {
    pub fn new(
        filings: Arc<dyn FilingRepository>,
        staff: Arc<dyn StaffDirectory>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { filings, staff, events }
    }

    /// Opens a filing for (owner, assessment year). Duplicate years are
    /// caught by the unique index, never by a read-then-write check.
    pub async fn initiate(
        &self,
        owner: UserId,
        assessment_year: &str,
        service_type: ServiceType,
    ) -> Result<Filing, CoreError> {
        validate_assessment_year(assessment_year)?;

        let now = Utc::now();
        let filing = Filing::new(owner.clone(), assessment_year, service_type, now);
        let log = FilingStatusLogEntry::new(
            filing.id.clone(),
            FilingStatus::Initiated,
            FilingStatus::Initiated,
            owner.clone(),
            None,
            now,
        );
        let audit =
            AuditRecord::new(owner.clone(), "filing.initiated", "filing", filing.id.0.clone(), now)
                .with_new_value(FilingStatus::Initiated.as_str());

        match self.filings.create(&filing, &log, &audit).await {
            Ok(()) => {}
            Err(RepositoryError::UniqueViolation(_)) => {
                return Err(CoreError::conflict(format!(
                    "a filing for assessment year {assessment_year} already exists"
                )));
            }
            Err(other) => return Err(storage_error(other)),
        }

        tracing::info!(
            filing_id = %filing.id.0,
            owner_user_id = %filing.owner_user_id.0,
            assessment_year = %filing.assessment_year,
            "filing initiated"
        );
        self.events.publish(DomainEvent::FilingInitiated {
            filing_id: filing.id.clone(),
            owner_user_id: filing.owner_user_id.clone(),
            assessment_year: filing.assessment_year.clone(),
            service_type: filing.service_type,
        });

        Ok(filing)
    }

    /// Moves the filing along the lifecycle. Illegal edges are rejected
    /// before any write; a lost conditional write surfaces as a conflict.
    pub async fn transition(
        &self,
        filing_id: &FilingId,
        to: FilingStatus,
        note: Option<String>,
        actor: &UserId,
    ) -> Result<Filing, CoreError> {
        let mut filing = self.load(filing_id).await?;
        let from = filing.status;
        let now = Utc::now();
        filing.transition_to(to, now)?;

        let log = FilingStatusLogEntry::new(
            filing.id.clone(),
            from,
            to,
            actor.clone(),
            note.clone(),
            now,
        );
        let audit = AuditRecord::new(
            actor.clone(),
            "filing.status_changed",
            "filing",
            filing.id.0.clone(),
            now,
        )
        .with_old_value(from.as_str())
        .with_new_value(to.as_str());

        let applied = self
            .filings
            .apply_transition(&filing, from, &log, &audit)
            .await
            .map_err(storage_error)?;
        if !applied {
            return Err(CoreError::conflict(
                "filing status changed concurrently; reload and retry",
            ));
        }

        tracing::info!(
            filing_id = %filing.id.0,
            from = from.as_str(),
            to = to.as_str(),
            "filing status changed"
        );
        self.events.publish(DomainEvent::FilingStatusChanged {
            filing_id: filing.id.clone(),
            owner_user_id: filing.owner_user_id.clone(),
            from_status: from,
            to_status: to,
            note,
        });

        Ok(filing)
    }

    /// Assigns preparation work to a staff user. The target must exist,
    /// be active and hold the advisor role.
    pub async fn assign_advisor(
        &self,
        filing_id: &FilingId,
        advisor_user_id: UserId,
        actor: &UserId,
    ) -> Result<Filing, CoreError> {
        let mut filing = self.load(filing_id).await?;

        let profile = self
            .staff
            .find(&advisor_user_id)
            .await?
            .ok_or_else(|| {
                CoreError::bad_request(format!("unknown user `{}`", advisor_user_id.0))
            })?;
        if profile.role != UserRole::Advisor || !profile.active {
            return Err(CoreError::bad_request(format!(
                "user `{}` is not an active advisor",
                advisor_user_id.0
            )));
        }

        let now = Utc::now();
        let previous = filing.advisor_user_id.clone();
        filing.advisor_user_id = Some(advisor_user_id.clone());
        filing.updated_at = now;

        let mut audit = AuditRecord::new(
            actor.clone(),
            "filing.advisor_assigned",
            "filing",
            filing.id.0.clone(),
            now,
        )
        .with_new_value(advisor_user_id.0.clone());
        if let Some(previous) = previous {
            audit = audit.with_old_value(previous.0);
        }

        self.filings.update_details(&filing, &audit).await.map_err(storage_error)?;

        self.events.publish(DomainEvent::AdvisorAssigned {
            filing_id: filing.id.clone(),
            owner_user_id: filing.owner_user_id.clone(),
            advisor_user_id,
        });

        Ok(filing)
    }

    /// Partial update of the financial fields; only supplied fields change
    /// and there are no status or log side effects.
    pub async fn update_financials(
        &self,
        filing_id: &FilingId,
        update: FinancialUpdate,
        actor: &UserId,
    ) -> Result<Filing, CoreError> {
        let mut filing = self.load(filing_id).await?;
        let now = Utc::now();
        let before = financial_snapshot(&filing);
        update.apply(&mut filing, now);

        let audit = AuditRecord::new(
            actor.clone(),
            "filing.financials_updated",
            "filing",
            filing.id.0.clone(),
            now,
        )
        .with_old_value(before)
        .with_new_value(financial_snapshot(&filing));

        self.filings.update_details(&filing, &audit).await.map_err(storage_error)?;

        Ok(filing)
    }

    pub async fn get(&self, filing_id: &FilingId) -> Result<Filing, CoreError> {
        self.load(filing_id).await
    }

    /// Owner-scoped read; a foreign filing reads as missing.
    pub async fn get_owned(
        &self,
        filing_id: &FilingId,
        owner: &UserId,
    ) -> Result<Filing, CoreError> {
        let filing = self.load(filing_id).await?;
        if &filing.owner_user_id != owner {
            return Err(CoreError::not_found("filing", filing_id.0.clone()));
        }
        Ok(filing)
    }

    pub async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Filing>, CoreError> {
        self.filings.list_for_owner(owner).await.map_err(storage_error)
    }

    pub async fn list_filtered(&self, filter: &FilingFilter) -> Result<Vec<Filing>, CoreError> {
        self.filings.list_filtered(filter).await.map_err(storage_error)
    }

    pub async fn stats(&self) -> Result<FilingStats, CoreError> {
        self.filings.stats().await.map_err(storage_error)
    }

    pub async fn status_log(
        &self,
        filing_id: &FilingId,
    ) -> Result<Vec<FilingStatusLogEntry>, CoreError> {
        self.filings.status_log_for(filing_id).await.map_err(storage_error)
    }

    async fn load(&self, filing_id: &FilingId) -> Result<Filing, CoreError> {
        self.filings
            .find_by_id(filing_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| CoreError::not_found("filing", filing_id.0.clone()))
    }
}

fn financial_snapshot(filing: &Filing) -> String {
    serde_json::json!({
        "total_income": filing.total_income,
        "tax_payable": filing.tax_payable,
        "tax_paid": filing.tax_paid,
        "refund_amount": filing.refund_amount,
        "deadline": filing.deadline,
        "internal_notes": filing.internal_notes,
        "advisor_user_id": filing.advisor_user_id,
    })
    .to_string()
}

/// Read-side progress presentation over the nine linear steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStep {
    pub status: FilingStatus,
    pub label: String,
    pub reached: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingProgress {
    pub percent: u8,
    pub days_remaining: Option<i64>,
    pub steps: Vec<ProgressStep>,
}

pub fn compute_progress(filing: &Filing, now: DateTime<Utc>) -> FilingProgress {
    let effective = match filing.status {
        FilingStatus::OnHold => filing.held_from_status.unwrap_or(FilingStatus::Initiated),
        other => other,
    };
    let reached_index = effective.linear_index().unwrap_or(0);

    let steps = FilingStatus::LINEAR_ORDER
        .iter()
        .enumerate()
        .map(|(index, &status)| ProgressStep {
            status,
            label: status.label().to_string(),
            reached: index <= reached_index,
        })
        .collect();

    FilingProgress {
        percent: filing.progress_percent(),
        days_remaining: filing.days_remaining(now),
        steps,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use taxcase_core::domain::filing::{Filing, FilingStatus, ServiceType};
    use taxcase_core::domain::user::UserId;

    use super::compute_progress;

    #[test]
    fn progress_marks_reached_steps() {
        let mut filing = Filing::new(
            UserId("U-1".to_string()),
            "2025-2026",
            ServiceType::Individual,
            Utc::now(),
        );
        filing.status = FilingStatus::DocumentsReceived;

        let progress = compute_progress(&filing, Utc::now());
        assert_eq!(progress.percent, 33);
        assert_eq!(progress.steps.len(), 9);
        assert!(progress.steps[2].reached);
        assert!(!progress.steps[3].reached);
        assert_eq!(progress.days_remaining, None);
    }
}
