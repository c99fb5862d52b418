use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;
use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilingId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilingStatusLogId(pub String);

/// Lifecycle states of a filing. The first nine form a linear progress
/// order; `OnHold` is a side state entered from (and resumed back into)
/// the linear chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    Initiated,
    DocumentsPending,
    DocumentsReceived,
    UnderPreparation,
    ReviewReady,
    CustomerApproved,
    EFiled,
    Acknowledged,
    Completed,
    OnHold,
}

impl FilingStatus {
    pub const LINEAR_ORDER: [Self; 9] = [
        Self::Initiated,
        Self::DocumentsPending,
        Self::DocumentsReceived,
        Self::UnderPreparation,
        Self::ReviewReady,
        Self::CustomerApproved,
        Self::EFiled,
        Self::Acknowledged,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::DocumentsPending => "documents_pending",
            Self::DocumentsReceived => "documents_received",
            Self::UnderPreparation => "under_preparation",
            Self::ReviewReady => "review_ready",
            Self::CustomerApproved => "customer_approved",
            Self::EFiled => "e_filed",
            Self::Acknowledged => "acknowledged",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "initiated" => Some(Self::Initiated),
            "documents_pending" => Some(Self::DocumentsPending),
            "documents_received" => Some(Self::DocumentsReceived),
            "under_preparation" => Some(Self::UnderPreparation),
            "review_ready" => Some(Self::ReviewReady),
            "customer_approved" => Some(Self::CustomerApproved),
            "e_filed" => Some(Self::EFiled),
            "acknowledged" => Some(Self::Acknowledged),
            "completed" => Some(Self::Completed),
            "on_hold" => Some(Self::OnHold),
            _ => None,
        }
    }

    /// Human-readable label used in owner notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initiated => "Initiated",
            Self::DocumentsPending => "Documents Pending",
            Self::DocumentsReceived => "Documents Received",
            Self::UnderPreparation => "Under Preparation",
            Self::ReviewReady => "Ready for Review",
            Self::CustomerApproved => "Approved by Customer",
            Self::EFiled => "E-Filed",
            Self::Acknowledged => "Acknowledged",
            Self::Completed => "Completed",
            Self::OnHold => "On Hold",
        }
    }

    pub fn linear_index(&self) -> Option<usize> {
        Self::LINEAR_ORDER.iter().position(|status| status == self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Individual,
    Corporate,
    Nrb,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Corporate => "corporate",
            Self::Nrb => "nrb",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "individual" => Some(Self::Individual),
            "corporate" => Some(Self::Corporate),
            "nrb" => Some(Self::Nrb),
            _ => None,
        }
    }
}

/// Assessment years are `YYYY-YYYY` with consecutive years, e.g. `2025-2026`.
pub fn validate_assessment_year(value: &str) -> Result<(), CoreError> {
    let invalid =
        || CoreError::bad_request(format!("invalid assessment year `{value}` (expected YYYY-YYYY)"));

    let (first, second) = match value.split_once('-') {
        Some(parts) => parts,
        None => return Err(invalid()),
    };
    if first.len() != 4 || second.len() != 4 {
        return Err(invalid());
    }
    let first: u32 = first.parse().map_err(|_| invalid())?;
    let second: u32 = second.parse().map_err(|_| invalid())?;
    if second != first + 1 {
        return Err(CoreError::bad_request(format!(
            "invalid assessment year `{value}` (years must be consecutive)"
        )));
    }

    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    pub id: FilingId,
    pub owner_user_id: UserId,
    pub assessment_year: String,
    pub service_type: ServiceType,
    pub status: FilingStatus,
    /// Set only while the filing is `OnHold`; records the state to resume
    /// from.
    pub held_from_status: Option<FilingStatus>,
    pub advisor_user_id: Option<UserId>,
    pub total_income: Option<Decimal>,
    pub tax_payable: Option<Decimal>,
    pub tax_paid: Option<Decimal>,
    pub refund_amount: Option<Decimal>,
    pub deadline: Option<DateTime<Utc>>,
    pub internal_notes: Option<String>,
    pub filed_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Filing {
    pub fn new(
        owner_user_id: UserId,
        assessment_year: impl Into<String>,
        service_type: ServiceType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FilingId(Uuid::new_v4().to_string()),
            owner_user_id,
            assessment_year: assessment_year.into(),
            service_type,
            status: FilingStatus::Initiated,
            held_from_status: None,
            advisor_user_id: None,
            total_income: None,
            tax_payable: None,
            tax_paid: None,
            refund_amount: None,
            deadline: None,
            internal_notes: None,
            filed_at: None,
            acknowledged_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Legal edges: from a linear state, any strictly later linear state
    /// (staff may skip steps forward) or `OnHold`; from `OnHold`, the
    /// recorded pre-hold state or any state legal from it. Backward and
    /// same-state jumps are rejected, as is holding a completed filing.
    pub fn can_transition_to(&self, next: FilingStatus) -> bool {
        match (self.status, next) {
            (FilingStatus::OnHold, FilingStatus::OnHold) => false,
            (FilingStatus::OnHold, target) => {
                let held = self.held_from_status.unwrap_or(FilingStatus::Initiated);
                if target == held {
                    return true;
                }
                match (held.linear_index(), target.linear_index()) {
                    (Some(from), Some(to)) => to > from,
                    _ => false,
                }
            }
            (FilingStatus::Completed, FilingStatus::OnHold) => false,
            (_, FilingStatus::OnHold) => true,
            (current, target) => match (current.linear_index(), target.linear_index()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }

    pub fn transition_to(
        &mut self,
        next: FilingStatus,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if !self.can_transition_to(next) {
            return Err(CoreError::bad_request(format!(
                "invalid filing transition from {} to {}",
                self.status.as_str(),
                next.as_str()
            )));
        }

        if next == FilingStatus::OnHold {
            self.held_from_status = Some(self.status);
        } else {
            self.held_from_status = None;
        }
        self.status = next;

        // Terminal stamps are keep-first: resuming into the same state
        // never refreshes an existing timestamp.
        if next == FilingStatus::EFiled && self.filed_at.is_none() {
            self.filed_at = Some(now);
        }
        if next == FilingStatus::Acknowledged && self.acknowledged_at.is_none() {
            self.acknowledged_at = Some(now);
        }
        self.updated_at = now;

        Ok(())
    }

    /// Progress across the nine linear steps; an on-hold filing reports the
    /// progress of the state it was held from.
    pub fn progress_percent(&self) -> u8 {
        let status = match self.status {
            FilingStatus::OnHold => {
                self.held_from_status.unwrap_or(FilingStatus::Initiated)
            }
            other => other,
        };
        let step = status.linear_index().map_or(1, |index| index + 1);
        let total = FilingStatus::LINEAR_ORDER.len();
        ((100 * step + total / 2) / total) as u8
    }

    /// Whole days until the deadline, clamped at zero; `None` without a
    /// deadline.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline.map(|deadline| {
            let seconds = (deadline - now).num_seconds();
            if seconds <= 0 {
                0
            } else {
                (seconds + 86_399) / 86_400
            }
        })
    }
}

/// Partial update of the staff-managed financial fields. Only supplied
/// fields change; there are no status or log side effects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialUpdate {
    pub total_income: Option<Decimal>,
    pub tax_payable: Option<Decimal>,
    pub tax_paid: Option<Decimal>,
    pub refund_amount: Option<Decimal>,
    pub deadline: Option<DateTime<Utc>>,
    pub internal_notes: Option<String>,
}

impl FinancialUpdate {
    pub fn apply(&self, filing: &mut Filing, now: DateTime<Utc>) {
        if let Some(total_income) = self.total_income {
            filing.total_income = Some(total_income);
        }
        if let Some(tax_payable) = self.tax_payable {
            filing.tax_payable = Some(tax_payable);
        }
        if let Some(tax_paid) = self.tax_paid {
            filing.tax_paid = Some(tax_paid);
        }
        if let Some(refund_amount) = self.refund_amount {
            filing.refund_amount = Some(refund_amount);
        }
        if let Some(deadline) = self.deadline {
            filing.deadline = Some(deadline);
        }
        if let Some(ref internal_notes) = self.internal_notes {
            filing.internal_notes = Some(internal_notes.clone());
        }
        filing.updated_at = now;
    }
}

/// One immutable row of the filing's transition history. Creation appends a
/// self-transition (initiated -> initiated) so the log replays completely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilingStatusLogEntry {
    pub id: FilingStatusLogId,
    pub filing_id: FilingId,
    pub from_status: FilingStatus,
    pub to_status: FilingStatus,
    pub changed_by_user_id: UserId,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FilingStatusLogEntry {
    pub fn new(
        filing_id: FilingId,
        from_status: FilingStatus,
        to_status: FilingStatus,
        changed_by_user_id: UserId,
        note: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FilingStatusLogId(Uuid::new_v4().to_string()),
            filing_id,
            from_status,
            to_status,
            changed_by_user_id,
            note,
            created_at,
        }
    }
}
