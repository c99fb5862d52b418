use serde::{Deserialize, Serialize};

use crate::domain::document::{DocumentCategory, DocumentStatus};
use crate::domain::filing::ServiceType;

/// Required document sets per service type. The mapping is closed: an
/// unknown service type never reaches this table because `ServiceType` is
/// parsed at filing initiation.
pub fn required_categories(service_type: ServiceType) -> &'static [DocumentCategory] {
    match service_type {
        ServiceType::Individual => &[
            DocumentCategory::NationalId,
            DocumentCategory::TinCertificate,
            DocumentCategory::SalaryCertificate,
            DocumentCategory::BankStatement,
        ],
        ServiceType::Corporate => &[
            DocumentCategory::TradeLicense,
            DocumentCategory::TinCertificate,
            DocumentCategory::FinancialStatements,
            DocumentCategory::BankStatement,
            DocumentCategory::PreviousReturn,
        ],
        ServiceType::Nrb => &[
            DocumentCategory::Passport,
            DocumentCategory::TinCertificate,
            DocumentCategory::BankStatement,
            DocumentCategory::InvestmentProof,
        ],
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistItemStatus {
    NotUploaded,
    Pending,
    Accepted,
    Rejected,
    NeedsReupload,
}

impl ChecklistItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotUploaded => "not_uploaded",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::NeedsReupload => "needs_reupload",
        }
    }
}

impl From<DocumentStatus> for ChecklistItemStatus {
    fn from(status: DocumentStatus) -> Self {
        match status {
            DocumentStatus::Pending => Self::Pending,
            DocumentStatus::Accepted => Self::Accepted,
            DocumentStatus::Rejected => Self::Rejected,
            DocumentStatus::NeedsReupload => Self::NeedsReupload,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub category: DocumentCategory,
    pub label: String,
    pub status: ChecklistItemStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub service_type: ServiceType,
    pub items: Vec<ChecklistItem>,
    pub completion_rate: u8,
}

/// Scores a filing's required categories against the current status of
/// each matching document chain.
pub fn build_checklist(
    service_type: ServiceType,
    current_statuses: &[(DocumentCategory, DocumentStatus)],
) -> Checklist {
    let required = required_categories(service_type);
    let items: Vec<ChecklistItem> = required
        .iter()
        .map(|&category| {
            let status = current_statuses
                .iter()
                .find(|(chain_category, _)| *chain_category == category)
                .map_or(ChecklistItemStatus::NotUploaded, |&(_, status)| status.into());
            ChecklistItem { category, label: category.label().to_string(), status }
        })
        .collect();

    let accepted =
        items.iter().filter(|item| item.status == ChecklistItemStatus::Accepted).count();
    let completion_rate = if required.is_empty() {
        0
    } else {
        ((100 * accepted + required.len() / 2) / required.len()) as u8
    };

    Checklist { service_type, items, completion_rate }
}

#[cfg(test)]
mod tests {
    use crate::domain::document::{DocumentCategory, DocumentStatus};
    use crate::domain::filing::ServiceType;

    use super::{build_checklist, required_categories, ChecklistItemStatus};

    #[test]
    fn individual_filings_require_four_categories() {
        assert_eq!(required_categories(ServiceType::Individual).len(), 4);
        assert_eq!(required_categories(ServiceType::Corporate).len(), 5);
        assert_eq!(required_categories(ServiceType::Nrb).len(), 4);
    }

    #[test]
    fn two_accepted_of_four_scores_fifty() {
        let checklist = build_checklist(
            ServiceType::Individual,
            &[
                (DocumentCategory::NationalId, DocumentStatus::Accepted),
                (DocumentCategory::TinCertificate, DocumentStatus::Accepted),
            ],
        );
        assert_eq!(checklist.completion_rate, 50);
        let not_uploaded = checklist
            .items
            .iter()
            .filter(|item| item.status == ChecklistItemStatus::NotUploaded)
            .count();
        assert_eq!(not_uploaded, 2);
    }

    #[test]
    fn pending_chains_do_not_count_as_accepted() {
        let checklist = build_checklist(
            ServiceType::Individual,
            &[
                (DocumentCategory::NationalId, DocumentStatus::Pending),
                (DocumentCategory::SalaryCertificate, DocumentStatus::Rejected),
            ],
        );
        assert_eq!(checklist.completion_rate, 0);
        assert_eq!(checklist.items[0].status, ChecklistItemStatus::Pending);
    }

    #[test]
    fn unrequired_categories_are_ignored() {
        let checklist = build_checklist(
            ServiceType::Individual,
            &[(DocumentCategory::TradeLicense, DocumentStatus::Accepted)],
        );
        assert_eq!(checklist.completion_rate, 0);
        assert_eq!(checklist.items.len(), 4);
    }
}
