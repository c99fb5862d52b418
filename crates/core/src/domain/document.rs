use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::filing::FilingId;
use crate::domain::user::UserId;
use crate::errors::CoreError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// Review state of one document version. Terminal per version; a new
/// version always re-enters `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Accepted,
    Rejected,
    NeedsReupload,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::NeedsReupload => "needs_reupload",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "needs_reupload" => Some(Self::NeedsReupload),
            _ => None,
        }
    }

    /// Only a rejected or reupload-requested chain may receive a new
    /// version.
    pub fn allows_reupload(&self) -> bool {
        matches!(self, Self::Rejected | Self::NeedsReupload)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    NationalId,
    TinCertificate,
    SalaryCertificate,
    BankStatement,
    TradeLicense,
    FinancialStatements,
    PreviousReturn,
    Passport,
    InvestmentProof,
    Other,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NationalId => "national_id",
            Self::TinCertificate => "tin_certificate",
            Self::SalaryCertificate => "salary_certificate",
            Self::BankStatement => "bank_statement",
            Self::TradeLicense => "trade_license",
            Self::FinancialStatements => "financial_statements",
            Self::PreviousReturn => "previous_return",
            Self::Passport => "passport",
            Self::InvestmentProof => "investment_proof",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "national_id" => Some(Self::NationalId),
            "tin_certificate" => Some(Self::TinCertificate),
            "salary_certificate" => Some(Self::SalaryCertificate),
            "bank_statement" => Some(Self::BankStatement),
            "trade_license" => Some(Self::TradeLicense),
            "financial_statements" => Some(Self::FinancialStatements),
            "previous_return" => Some(Self::PreviousReturn),
            "passport" => Some(Self::Passport),
            "investment_proof" => Some(Self::InvestmentProof),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NationalId => "National ID",
            Self::TinCertificate => "TIN Certificate",
            Self::SalaryCertificate => "Salary Certificate",
            Self::BankStatement => "Bank Statement",
            Self::TradeLicense => "Trade License",
            Self::FinancialStatements => "Financial Statements",
            Self::PreviousReturn => "Previous Return",
            Self::Passport => "Passport",
            Self::InvestmentProof => "Investment Proof",
            Self::Other => "Other Document",
        }
    }
}

/// Staff decision on a pending version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Accepted,
    Rejected,
    NeedsReupload,
}

pub const MIN_REJECTION_NOTE_CHARS: usize = 10;

impl ReviewOutcome {
    pub fn to_status(self) -> DocumentStatus {
        match self {
            Self::Accepted => DocumentStatus::Accepted,
            Self::Rejected => DocumentStatus::Rejected,
            Self::NeedsReupload => DocumentStatus::NeedsReupload,
        }
    }

    pub fn requires_note(self) -> bool {
        matches!(self, Self::Rejected | Self::NeedsReupload)
    }

    /// Rejections and reupload requests must explain themselves to the
    /// customer.
    pub fn validate_note(self, note: Option<&str>) -> Result<(), CoreError> {
        if !self.requires_note() {
            return Ok(());
        }
        match note {
            Some(note) if note.trim().chars().count() >= MIN_REJECTION_NOTE_CHARS => Ok(()),
            _ => Err(CoreError::bad_request(format!(
                "a rejection note of at least {MIN_REJECTION_NOTE_CHARS} characters is required"
            ))),
        }
    }
}

/// Upload limits enforced at the transport boundary and re-validated here;
/// the core never trusts the caller to have checked.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub max_file_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/jpg".to_string(),
                "image/png".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
            ],
        }
    }
}

impl UploadPolicy {
    pub fn validate(&self, mime_type: &str, size_bytes: u64) -> Result<(), CoreError> {
        if size_bytes == 0 {
            return Err(CoreError::bad_request("uploaded file is empty"));
        }
        if size_bytes > self.max_file_bytes {
            return Err(CoreError::bad_request(format!(
                "file exceeds the {} byte upload limit",
                self.max_file_bytes
            )));
        }
        let mime_key = mime_type.trim().to_ascii_lowercase();
        if !self.allowed_mime_types.iter().any(|allowed| allowed == &mime_key) {
            return Err(CoreError::bad_request(format!("unsupported file type `{mime_type}`")));
        }
        Ok(())
    }
}

/// One uploaded file version. Versions of logically the same document share
/// a `chain_root_id`, stamped explicitly at creation; on version 1 it equals
/// the document's own id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_user_id: UserId,
    pub filing_id: Option<FilingId>,
    pub category: DocumentCategory,
    pub file_name: String,
    pub storage_key: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub version: u32,
    pub chain_root_id: DocumentId,
    pub rejection_note: Option<String>,
    pub reviewed_by_user_id: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Version 1 of a new chain.
    #[allow(clippy::too_many_arguments)]
    pub fn new_root(
        owner_user_id: UserId,
        filing_id: Option<FilingId>,
        category: DocumentCategory,
        file_name: impl Into<String>,
        storage_key: impl Into<String>,
        file_size_bytes: u64,
        mime_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let id = DocumentId(Uuid::new_v4().to_string());
        Self {
            id: id.clone(),
            owner_user_id,
            filing_id,
            category,
            file_name: file_name.into(),
            storage_key: storage_key.into(),
            file_size_bytes,
            mime_type: mime_type.into(),
            status: DocumentStatus::Pending,
            version: 1,
            chain_root_id: id,
            rejection_note: None,
            reviewed_by_user_id: None,
            reviewed_at: None,
            deleted_at: None,
            created_at,
        }
    }

    /// The next version in this document's chain, re-entering review.
    pub fn next_version(
        &self,
        storage_key: impl Into<String>,
        file_size_bytes: u64,
        mime_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DocumentId(Uuid::new_v4().to_string()),
            owner_user_id: self.owner_user_id.clone(),
            filing_id: self.filing_id.clone(),
            category: self.category,
            file_name: self.file_name.clone(),
            storage_key: storage_key.into(),
            file_size_bytes,
            mime_type: mime_type.into(),
            status: DocumentStatus::Pending,
            version: self.version + 1,
            chain_root_id: self.chain_root_id.clone(),
            rejection_note: None,
            reviewed_by_user_id: None,
            reviewed_at: None,
            deleted_at: None,
            created_at,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
