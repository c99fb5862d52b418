pub mod audit;
pub mod checklist;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod notify;
pub mod storage;

pub use audit::{AuditRecord, AuditSink, InMemoryAuditSink};
pub use checklist::{
    build_checklist, required_categories, Checklist, ChecklistItem, ChecklistItemStatus,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::document::{
    Document, DocumentCategory, DocumentId, DocumentStatus, ReviewOutcome, UploadPolicy,
    MIN_REJECTION_NOTE_CHARS,
};
pub use domain::filing::{
    validate_assessment_year, Filing, FilingId, FilingStatus, FilingStatusLogEntry,
    FilingStatusLogId, FinancialUpdate, ServiceType,
};
pub use domain::user::{
    InMemoryStaffDirectory, StaffDirectory, UserId, UserProfile, UserRole,
};
pub use errors::{CoreError, ErrorKind};
pub use events::{ChannelPublisher, DomainEvent, EventPublisher, InMemoryPublisher};
pub use notify::{
    InMemoryNotificationSink, Notification, NotificationKind, NotificationSink, NotifyError,
    TracingNotificationSink,
};
pub use storage::{storage_key, InMemoryUploadStore, StorageError, StoredObject, UploadStore};

pub use chrono;
