pub mod checklist;
pub mod dispatch;
pub mod documents;
pub mod lifecycle;
pub mod review;

pub use checklist::ChecklistService;
pub use dispatch::{notifications_for, NotificationDispatcher};
pub use documents::{DocumentVersionStore, UploadRequest};
pub use lifecycle::{compute_progress, FilingLifecycleManager, FilingProgress, ProgressStep};
pub use review::DocumentReviewPipeline;

use taxcase_core::errors::CoreError;
use taxcase_db::repositories::RepositoryError;

/// Persistence failures that are not a modeled outcome (unique violations
/// and CAS misses are handled at the call sites).
pub(crate) fn storage_error(error: RepositoryError) -> CoreError {
    CoreError::Storage(error.to_string())
}
