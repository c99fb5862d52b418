use std::sync::Arc;

use taxcase_engine::{
    ChecklistService, DocumentReviewPipeline, DocumentVersionStore, FilingLifecycleManager,
};

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<FilingLifecycleManager>,
    pub documents: Arc<DocumentVersionStore>,
    pub pipeline: Arc<DocumentReviewPipeline>,
    pub checklist: Arc<ChecklistService>,
}
