//! Checklist Service
//!
//! Joins the filing's required-category set with the current status of
//! each matching document chain.

use std::sync::Arc;

use taxcase_core::checklist::{build_checklist, Checklist};
use taxcase_core::domain::document::{DocumentCategory, DocumentStatus};
use taxcase_core::domain::filing::FilingId;
use taxcase_core::domain::user::UserId;
use taxcase_core::errors::CoreError;
use taxcase_db::repositories::{DocumentRepository, FilingRepository};

use crate::storage_error;

pub struct ChecklistService {
    filings: Arc<dyn FilingRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl ChecklistService {
    pub fn new(filings: Arc<dyn FilingRepository>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self { filings, documents }
    }

    /// Computes the checklist for a filing. Pass `owner` for customer
    /// calls (a foreign filing reads as missing); staff pass `None`.
    pub async fn compute_checklist(
        &self,
        filing_id: &FilingId,
        owner: Option<&UserId>,
    ) -> Result<Checklist, CoreError> {
        let filing = self
            .filings
            .find_by_id(filing_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| CoreError::not_found("filing", filing_id.0.clone()))?;
        if let Some(owner) = owner {
            if &filing.owner_user_id != owner {
                return Err(CoreError::not_found("filing", filing_id.0.clone()));
            }
        }

        let chains =
            self.documents.current_chains_for_filing(filing_id).await.map_err(storage_error)?;

        // Chains arrive oldest-first; a newer chain in the same category
        // supersedes an older one.
        let mut current: Vec<(DocumentCategory, DocumentStatus)> = Vec::new();
        for chain in &chains {
            match current.iter_mut().find(|(category, _)| *category == chain.category) {
                Some(entry) => entry.1 = chain.status,
                None => current.push((chain.category, chain.status)),
            }
        }

        Ok(build_checklist(filing.service_type, &current))
    }
}
