use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;

/// One immutable audit row: who did what to which entity, with optional
/// before/after snapshots. Appended atomically with the mutation it
/// describes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub actor_user_id: UserId,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor_user_id: UserId,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_user_id,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            old_value: None,
            new_value: None,
            created_at,
        }
    }

    pub fn with_old_value(mut self, value: impl Into<String>) -> Self {
        self.old_value = Some(value.into());
        self
    }

    pub fn with_new_value(mut self, value: impl Into<String>) -> Self {
        self.new_value = Some(value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, record: AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::user::UserId;

    use super::{AuditRecord, AuditSink, InMemoryAuditSink};

    #[test]
    fn sink_preserves_append_order_and_snapshots() {
        let sink = InMemoryAuditSink::default();
        sink.append(
            AuditRecord::new(
                UserId("S-1".to_string()),
                "document.reviewed",
                "document",
                "D-1",
                Utc::now(),
            )
            .with_old_value("pending")
            .with_new_value("accepted"),
        );
        sink.append(AuditRecord::new(
            UserId("S-1".to_string()),
            "filing.status_changed",
            "filing",
            "F-1",
            Utc::now(),
        ));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "document.reviewed");
        assert_eq!(records[0].old_value.as_deref(), Some("pending"));
        assert_eq!(records[0].new_value.as_deref(), Some("accepted"));
        assert_eq!(records[1].entity_type, "filing");
    }
}
