use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::document::{DocumentCategory, DocumentId, DocumentStatus};
use crate::domain::filing::{FilingId, FilingStatus, ServiceType};
use crate::domain::user::UserId;

/// Typed domain events emitted after a primary mutation has committed.
/// The dispatcher turns them into user notifications; the failure domains
/// of "did the state change" and "was anyone told" stay separate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    FilingInitiated {
        filing_id: FilingId,
        owner_user_id: UserId,
        assessment_year: String,
        service_type: ServiceType,
    },
    FilingStatusChanged {
        filing_id: FilingId,
        owner_user_id: UserId,
        from_status: FilingStatus,
        to_status: FilingStatus,
        note: Option<String>,
    },
    AdvisorAssigned {
        filing_id: FilingId,
        owner_user_id: UserId,
        advisor_user_id: UserId,
    },
    DocumentUploaded {
        document_id: DocumentId,
        owner_user_id: UserId,
        category: DocumentCategory,
        version: u32,
    },
    DocumentReuploaded {
        document_id: DocumentId,
        owner_user_id: UserId,
        category: DocumentCategory,
        version: u32,
    },
    DocumentReviewed {
        document_id: DocumentId,
        owner_user_id: UserId,
        category: DocumentCategory,
        outcome: DocumentStatus,
        rejection_note: Option<String>,
    },
    AdditionalDocumentRequested {
        target_user_id: UserId,
        category: DocumentCategory,
        filing_id: Option<FilingId>,
        note: String,
        requested_by: UserId,
    },
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Feeds the dispatcher task. Publishing never blocks the mutating call;
/// a closed channel is logged and the event dropped.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: DomainEvent) {
        if self.sender.send(event).is_err() {
            tracing::warn!("event dropped: dispatcher channel closed");
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl InMemoryPublisher {
    pub fn events(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventPublisher for InMemoryPublisher {
    fn publish(&self, event: DomainEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
