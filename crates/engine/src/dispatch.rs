//! Notification dispatcher
//!
//! Consumes committed domain events from the publisher channel and turns
//! them into user notifications. Delivery is best-effort: a sink failure
//! is logged and swallowed, never propagated back into the mutation path.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use taxcase_core::domain::document::DocumentStatus;
use taxcase_core::events::DomainEvent;
use taxcase_core::notify::{Notification, NotificationKind, NotificationSink};

pub struct NotificationDispatcher;

impl NotificationDispatcher {
    pub fn spawn(
        mut receiver: UnboundedReceiver<DomainEvent>,
        sink: Arc<dyn NotificationSink>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                Self::deliver(sink.as_ref(), &event).await;
            }
            tracing::debug!("notification dispatcher stopped");
        })
    }

    pub async fn deliver(sink: &dyn NotificationSink, event: &DomainEvent) {
        for notification in notifications_for(event) {
            if let Err(error) = sink.notify(notification).await {
                tracing::warn!(%error, "notification delivery failed");
            }
        }
    }
}

/// Event-to-notification mapping. Uploads and re-uploads are staff-facing
/// workflow signals and produce no customer notification.
pub fn notifications_for(event: &DomainEvent) -> Vec<Notification> {
    match event {
        DomainEvent::FilingInitiated { filing_id, owner_user_id, assessment_year, .. } => {
            vec![Notification {
                user_id: owner_user_id.clone(),
                kind: NotificationKind::FilingCreated,
                title: "Filing created".to_string(),
                body: format!(
                    "Your tax filing for assessment year {assessment_year} has been opened."
                ),
                link: Some(format!("/filings/{}", filing_id.0)),
            }]
        }
        DomainEvent::FilingStatusChanged { filing_id, owner_user_id, to_status, note, .. } => {
            let mut body = format!("Your filing status is now {}.", to_status.label());
            if let Some(note) = note {
                body.push_str(&format!(" Note: {note}"));
            }
            vec![Notification {
                user_id: owner_user_id.clone(),
                kind: NotificationKind::FilingStatusChanged,
                title: format!("Filing update: {}", to_status.label()),
                body,
                link: Some(format!("/filings/{}", filing_id.0)),
            }]
        }
        DomainEvent::AdvisorAssigned { filing_id, owner_user_id, advisor_user_id } => vec![
            Notification {
                user_id: owner_user_id.clone(),
                kind: NotificationKind::AdvisorAssigned,
                title: "Advisor assigned".to_string(),
                body: "An advisor has been assigned to prepare your filing.".to_string(),
                link: Some(format!("/filings/{}", filing_id.0)),
            },
            Notification {
                user_id: advisor_user_id.clone(),
                kind: NotificationKind::AdvisorAssigned,
                title: "New filing assignment".to_string(),
                body: "A filing has been assigned to you for preparation.".to_string(),
                link: Some(format!("/staff/filings/{}", filing_id.0)),
            },
        ],
        DomainEvent::DocumentUploaded { .. } | DomainEvent::DocumentReuploaded { .. } => {
            Vec::new()
        }
        DomainEvent::DocumentReviewed {
            document_id,
            owner_user_id,
            category,
            outcome,
            rejection_note,
        } => {
            let body = match outcome {
                DocumentStatus::Accepted => {
                    format!("Your {} was accepted.", category.label())
                }
                DocumentStatus::Rejected => format!(
                    "Your {} was rejected: {}. Please upload a corrected copy.",
                    category.label(),
                    rejection_note.as_deref().unwrap_or("no reason given")
                ),
                DocumentStatus::NeedsReupload => format!(
                    "Your {} needs to be uploaded again: {}.",
                    category.label(),
                    rejection_note.as_deref().unwrap_or("no reason given")
                ),
                DocumentStatus::Pending => return Vec::new(),
            };
            vec![Notification {
                user_id: owner_user_id.clone(),
                kind: NotificationKind::DocumentReviewed,
                title: format!("Document review: {}", category.label()),
                body,
                link: Some(format!("/documents/{}", document_id.0)),
            }]
        }
        DomainEvent::AdditionalDocumentRequested { target_user_id, category, note, .. } => {
            vec![Notification {
                user_id: target_user_id.clone(),
                kind: NotificationKind::DocumentRequested,
                title: format!("Document requested: {}", category.label()),
                body: note.clone(),
                link: Some("/documents".to_string()),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use taxcase_core::domain::document::{DocumentCategory, DocumentId, DocumentStatus};
    use taxcase_core::domain::filing::{FilingId, FilingStatus};
    use taxcase_core::domain::user::UserId;
    use taxcase_core::events::{ChannelPublisher, DomainEvent, EventPublisher};
    use taxcase_core::notify::{InMemoryNotificationSink, NotificationKind};

    use super::{notifications_for, NotificationDispatcher};

    #[test]
    fn status_change_notifies_the_owner_with_the_label() {
        let notifications = notifications_for(&DomainEvent::FilingStatusChanged {
            filing_id: FilingId("F-1".to_string()),
            owner_user_id: UserId("U-1".to_string()),
            from_status: FilingStatus::Initiated,
            to_status: FilingStatus::DocumentsReceived,
            note: Some("docs ok".to_string()),
        });

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, UserId("U-1".to_string()));
        assert_eq!(notifications[0].kind, NotificationKind::FilingStatusChanged);
        assert!(notifications[0].body.contains("Documents Received"));
        assert!(notifications[0].body.contains("docs ok"));
    }

    #[test]
    fn advisor_assignment_notifies_both_parties() {
        let notifications = notifications_for(&DomainEvent::AdvisorAssigned {
            filing_id: FilingId("F-1".to_string()),
            owner_user_id: UserId("U-1".to_string()),
            advisor_user_id: UserId("A-1".to_string()),
        });

        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].user_id, UserId("U-1".to_string()));
        assert_eq!(notifications[1].user_id, UserId("A-1".to_string()));
    }

    #[test]
    fn rejection_message_carries_the_note() {
        let notifications = notifications_for(&DomainEvent::DocumentReviewed {
            document_id: DocumentId("D-1".to_string()),
            owner_user_id: UserId("U-1".to_string()),
            category: DocumentCategory::SalaryCertificate,
            outcome: DocumentStatus::Rejected,
            rejection_note: Some("blurry scan, please redo".to_string()),
        });

        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].body.contains("blurry scan, please redo"));
        assert!(notifications[0].body.contains("Salary Certificate"));
    }

    #[test]
    fn uploads_stay_silent() {
        let notifications = notifications_for(&DomainEvent::DocumentUploaded {
            document_id: DocumentId("D-1".to_string()),
            owner_user_id: UserId("U-1".to_string()),
            category: DocumentCategory::BankStatement,
            version: 1,
        });
        assert!(notifications.is_empty());
    }

    #[tokio::test]
    async fn dispatcher_drains_the_channel_into_the_sink() {
        let (publisher, receiver) = ChannelPublisher::new();
        let sink = Arc::new(InMemoryNotificationSink::default());
        let handle = NotificationDispatcher::spawn(receiver, sink.clone());

        publisher.publish(DomainEvent::FilingInitiated {
            filing_id: FilingId("F-1".to_string()),
            owner_user_id: UserId("U-1".to_string()),
            assessment_year: "2025-2026".to_string(),
            service_type: taxcase_core::ServiceType::Individual,
        });
        drop(publisher);

        handle.await.expect("dispatcher exits after channel close");
        assert_eq!(sink.sent().len(), 1);
        assert_eq!(sink.sent()[0].kind, NotificationKind::FilingCreated);
    }
}
