use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FilingCreated,
    FilingStatusChanged,
    AdvisorAssigned,
    DocumentReviewed,
    DocumentRequested,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilingCreated => "filing_created",
            Self::FilingStatusChanged => "filing_status_changed",
            Self::AdvisorAssigned => "advisor_assigned",
            Self::DocumentReviewed => "document_reviewed",
            Self::DocumentRequested => "document_requested",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery is best-effort: a failed notification is logged by the
/// dispatcher and never reverses the mutation that produced it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, user_id: &UserId) -> Vec<Notification> {
        self.sent().into_iter().filter(|notification| &notification.user_id == user_id).collect()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Logs deliveries instead of sending them; the default sink until a real
/// channel (mail, in-app) is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %notification.user_id.0,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "notification dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::user::UserId;

    use super::{InMemoryNotificationSink, Notification, NotificationKind, NotificationSink};

    #[tokio::test]
    async fn sink_records_deliveries_per_user() {
        let sink = InMemoryNotificationSink::default();
        sink.notify(Notification {
            user_id: UserId("U-1".to_string()),
            kind: NotificationKind::FilingStatusChanged,
            title: "Filing update".to_string(),
            body: "Your filing moved to Documents Received".to_string(),
            link: None,
        })
        .await
        .expect("notify");

        assert_eq!(sink.sent().len(), 1);
        assert_eq!(sink.sent_to(&UserId("U-1".to_string())).len(), 1);
        assert_eq!(sink.sent_to(&UserId("U-2".to_string())).len(), 0);
    }
}
