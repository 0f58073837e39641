use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::ActorRole;
use crate::domain::request::{RequestId, RequestStatus};

/// Payload handed to the notification collaborator after each successful
/// transition. Delivery is fire-and-forget: a failed notification is logged
/// and never rolls back the transition it describes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub actor_role: ActorRole,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &StatusNotification) -> Result<(), NotifyError>;
}

/// Default sink: logs the transition and considers it delivered.
#[derive(Clone, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &StatusNotification) -> Result<(), NotifyError> {
        tracing::info!(
            event_name = "lifecycle.status_notified",
            request_id = %notification.request_id.0,
            status = notification.status.as_str(),
            actor_role = notification.actor_role.as_str(),
            "status notification emitted"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    delivered: Arc<Mutex<Vec<StatusNotification>>>,
}

impl InMemoryNotifier {
    pub fn delivered(&self) -> Vec<StatusNotification> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: &StatusNotification) -> Result<(), NotifyError> {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(notification.clone()),
            Err(poisoned) => poisoned.into_inner().push(notification.clone()),
        }
        Ok(())
    }
}
