use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use mendy_core::notify::{Notifier, NotifyError, StatusNotification};

/// Posts each transition to the notification collaborator's webhook.
/// Delivery is fire-and-forget; callers log failures and move on.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    bearer_token: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, bearer_token: Option<SecretString>) -> Self {
        Self { client: reqwest::Client::new(), webhook_url, bearer_token }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &StatusNotification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.webhook_url).json(notification);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| NotifyError(format!("webhook request failed: {error}")))?;

        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "webhook responded with status {}",
                response.status(),
            )));
        }

        debug!(
            event_name = "notify.webhook_delivered",
            request_id = %notification.request_id.0,
            status = notification.status.as_str(),
            "webhook notification delivered"
        );
        Ok(())
    }
}
