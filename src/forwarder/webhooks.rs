//! Webhook notification handling.

use std::sync::Arc;

use crate::config::WebhookEvent;
use crate::types::{Event, ProgressSnapshot, WebhookPayload};

use super::ChatForwarder;

impl ChatForwarder {
    /// Trigger webhooks for task events
    ///
    /// Sends an HTTP POST to every configured webhook subscribed to the event.
    /// Delivery runs in a spawned task (fire and forget) so the task loop never
    /// waits on a slow endpoint; failures are reported as `WebhookFailed` events.
    pub(crate) fn trigger_webhooks(
        &self,
        event_type: WebhookEvent,
        snapshot: &ProgressSnapshot,
        error: Option<String>,
    ) {
        let matching_webhooks: Vec<_> = self
            .config
            .notifications
            .webhooks
            .iter()
            .filter(|w| w.events.contains(&event_type))
            .cloned()
            .collect();

        if matching_webhooks.is_empty() {
            return;
        }

        let event_str: &'static str = match event_type {
            WebhookEvent::OnStarted => "started",
            WebhookEvent::OnCompleted => "completed",
            WebhookEvent::OnCancelled => "cancelled",
            WebhookEvent::OnFailed => "failed",
        };

        let payload = Arc::new(WebhookPayload {
            event: event_str.to_string(),
            task_id: snapshot.task_id.clone(),
            user_id: snapshot.user_id,
            source: snapshot.source.to_string(),
            destination: snapshot.destination.to_string(),
            status: snapshot.status,
            dispatched: snapshot.dispatched,
            fetched: snapshot.fetched,
            error,
            timestamp: chrono::Utc::now().timestamp(),
        });
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let client = reqwest::Client::new();

            for webhook in matching_webhooks {
                let mut request = client
                    .post(&webhook.url)
                    .json(payload.as_ref())
                    .timeout(webhook.timeout);

                if let Some(auth) = &webhook.auth_header {
                    request = request.header("Authorization", auth);
                }

                let url = webhook.url;
                let timeout = webhook.timeout;
                let error_msg = match tokio::time::timeout(timeout, request.send()).await {
                    Ok(Ok(response)) if response.status().is_success() => {
                        tracing::debug!(url = %url, event = event_str, "webhook sent successfully");
                        continue;
                    }
                    Ok(Ok(response)) => format!(
                        "Webhook returned status {}: {}",
                        response.status(),
                        response.text().await.unwrap_or_default()
                    ),
                    Ok(Err(e)) => format!("Failed to send webhook: {}", e),
                    Err(_) => format!("Webhook timed out after {:?}", timeout),
                };

                tracing::warn!(url = %url, error = %error_msg, "webhook failed");
                event_tx
                    .send(Event::WebhookFailed {
                        url,
                        error: error_msg,
                    })
                    .ok();
            }
        });
    }
}
