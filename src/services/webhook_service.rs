/// Fire-and-forget webhook notifications for maintenance outcomes.
///
/// Dispatch happens on a spawned task after the primary work has committed,
/// so a slow or failing receiver can neither delay nor fail the caller.
use serde_json::Value;
use std::time::Duration;

#[derive(Clone)]
pub struct WebhookService {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookService {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client, url }
    }

    /// No-op when no webhook URL is configured.
    pub fn send(&self, event: &str, payload: Value) {
        let Some(url) = self.url.clone() else {
            return;
        };

        let client = self.client.clone();
        let event = event.to_string();
        let body = serde_json::json!({
            "event": event,
            "payload": payload,
            "sent_at": chrono::Utc::now(),
        });

        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("Webhook '{}' delivered", event);
                }
                Ok(response) => {
                    tracing::warn!(
                        "Webhook '{}' rejected with status {}",
                        event,
                        response.status()
                    );
                }
                Err(err) => {
                    tracing::warn!("Webhook '{}' delivery failed: {}", event, err);
                }
            }
        });
    }
}
