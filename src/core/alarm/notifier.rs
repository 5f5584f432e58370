// src/core/alarm/notifier.rs

//! Channel dispatch. The external notification backends are pure sinks:
//! one call delivers a text payload to a destination and reports success.
//! Failures are logged by the engine and never retried.

use super::{ChannelType, NotificationChannel};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `body` to the channel's destination. Returns delivery success.
    async fn send(&self, channel: &NotificationChannel, subject: &str, body: &str) -> bool;
}

/// The default notifier. Webhook-style channels (WEBHOOK, SLACK) are posted
/// over HTTP; the queue-backed backends (EMAIL, PAGERDUTY, OPSGENIE) hand
/// off to their external senders, which here means logging the handoff.
pub struct DefaultNotifier {
    http: reqwest::Client,
}

impl Default for DefaultNotifier {
    fn default() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("notifier http client"),
        }
    }
}

impl DefaultNotifier {
    pub fn new() -> Self {
        Default::default()
    }

    async fn post_json(&self, url: &str, subject: &str, body: &str) -> bool {
        let payload = json!({ "subject": subject, "text": body });
        match self.http.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    "Notification POST to {} returned status {}.",
                    url,
                    response.status()
                );
                false
            }
            Err(e) => {
                warn!("Notification POST to {} failed: {}", url, e);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for DefaultNotifier {
    async fn send(&self, channel: &NotificationChannel, subject: &str, body: &str) -> bool {
        match channel.channel_type {
            ChannelType::Webhook | ChannelType::Slack => {
                self.post_json(&channel.destination, subject, body).await
            }
            ChannelType::Email | ChannelType::Pagerduty | ChannelType::Opsgenie => {
                info!(
                    "Dispatching {:?} notification to '{}': {}",
                    channel.channel_type, channel.destination, subject
                );
                true
            }
        }
    }
}
