//! Fire-and-forget customer/partner notifications.
//!
//! Push and WhatsApp dispatch never block the state machine: deliveries run
//! on detached tasks and failures are logged, not surfaced.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::Arc;

use crate::config::NotifierConfig;

/// One rendered notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait NotifyChannel: Send + Sync {
    async fn deliver(&self, recipient: &str, notification: &Notification) -> anyhow::Result<()>;
    fn name(&self) -> &'static str;
}

/// FCM-style push channel.
pub struct PushChannel {
    client: Client,
    config: NotifierConfig,
}

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
}

#[async_trait]
impl NotifyChannel for PushChannel {
    async fn deliver(&self, recipient: &str, notification: &Notification) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.config.push_endpoint)
            .bearer_auth(self.config.push_api_key.expose_secret())
            .json(&PushMessage {
                to: recipient,
                title: &notification.title,
                body: &notification.body,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("push endpoint returned {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "push"
    }
}

/// WhatsApp template-message channel.
pub struct WhatsAppChannel {
    client: Client,
    config: NotifierConfig,
}

#[derive(Debug, Serialize)]
struct WhatsAppMessage<'a> {
    phone: &'a str,
    template: &'a str,
    body: &'a str,
}

#[async_trait]
impl NotifyChannel for WhatsAppChannel {
    async fn deliver(&self, recipient: &str, notification: &Notification) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.config.whatsapp_endpoint)
            .bearer_auth(self.config.whatsapp_token.expose_secret())
            .json(&WhatsAppMessage {
                phone: recipient,
                template: &notification.title,
                body: &notification.body,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("whatsapp endpoint returned {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "whatsapp"
    }
}

#[derive(Clone)]
pub struct Notifier {
    enabled: bool,
    channels: Arc<Vec<Box<dyn NotifyChannel>>>,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        let client = Client::new();
        let channels: Vec<Box<dyn NotifyChannel>> = vec![
            Box::new(PushChannel {
                client: client.clone(),
                config: config.clone(),
            }),
            Box::new(WhatsAppChannel {
                client,
                config: config.clone(),
            }),
        ];
        Self {
            enabled: config.enabled,
            channels: Arc::new(channels),
        }
    }

    /// Dispatch on a detached task; the caller never waits and never fails.
    pub fn dispatch(&self, recipient: Option<String>, notification: Notification) {
        if !self.enabled {
            tracing::debug!(title = %notification.title, "Notifier disabled; skipping dispatch");
            return;
        }
        let Some(recipient) = recipient else {
            tracing::debug!(title = %notification.title, "No recipient token; skipping dispatch");
            return;
        };

        let channels = Arc::clone(&self.channels);
        tokio::spawn(async move {
            for channel in channels.iter() {
                if let Err(e) = channel.deliver(&recipient, &notification).await {
                    tracing::warn!(
                        channel = channel.name(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        });
    }
}
