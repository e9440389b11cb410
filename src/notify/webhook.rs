//! Webhook notifier
//!
//! Posts Discord-compatible embeds. Any endpoint that accepts the same
//! JSON body works (Discord, Slack-compatible relays, self-hosted hooks).
//!
//! Usage:
//!   Set NOTIFY_WEBHOOK_URL to enable

use super::Notifier;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct WebhookMessage {
    content: Option<String>,
    embeds: Vec<WebhookEmbed>,
}

#[derive(Serialize)]
struct WebhookEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

/// Red for rugs, orange for whale transfers, green for everything else
fn embed_color(title: &str) -> u32 {
    let lower = title.to_lowercase();
    if lower.contains("rug") {
        0xFF0000
    } else if lower.contains("transfer") {
        0xFFA500
    } else {
        0x00FF00
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, title: &str, message: &str) -> Result<()> {
        let body = WebhookMessage {
            content: None,
            embeds: vec![WebhookEmbed {
                title: title.to_string(),
                description: message.to_string(),
                color: embed_color(title),
                timestamp: chrono::Utc::now().to_rfc3339(),
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("webhook request failed")?;

        if !response.status().is_success() {
            bail!("webhook returned {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_colors() {
        assert_eq!(embed_color("Rug detected"), 0xFF0000);
        assert_eq!(embed_color("Large native transfer"), 0xFFA500);
        assert_eq!(embed_color("Buy executed"), 0x00FF00);
    }

    #[test]
    fn test_body_shape() {
        let body = WebhookMessage {
            content: None,
            embeds: vec![WebhookEmbed {
                title: "t".into(),
                description: "d".into(),
                color: 1,
                timestamp: "now".into(),
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["embeds"][0]["title"], "t");
        assert!(json["content"].is_null());
    }
}
