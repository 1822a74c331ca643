use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::notify::{Channel, ChannelError, Message};

/// Discord webhook sink. Status mapping: 2xx delivered, 429 retryable
/// (rate limit), other 4xx terminal, 5xx and transport errors retryable.
pub struct DiscordChannel {
    name: String,
    webhook_url: String,
    client: Client,
}

impl DiscordChannel {
    pub fn new(name: impl Into<String>, webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build webhook http client")?;
        Ok(Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            client,
        })
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &Message) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&message.to_discord_payload())
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 429 {
            return Err(ChannelError::RateLimited);
        }
        if status.is_client_error() {
            return Err(ChannelError::Terminal {
                status: status.as_u16(),
            });
        }
        Err(ChannelError::Retryable {
            status: status.as_u16(),
        })
    }
}
