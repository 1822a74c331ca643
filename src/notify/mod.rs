pub mod discord;
pub mod dispatch;
pub mod format;

pub use discord::DiscordChannel;
pub use dispatch::{BatchPolicy, DispatchResult, Dispatcher, RetryPolicy};
pub use format::Formatter;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// One logical alert to deliver. The optional image rides along as an
/// embed on channels that support image+caption mode (entry alerts only).
#[derive(Debug, Clone)]
pub struct Message {
    pub content: String,
    pub image_url: Option<String>,
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            image_url: None,
        }
    }

    pub fn with_image(content: impl Into<String>, image_url: impl Into<String>) -> Self {
        let url = image_url.into();
        Self {
            content: content.into(),
            image_url: if url.is_empty() { None } else { Some(url) },
        }
    }

    pub fn to_discord_payload(&self) -> Value {
        match &self.image_url {
            Some(url) => json!({
                "content": self.content,
                "embeds": [{ "image": { "url": url } }],
            }),
            None => json!({ "content": self.content }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Client error other than rate limiting; retrying cannot help.
    #[error("channel returned terminal status {status}")]
    Terminal { status: u16 },

    #[error("channel returned retryable status {status}")]
    Retryable { status: u16 },

    #[error("channel rate limited")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ChannelError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ChannelError::Terminal { .. })
    }
}

/// An outbound messaging destination. Implementations surface delivery
/// semantics through `ChannelError`; the dispatcher owns retry policy.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &Message) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_includes_embed_only_with_image() {
        let plain = Message::text("hello").to_discord_payload();
        assert!(plain.get("embeds").is_none());

        let with_image =
            Message::with_image("hello", "https://example.com/buy.png").to_discord_payload();
        assert_eq!(
            with_image["embeds"][0]["image"]["url"],
            "https://example.com/buy.png"
        );

        let empty_url = Message::with_image("hello", "").to_discord_payload();
        assert!(empty_url.get("embeds").is_none());
    }

    #[test]
    fn terminal_errors_are_not_retryable() {
        assert!(!ChannelError::Terminal { status: 404 }.is_retryable());
        assert!(ChannelError::Retryable { status: 500 }.is_retryable());
        assert!(ChannelError::RateLimited.is_retryable());
    }
}
