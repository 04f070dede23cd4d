//! Delivery channels for notifying subscribers.

pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::TelegramConfig;
use crate::datetime::{format_utc_datetime, DISPLAY_FORMAT};
use crate::feed::Article;
use crate::Result;

pub use telegram::TelegramChannel;

/// One-way message sink addressed by subscriber chat ID.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send `message` to the subscriber.
    async fn send(&self, subscriber_id: i64, message: &str) -> Result<()>;
}

/// Format the notification text for an article.
pub fn format_article_message(article: &Article, timezone: &str) -> String {
    format!(
        "{}\n{}\nPublished: {}",
        article.title,
        article.link,
        format_utc_datetime(&article.published_at, timezone, DISPLAY_FORMAT)
    )
}

/// Channel that only logs messages. Used for dry runs.
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    async fn send(&self, subscriber_id: i64, message: &str) -> Result<()> {
        info!(subscriber_id, "[dry run] {}", message.replace('\n', " | "));
        Ok(())
    }
}

/// Build the channel selected by the configuration.
pub fn from_config(config: &TelegramConfig) -> Result<Arc<dyn DeliveryChannel>> {
    if config.dry_run {
        Ok(Arc::new(LogChannel))
    } else {
        Ok(Arc::new(TelegramChannel::new(config)?))
    }
}
