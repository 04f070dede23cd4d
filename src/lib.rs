//! feedrelay - Feed relay
//!
//! Polls syndication feeds on a schedule, stores new entries as articles and
//! delivers unposted articles to the chat subscribers following each source.

pub mod config;
pub mod datetime;
pub mod db;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod logging;
pub mod pipeline;
pub mod seed;
pub mod shutdown;
pub mod store;

pub use config::Config;
pub use db::{Database, DbPool};
pub use delivery::{format_article_message, DeliveryChannel, LogChannel, TelegramChannel};
pub use error::{RelayError, Result};
pub use feed::{
    Article, FeedClient, HttpFeedClient, Item, NewArticle, NewSource, Source, Subscriber,
};
pub use pipeline::{CycleAggregateError, Fetcher, Notifier, PipelineError};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use store::{ArticleStore, SourceCatalog, Store, SubscriberDirectory};
