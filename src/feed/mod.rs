//! Feed module for feedrelay.
//!
//! This module provides the feed domain types, the HTTP feed client and
//! the persistence layer for sources, articles and subscriptions.

pub mod client;
pub mod repository;
pub mod types;

pub use client::{parse_feed, validate_url, FeedClient, HttpFeedClient};
pub use repository::{
    ArticleRepository, SourceRepository, SubscriberRepository, SubscriptionRepository,
};
pub use types::{Article, Item, NewArticle, NewSource, Source, Subscriber, MAX_TITLE_LENGTH};
