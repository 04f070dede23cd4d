//! Store contracts consumed by the pipelines, and their SQLite implementation.
//!
//! The fetcher and notifier only see these traits; [`Store`] adapts the
//! repositories in [`crate::feed`] to them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::Database;
use crate::feed::{
    Article, ArticleRepository, NewArticle, Source, SourceRepository, Subscriber,
    SubscriberRepository, SubscriptionRepository,
};
use crate::Result;

/// Read access to the list of subscribable sources.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// List all sources, highest priority first.
    async fn list_sources(&self) -> Result<Vec<Source>>;
}

/// Durable set of ingested articles.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert unless the link is already stored. Returns true if a row was created.
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool>;

    /// List every unposted article in store order.
    async fn list_unposted(&self) -> Result<Vec<Article>>;

    /// List unposted articles from the given sources in store order.
    async fn list_unposted_for_sources(&self, source_ids: &[i64]) -> Result<Vec<Article>>;

    /// Mark an article posted. Returns false if it was already posted.
    async fn mark_posted(&self, article_id: i64) -> Result<bool>;
}

/// Subscribers and the sources they follow.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// List all subscribers.
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;

    /// List the sources a subscriber follows.
    async fn list_sources_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Source>>;
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Create a store over an open database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Get the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SourceCatalog for Store {
    async fn list_sources(&self) -> Result<Vec<Source>> {
        SourceRepository::new(self.db.pool()).list_all().await
    }
}

#[async_trait]
impl ArticleStore for Store {
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool> {
        let id = ArticleRepository::new(self.db.pool())
            .insert_if_absent(article)
            .await?;
        Ok(id.is_some())
    }

    async fn list_unposted(&self) -> Result<Vec<Article>> {
        ArticleRepository::new(self.db.pool()).list_unposted().await
    }

    async fn list_unposted_for_sources(&self, source_ids: &[i64]) -> Result<Vec<Article>> {
        ArticleRepository::new(self.db.pool())
            .list_unposted_for_sources(source_ids)
            .await
    }

    async fn mark_posted(&self, article_id: i64) -> Result<bool> {
        ArticleRepository::new(self.db.pool())
            .mark_posted(article_id)
            .await
    }
}

#[async_trait]
impl SubscriberDirectory for Store {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        SubscriberRepository::new(self.db.pool()).list_all().await
    }

    async fn list_sources_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Source>> {
        SubscriptionRepository::new(self.db.pool())
            .list_sources_for_subscriber(subscriber_id)
            .await
    }
}
