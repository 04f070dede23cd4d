//! Repositories for sources, articles, subscribers and subscriptions.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;

use super::types::{Article, NewArticle, NewSource, Source, Subscriber};
use crate::datetime::{parse_datetime, to_db_string};
use crate::db::DbPool;
use crate::{RelayError, Result};

/// Row type for a source from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SourceRow {
    id: i64,
    name: String,
    feed_url: String,
    priority: i64,
    created_at: String,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Source {
            id: row.id,
            name: row.name,
            feed_url: row.feed_url,
            priority: row.priority,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for an article from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    source_id: i64,
    title: String,
    link: String,
    categories: String,
    published_at: String,
    posted_at: Option<String>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        let published_at = parse_datetime(&row.published_at).unwrap_or_else(|| {
            warn!(
                "Article {} has unparseable published_at {:?}, using current time",
                row.id, row.published_at
            );
            Utc::now()
        });
        Article {
            id: row.id,
            source_id: row.source_id,
            title: row.title,
            link: row.link,
            categories: serde_json::from_str(&row.categories).unwrap_or_default(),
            published_at,
            posted_at: row.posted_at.and_then(|s| parse_datetime(&s)),
        }
    }
}

/// Row type for a subscriber from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SubscriberRow {
    chat_id: i64,
    name: String,
}

impl From<SubscriberRow> for Subscriber {
    fn from(row: SubscriberRow) -> Self {
        Subscriber {
            chat_id: row.chat_id,
            name: row.name,
        }
    }
}

const SOURCE_COLUMNS: &str = "id, name, feed_url, priority, created_at";
const ARTICLE_COLUMNS: &str =
    "id, source_id, title, link, categories, published_at, posted_at";

/// Repository for the source catalog.
pub struct SourceRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SourceRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new source.
    pub async fn create(&self, source: &NewSource) -> Result<Source> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sources (name, feed_url, priority, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&source.name)
        .bind(&source.feed_url)
        .bind(source.priority)
        .bind(to_db_string(&Utc::now()))
        .fetch_one(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| RelayError::NotFound("source".into()))
    }

    /// Get a source by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Source>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Source::from))
    }

    /// Get a source by feed URL.
    pub async fn get_by_url(&self, feed_url: &str) -> Result<Option<Source>> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE feed_url = $1"
        ))
        .bind(feed_url)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Source::from))
    }

    /// List all sources, highest priority first.
    pub async fn list_all(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources ORDER BY priority DESC, id ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Source::from).collect())
    }
}

/// Repository for the article store.
pub struct ArticleRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ArticleRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert an article unless one with the same link already exists.
    ///
    /// Returns the new ID, or `None` if the link was already stored.
    pub async fn insert_if_absent(&self, article: &NewArticle) -> Result<Option<i64>> {
        let categories = serde_json::to_string(&article.categories)
            .map_err(|e| RelayError::Validation(format!("invalid categories: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO articles (source_id, title, link, categories, published_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (link) DO NOTHING
            "#,
        )
        .bind(article.source_id)
        .bind(&article.title)
        .bind(&article.link)
        .bind(categories)
        .bind(to_db_string(&article.published_at))
        .execute(self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(Some(result.last_insert_rowid()))
        } else {
            Ok(None)
        }
    }

    /// Get an article by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Article::from))
    }

    /// Get an article by link.
    pub async fn get_by_link(&self, link: &str) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE link = $1"
        ))
        .bind(link)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Article::from))
    }

    /// List unposted articles, oldest first.
    pub async fn list_unposted(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE posted_at IS NULL
             ORDER BY published_at ASC, id ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// List unposted articles from the given sources, oldest first.
    pub async fn list_unposted_for_sources(&self, source_ids: &[i64]) -> Result<Vec<Article>> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE posted_at IS NULL AND source_id IN ("
        ));
        let mut ids = query.separated(", ");
        for id in source_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY published_at ASC, id ASC");

        let rows = query
            .build_query_as::<ArticleRow>()
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Set `posted_at` on an article that has not been posted yet.
    ///
    /// Returns false if the article does not exist or was already posted;
    /// an existing timestamp is never overwritten.
    pub async fn mark_posted(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE articles SET posted_at = $1 WHERE id = $2 AND posted_at IS NULL",
        )
        .bind(to_db_string(&Utc::now()))
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all articles.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

/// Repository for subscribers.
pub struct SubscriberRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SubscriberRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Register a subscriber, updating the display name if already known.
    pub async fn upsert(&self, subscriber: &Subscriber) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, name) VALUES ($1, $2)
            ON CONFLICT (chat_id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(subscriber.chat_id)
        .bind(&subscriber.name)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Get a subscriber by chat ID.
    pub async fn get_by_id(&self, chat_id: i64) -> Result<Option<Subscriber>> {
        let row = sqlx::query_as::<_, SubscriberRow>(
            "SELECT chat_id, name FROM subscribers WHERE chat_id = $1",
        )
        .bind(chat_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Subscriber::from))
    }

    /// List all subscribers.
    pub async fn list_all(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query_as::<_, SubscriberRow>(
            "SELECT chat_id, name FROM subscribers ORDER BY chat_id ASC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscriber::from).collect())
    }
}

/// Repository for the subscriber/source relation.
pub struct SubscriptionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Follow a source. Returns false if the subscription already existed.
    pub async fn subscribe(&self, subscriber_id: i64, source_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (subscriber_id, source_id) VALUES ($1, $2)
            ON CONFLICT (subscriber_id, source_id) DO NOTHING
            "#,
        )
        .bind(subscriber_id)
        .bind(source_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stop following a source. Returns false if there was no subscription.
    pub async fn unsubscribe(&self, subscriber_id: i64, source_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = $1 AND source_id = $2")
                .bind(subscriber_id)
                .bind(source_id)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List the sources a subscriber follows.
    pub async fn list_sources_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Source>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT s.id, s.name, s.feed_url, s.priority, s.created_at
            FROM sources s
            JOIN subscriptions sub ON sub.source_id = s.id
            WHERE sub.subscriber_id = $1
            ORDER BY s.priority DESC, s.id ASC
            "#,
        )
        .bind(subscriber_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Source::from).collect())
    }
}
