//! Feed domain types for feedrelay.

use chrono::{DateTime, Utc};

/// Maximum length for an article title.
pub const MAX_TITLE_LENGTH: usize = 1000;

/// A subscribable feed endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Source ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub feed_url: String,
    /// Polling priority (higher first).
    pub priority: i64,
    /// When the source was created.
    pub created_at: DateTime<Utc>,
}

/// New source for creation.
#[derive(Debug, Clone)]
pub struct NewSource {
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub feed_url: String,
    /// Polling priority.
    pub priority: i64,
}

impl NewSource {
    /// Create a new source with default priority.
    pub fn new(name: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feed_url: feed_url.into(),
            priority: 0,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// A single entry parsed from a feed during one fetch.
///
/// Items are never stored directly; see [`NewArticle::from_item`].
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Entry title.
    pub title: String,
    /// Link to the original article.
    pub link: String,
    /// Entry categories.
    pub categories: Vec<String>,
    /// When the entry was published, if the feed says.
    pub published_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Create an item with no categories or publish time.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            categories: Vec::new(),
            published_at: None,
        }
    }

    /// Set the categories.
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Set the published date.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Whether the title or any category contains one of the keywords.
    ///
    /// Matching is case-insensitive. An empty keyword list matches everything.
    pub fn matches_keywords(&self, keywords: &[String]) -> bool {
        if keywords.is_empty() {
            return true;
        }
        let title = self.title.to_lowercase();
        let categories: Vec<String> = self.categories.iter().map(|c| c.to_lowercase()).collect();
        keywords.iter().map(|k| k.to_lowercase()).any(|keyword| {
            title.contains(&keyword) || categories.iter().any(|c| c.contains(&keyword))
        })
    }
}

/// An ingested article.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// Article ID.
    pub id: i64,
    /// Source this article came from.
    pub source_id: i64,
    /// Article title.
    pub title: String,
    /// Link to the original article (unique).
    pub link: String,
    /// Categories.
    pub categories: Vec<String>,
    /// When the article was published.
    pub published_at: DateTime<Utc>,
    /// When the article was selected for delivery, if ever.
    pub posted_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Whether a notify cycle has already selected this article.
    pub fn is_posted(&self) -> bool {
        self.posted_at.is_some()
    }
}

/// Article candidate for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    /// Source ID.
    pub source_id: i64,
    /// Article title.
    pub title: String,
    /// Link (dedup key).
    pub link: String,
    /// Categories.
    pub categories: Vec<String>,
    /// When the article was published.
    pub published_at: DateTime<Utc>,
}

impl NewArticle {
    /// Build an article candidate from a fetched item.
    ///
    /// Items without a publish time are stamped with the current time.
    pub fn from_item(source_id: i64, item: Item) -> Self {
        let title = if item.title.chars().count() > MAX_TITLE_LENGTH {
            item.title.chars().take(MAX_TITLE_LENGTH).collect()
        } else {
            item.title
        };
        Self {
            source_id,
            title,
            link: item.link,
            categories: item.categories,
            published_at: item.published_at.unwrap_or_else(Utc::now),
        }
    }
}

/// A chat identity that can follow sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    /// Chat identity (unique).
    pub chat_id: i64,
    /// Display name.
    pub name: String,
}

impl Subscriber {
    /// Create a new subscriber.
    pub fn new(chat_id: i64, name: impl Into<String>) -> Self {
        Self {
            chat_id,
            name: name.into(),
        }
    }
}
