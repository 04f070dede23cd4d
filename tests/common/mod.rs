//! Test helpers for pipeline integration tests.
//!
//! Provides in-memory and file-backed stores, a scripted feed client, a
//! recording delivery channel, and store wrappers that fail on demand.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use feedrelay::feed::{
    ArticleRepository, SourceRepository, SubscriberRepository, SubscriptionRepository,
};
use feedrelay::{
    Article, ArticleStore, Database, DeliveryChannel, FeedClient, Item, NewArticle, NewSource,
    RelayError, Result, Source, Store, Subscriber, SubscriberDirectory,
};
use tempfile::TempDir;

/// Fixed base time for published dates.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

/// Open a fresh in-memory store.
pub async fn setup_store() -> Arc<Store> {
    let db = Database::open_in_memory().await.unwrap();
    Arc::new(Store::new(Arc::new(db)))
}

/// Open a fresh store backed by a WAL database file.
///
/// Unlike [`setup_store`] this has a multi-connection pool, so concurrent
/// writers really race. Keep the returned directory alive for the test.
pub async fn setup_file_store() -> (TempDir, Arc<Store>) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("feedrelay.db")).await.unwrap();
    (dir, Arc::new(Store::new(Arc::new(db))))
}

/// Create a source named `name` with a feed URL derived from it.
pub async fn create_source(store: &Store, name: &str) -> Source {
    SourceRepository::new(store.database().pool())
        .create(&NewSource::new(name, feed_url(name)))
        .await
        .unwrap()
}

/// Feed URL used for a source created by [`create_source`].
pub fn feed_url(name: &str) -> String {
    format!("https://feeds.example.com/{}.xml", name.to_lowercase())
}

/// Register a subscriber following the given sources.
pub async fn add_subscriber(store: &Store, chat_id: i64, source_ids: &[i64]) {
    let pool = store.database().pool();
    SubscriberRepository::new(pool)
        .upsert(&Subscriber::new(chat_id, format!("user{chat_id}")))
        .await
        .unwrap();
    for source_id in source_ids {
        SubscriptionRepository::new(pool)
            .subscribe(chat_id, *source_id)
            .await
            .unwrap();
    }
}

/// Insert an article published `minutes` after [`base_time`].
pub async fn add_article(store: &Store, source_id: i64, link: &str, minutes: i64) -> i64 {
    let item = Item::new(format!("Article {link}"), link)
        .with_categories(["news"])
        .with_published_at(base_time() + chrono::Duration::minutes(minutes));
    ArticleRepository::new(store.database().pool())
        .insert_if_absent(&NewArticle::from_item(source_id, item))
        .await
        .unwrap()
        .unwrap()
}

/// Build `n` items with distinct links under `prefix`.
pub fn items(prefix: &str, n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            Item::new(
                format!("{prefix} item {i}"),
                format!("https://example.com/{prefix}/{i}"),
            )
            .with_published_at(base_time() + chrono::Duration::minutes(i as i64))
        })
        .collect()
}

/// Feed client answering from a fixed table of URLs.
///
/// URLs not in the table fail with a feed error.
#[derive(Default)]
pub struct ScriptedFeedClient {
    feeds: Mutex<HashMap<String, Vec<Item>>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFeedClient {
    /// Create an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `items` for `url`.
    pub fn serve(&self, url: impl Into<String>, items: Vec<Item>) {
        self.feeds.lock().unwrap().insert(url.into(), items);
    }

    /// Make fetches of `url` fail.
    pub fn fail(&self, url: impl Into<String>) {
        self.failing.lock().unwrap().insert(url.into());
    }

    /// URLs fetched so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedClient for ScriptedFeedClient {
    async fn fetch(&self, url: &str) -> Result<Vec<Item>> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(url) {
            return Err(RelayError::Feed("HTTP error: 503 Service Unavailable".to_string()));
        }
        self.feeds
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RelayError::Feed("HTTP error: 404 Not Found".to_string()))
    }
}

/// Delivery channel that records messages and can fail chosen subscribers.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(i64, String)>>,
    failing: Mutex<HashSet<i64>>,
    delay: Option<Duration>,
}

impl RecordingChannel {
    /// Create a channel that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every send.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make sends to `subscriber_id` fail.
    pub fn fail_for(&self, subscriber_id: i64) {
        self.failing.lock().unwrap().insert(subscriber_id);
    }

    /// Messages successfully sent, in send order.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent to one subscriber.
    pub fn sent_to(&self, subscriber_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == subscriber_id)
            .map(|(_, message)| message)
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, subscriber_id: i64, message: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&subscriber_id) {
            return Err(RelayError::Delivery("Forbidden: bot was blocked by the user".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscriber_id, message.to_string()));
        Ok(())
    }
}

/// Subscriber directory that fails source lookups for chosen subscribers.
pub struct FaultyDirectory {
    inner: Arc<Store>,
    failing: Mutex<HashSet<i64>>,
}

impl FaultyDirectory {
    /// Wrap `inner`, passing every call through until told to fail.
    pub fn new(inner: Arc<Store>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make source lookups for `subscriber_id` fail.
    pub fn fail_for(&self, subscriber_id: i64) {
        self.failing.lock().unwrap().insert(subscriber_id);
    }
}

#[async_trait]
impl SubscriberDirectory for FaultyDirectory {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        self.inner.list_subscribers().await
    }

    async fn list_sources_for_subscriber(&self, subscriber_id: i64) -> Result<Vec<Source>> {
        if self.failing.lock().unwrap().contains(&subscriber_id) {
            return Err(RelayError::Database("boom".to_string()));
        }
        self.inner.list_sources_for_subscriber(subscriber_id).await
    }
}

/// Article store that fails inserts of chosen links or every mark.
pub struct FaultyArticleStore {
    inner: Arc<Store>,
    failing_links: Mutex<HashSet<String>>,
    fail_marks: AtomicBool,
}

impl FaultyArticleStore {
    /// Wrap `inner`, passing every call through until told to fail.
    pub fn new(inner: Arc<Store>) -> Self {
        Self {
            inner,
            failing_links: Mutex::new(HashSet::new()),
            fail_marks: AtomicBool::new(false),
        }
    }

    /// Make inserts of `link` fail.
    pub fn fail_insert(&self, link: impl Into<String>) {
        self.failing_links.lock().unwrap().insert(link.into());
    }

    /// Make every `mark_posted` fail.
    pub fn fail_marks(&self) {
        self.fail_marks.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArticleStore for FaultyArticleStore {
    async fn insert_if_absent(&self, article: &NewArticle) -> Result<bool> {
        if self.failing_links.lock().unwrap().contains(&article.link) {
            return Err(RelayError::Database("disk I/O error".to_string()));
        }
        self.inner.insert_if_absent(article).await
    }

    async fn list_unposted(&self) -> Result<Vec<Article>> {
        self.inner.list_unposted().await
    }

    async fn list_unposted_for_sources(&self, source_ids: &[i64]) -> Result<Vec<Article>> {
        self.inner.list_unposted_for_sources(source_ids).await
    }

    async fn mark_posted(&self, article_id: i64) -> Result<bool> {
        if self.fail_marks.load(Ordering::SeqCst) {
            return Err(RelayError::Database("locked".to_string()));
        }
        self.inner.mark_posted(article_id).await
    }
}
