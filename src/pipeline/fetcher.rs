//! Fetch pipeline.
//!
//! Each cycle polls every cataloged source concurrently and stores new
//! entries as articles, deduplicated by link.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{run_loop, CycleAggregateError, PipelineError, MIN_CYCLE_INTERVAL};
use crate::config::FetcherConfig;
use crate::feed::{FeedClient, NewArticle, Source};
use crate::shutdown::Shutdown;
use crate::store::{ArticleStore, SourceCatalog};

/// Default interval between fetch cycles in seconds.
pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 60;

/// Default cap on items considered per feed per cycle.
pub const DEFAULT_MAX_ITEMS_PER_FEED: usize = 100;

/// Feed fetcher.
pub struct Fetcher {
    catalog: Arc<dyn SourceCatalog>,
    articles: Arc<dyn ArticleStore>,
    client: Arc<dyn FeedClient>,
    interval: Duration,
    max_items_per_feed: usize,
    filter_keywords: Arc<Vec<String>>,
    shutdown: Shutdown,
}

/// What one per-source task did.
#[derive(Debug, Default)]
struct SourceOutcome {
    inserted: usize,
    errors: Vec<PipelineError>,
}

impl Fetcher {
    /// Create a fetcher with default settings.
    pub fn new(
        catalog: Arc<dyn SourceCatalog>,
        articles: Arc<dyn ArticleStore>,
        client: Arc<dyn FeedClient>,
    ) -> Self {
        Self {
            catalog,
            articles,
            client,
            interval: Duration::from_secs(DEFAULT_FETCH_INTERVAL_SECS),
            max_items_per_feed: DEFAULT_MAX_ITEMS_PER_FEED,
            filter_keywords: Arc::new(Vec::new()),
            shutdown: Shutdown::never(),
        }
    }

    /// Apply the `[fetcher]` settings.
    pub fn with_config(self, config: &FetcherConfig) -> Self {
        self.with_interval(Duration::from_secs(config.interval_secs))
            .with_max_items_per_feed(config.max_items_per_feed)
            .with_filter_keywords(config.filter_keywords.clone())
    }

    /// Set the interval between cycles, at least [`MIN_CYCLE_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_CYCLE_INTERVAL);
        self
    }

    /// Set the per-feed item cap.
    pub fn with_max_items_per_feed(mut self, max: usize) -> Self {
        self.max_items_per_feed = max;
        self
    }

    /// Only store items matching one of these keywords. Empty keeps everything.
    pub fn with_filter_keywords(mut self, keywords: Vec<String>) -> Self {
        self.filter_keywords = Arc::new(keywords);
        self
    }

    /// Stop early when this signal fires.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Get the interval between cycles.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until shutdown.
    pub async fn run(&self) {
        run_loop("fetcher", self.interval, self.shutdown.clone(), move || {
            self.run_cycle()
        })
        .await;
    }

    /// Run one fetch cycle over every source.
    ///
    /// Returns once every per-source task has finished. A failing source
    /// never stops the others; all failures come back in the aggregate.
    pub async fn run_cycle(&self) -> Result<(), CycleAggregateError> {
        let sources = match self.catalog.list_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!("Failed to list sources: {}", e);
                return CycleAggregateError::check(
                    "fetcher",
                    vec![PipelineError::Persistence {
                        context: "list sources".to_string(),
                        error: e,
                    }],
                );
            }
        };

        if sources.is_empty() {
            debug!("No sources to fetch");
            return Ok(());
        }

        let source_count = sources.len();
        debug!("Fetching {} source(s)", source_count);

        let mut tasks = JoinSet::new();
        for source in sources {
            let client = Arc::clone(&self.client);
            let articles = Arc::clone(&self.articles);
            let keywords = Arc::clone(&self.filter_keywords);
            let max_items = self.max_items_per_feed;
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move {
                fetch_source(source, client, articles, keywords, max_items, shutdown).await
            });
        }

        let mut inserted = 0;
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    inserted += outcome.inserted;
                    errors.extend(outcome.errors);
                }
                Err(e) => {
                    error!("Fetch task failed: {}", e);
                    errors.push(PipelineError::Task(e.to_string()));
                }
            }
        }

        info!(
            "Fetch cycle complete: {} source(s), {} new article(s), {} error(s)",
            source_count,
            inserted,
            errors.len()
        );

        CycleAggregateError::check("fetcher", errors)
    }
}

/// Fetch one source and store its new items.
async fn fetch_source(
    source: Source,
    client: Arc<dyn FeedClient>,
    articles: Arc<dyn ArticleStore>,
    keywords: Arc<Vec<String>>,
    max_items: usize,
    mut shutdown: Shutdown,
) -> SourceOutcome {
    let mut outcome = SourceOutcome::default();

    let fetched = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            debug!("Fetch of source {} cancelled", source.id);
            return outcome;
        }
        result = client.fetch(&source.feed_url) => result,
    };

    let items = match fetched {
        Ok(items) => items,
        Err(e) => {
            warn!("Failed to fetch source {} ({}): {}", source.id, source.feed_url, e);
            outcome.errors.push(PipelineError::Fetch {
                source_id: source.id,
                url: source.feed_url,
                error: e,
            });
            return outcome;
        }
    };

    for item in items.into_iter().take(max_items) {
        if shutdown.is_cancelled() {
            debug!("Storing items for source {} cancelled", source.id);
            break;
        }
        if !item.matches_keywords(&keywords) {
            continue;
        }

        let candidate = NewArticle::from_item(source.id, item);
        match articles.insert_if_absent(&candidate).await {
            Ok(true) => outcome.inserted += 1,
            Ok(false) => {}
            Err(e) => {
                error!(
                    "Failed to store item {} for source {}: {}",
                    candidate.link, source.id, e
                );
                outcome.errors.push(PipelineError::Persistence {
                    context: format!("store article {}", candidate.link),
                    error: e,
                });
            }
        }
    }

    if outcome.inserted > 0 {
        info!("Source {} ({}): {} new article(s)", source.id, source.name, outcome.inserted);
    } else {
        debug!("Source {} ({}): no new articles", source.id, source.name);
    }

    outcome
}
