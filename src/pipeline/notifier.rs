//! Notify pipeline.
//!
//! Each cycle sends every subscriber the oldest unposted article from the
//! sources they follow. Articles picked during a cycle are collected into a
//! shared set and marked posted once, after every delivery has finished.
//!
//! An article is marked posted even when delivery to some subscriber
//! failed, so that subscriber will not get it again on a later cycle.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{run_loop, CycleAggregateError, PipelineError, MIN_CYCLE_INTERVAL};
use crate::config::NotifierConfig;
use crate::delivery::{format_article_message, DeliveryChannel};
use crate::feed::Subscriber;
use crate::shutdown::Shutdown;
use crate::store::{ArticleStore, SubscriberDirectory};

/// Default interval between notify cycles in seconds.
pub const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 10;

/// IDs of the articles picked in the current cycle.
type Selection = Arc<Mutex<BTreeSet<i64>>>;

/// Subscriber notifier.
pub struct Notifier {
    directory: Arc<dyn SubscriberDirectory>,
    articles: Arc<dyn ArticleStore>,
    channel: Arc<dyn DeliveryChannel>,
    interval: Duration,
    timezone: Arc<str>,
    shutdown: Shutdown,
}

/// Result of one subscriber's task.
#[derive(Debug, PartialEq, Eq)]
enum Notified {
    Delivered,
    Nothing,
    Cancelled,
}

impl Notifier {
    /// Create a notifier with default settings.
    pub fn new(
        directory: Arc<dyn SubscriberDirectory>,
        articles: Arc<dyn ArticleStore>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Self {
        Self {
            directory,
            articles,
            channel,
            interval: Duration::from_secs(DEFAULT_NOTIFY_INTERVAL_SECS),
            timezone: Arc::from("UTC"),
            shutdown: Shutdown::never(),
        }
    }

    /// Apply the `[notifier]` settings.
    pub fn with_config(self, config: &NotifierConfig) -> Self {
        self.with_interval(Duration::from_secs(config.interval_secs))
            .with_timezone(&config.timezone)
    }

    /// Set the interval between cycles, at least [`MIN_CYCLE_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_CYCLE_INTERVAL);
        self
    }

    /// Set the timezone used for publish times in messages.
    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = Arc::from(timezone);
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
        run_loop("notifier", self.interval, self.shutdown.clone(), move || {
            self.run_cycle()
        })
        .await;
    }

    /// Run one notify cycle over every subscriber.
    ///
    /// Returns after all deliveries have finished and every selected article
    /// has been marked. Per-subscriber failures come back in the aggregate.
    pub async fn run_cycle(&self) -> Result<(), CycleAggregateError> {
        match self.articles.list_unposted().await {
            Ok(pending) if pending.is_empty() => {
                debug!("No unposted articles");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => return persistence_failure("list unposted articles", e),
        }

        let subscribers = match self.directory.list_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => return persistence_failure("list subscribers", e),
        };

        if subscribers.is_empty() {
            debug!("No subscribers to notify");
            return Ok(());
        }

        let subscriber_count = subscribers.len();
        let selection: Selection = Arc::default();

        let mut tasks = JoinSet::new();
        for subscriber in subscribers {
            let directory = Arc::clone(&self.directory);
            let articles = Arc::clone(&self.articles);
            let channel = Arc::clone(&self.channel);
            let timezone = Arc::clone(&self.timezone);
            let selection = Arc::clone(&selection);
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move {
                notify_subscriber(
                    subscriber, directory, articles, channel, timezone, selection, shutdown,
                )
                .await
            });
        }

        let mut delivered = 0;
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Notified::Delivered)) => delivered += 1,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => {
                    error!("Notify task failed: {}", e);
                    errors.push(PipelineError::Task(e.to_string()));
                }
            }
        }

        let selected = std::mem::take(&mut *selection.lock().await);
        let mut marked = 0;
        for article_id in selected {
            match self.articles.mark_posted(article_id).await {
                Ok(true) => marked += 1,
                Ok(false) => debug!("Article {} was already posted", article_id),
                Err(e) => {
                    error!("Failed to mark article {} posted: {}", article_id, e);
                    errors.push(PipelineError::Persistence {
                        context: format!("mark article {} posted", article_id),
                        error: e,
                    });
                }
            }
        }

        info!(
            "Notify cycle complete: {} subscriber(s), {} delivered, {} article(s) marked, {} error(s)",
            subscriber_count,
            delivered,
            marked,
            errors.len()
        );

        CycleAggregateError::check("notifier", errors)
    }
}

fn persistence_failure(
    context: &str,
    error: crate::RelayError,
) -> Result<(), CycleAggregateError> {
    error!("Failed to {}: {}", context, error);
    CycleAggregateError::check(
        "notifier",
        vec![PipelineError::Persistence {
            context: context.to_string(),
            error,
        }],
    )
}

/// Pick and deliver one article for a subscriber.
async fn notify_subscriber(
    subscriber: Subscriber,
    directory: Arc<dyn SubscriberDirectory>,
    articles: Arc<dyn ArticleStore>,
    channel: Arc<dyn DeliveryChannel>,
    timezone: Arc<str>,
    selection: Selection,
    mut shutdown: Shutdown,
) -> Result<Notified, PipelineError> {
    let subscriber_id = subscriber.chat_id;
    if shutdown.is_cancelled() {
        return Ok(Notified::Cancelled);
    }

    let sources = directory
        .list_sources_for_subscriber(subscriber_id)
        .await
        .map_err(|error| {
            warn!("Failed to list sources for subscriber {}: {}", subscriber_id, error);
            PipelineError::Persistence {
                context: format!("list sources for subscriber {}", subscriber_id),
                error,
            }
        })?;

    if sources.is_empty() {
        return Ok(Notified::Nothing);
    }

    let source_ids: Vec<i64> = sources.iter().map(|s| s.id).collect();
    let unposted = articles
        .list_unposted_for_sources(&source_ids)
        .await
        .map_err(|error| {
            warn!("Failed to list articles for subscriber {}: {}", subscriber_id, error);
            PipelineError::Persistence {
                context: format!("list unposted articles for subscriber {}", subscriber_id),
                error,
            }
        })?;

    let Some(article) = unposted.into_iter().next() else {
        return Ok(Notified::Nothing);
    };

    let message = format_article_message(&article, &timezone);
    let sent = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            debug!("Delivery to subscriber {} cancelled", subscriber_id);
            return Ok(Notified::Cancelled);
        }
        result = channel.send(subscriber_id, &message) => result,
    };

    let article_id = article.id;
    selection.lock().await.insert(article_id);

    match sent {
        Ok(()) => {
            debug!("Sent article {} to subscriber {}", article_id, subscriber_id);
            Ok(Notified::Delivered)
        }
        Err(error) => {
            warn!(
                "Failed to deliver article {} to subscriber {} ({}): {}",
                article_id, subscriber_id, subscriber.name, error
            );
            Err(PipelineError::Delivery {
                subscriber_id,
                error,
            })
        }
    }
}
