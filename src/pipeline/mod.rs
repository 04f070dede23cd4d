//! Scheduled pipelines: the fetcher and the notifier.
//!
//! Each pipeline runs one cycle at a time from a ticker. Work inside a cycle
//! is spread over tokio tasks and joined before the cycle returns, so the
//! next cycle always sees the previous cycle's writes.

pub mod fetcher;
pub mod notifier;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::shutdown::Shutdown;
use crate::RelayError;

pub use fetcher::Fetcher;
pub use notifier::Notifier;

/// A failure inside one branch of a cycle.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Feed unreachable or unparsable.
    #[error("fetch failed for source {source_id} ({url}): {error}")]
    Fetch {
        source_id: i64,
        url: String,
        #[source]
        error: RelayError,
    },

    /// Store read or write failure.
    #[error("{context}: {error}")]
    Persistence {
        context: String,
        #[source]
        error: RelayError,
    },

    /// Message could not be sent to a subscriber.
    #[error("delivery failed for subscriber {subscriber_id}: {error}")]
    Delivery {
        subscriber_id: i64,
        #[source]
        error: RelayError,
    },

    /// A cycle task panicked.
    #[error("task failed: {0}")]
    Task(String),
}

/// Every branch failure from one cycle.
#[derive(Error, Debug)]
#[error("{pipeline} cycle finished with {} error(s)", errors.len())]
pub struct CycleAggregateError {
    /// Pipeline name.
    pub pipeline: &'static str,
    /// Collected failures, in completion order.
    pub errors: Vec<PipelineError>,
}

impl CycleAggregateError {
    /// `Ok` when nothing failed, otherwise the aggregate.
    pub fn check(pipeline: &'static str, errors: Vec<PipelineError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self { pipeline, errors })
        }
    }
}

/// Shortest interval allowed between cycles.
pub const MIN_CYCLE_INTERVAL: Duration = Duration::from_millis(1);

/// Drive `cycle` every `period` until `shutdown` fires.
///
/// The first cycle starts immediately. Cycle errors are logged and the loop
/// keeps going. A `period` below [`MIN_CYCLE_INTERVAL`] is raised to it.
pub(crate) async fn run_loop<F, Fut>(
    pipeline: &'static str,
    period: Duration,
    mut shutdown: Shutdown,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), CycleAggregateError>>,
{
    if period < MIN_CYCLE_INTERVAL {
        warn!(
            "{} interval {:?} is too short, using {:?}",
            pipeline, period, MIN_CYCLE_INTERVAL
        );
    }
    let period = period.max(MIN_CYCLE_INTERVAL);

    info!(
        "{} started (interval: {} seconds)",
        pipeline,
        period.as_secs()
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = cycle().await {
            warn!("{}", e);
        }

        if shutdown.is_cancelled() {
            break;
        }
    }

    info!("{} stopped", pipeline);
}
