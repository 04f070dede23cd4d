//! Ensure the sources and subscribers listed in the config exist in the store.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::feed::{
    NewSource, SourceRepository, Subscriber, SubscriberRepository, SubscriptionRepository,
};
use crate::{RelayError, Result};

/// Apply `[[sources]]` and `[[subscribers]]` from the config.
///
/// Safe to run on every startup. Existing sources are matched by feed URL
/// and left unchanged.
pub async fn apply(db: &Database, config: &Config) -> Result<()> {
    let sources = SourceRepository::new(db.pool());
    let mut source_ids = HashMap::new();
    let mut created = 0;

    for seed in &config.sources {
        let source = match sources.get_by_url(&seed.url).await? {
            Some(existing) => {
                if existing.name != seed.name {
                    warn!(
                        "Source {} is stored as {:?}, config calls it {:?}",
                        seed.url, existing.name, seed.name
                    );
                }
                existing
            }
            None => {
                created += 1;
                sources
                    .create(&NewSource::new(&seed.name, &seed.url).with_priority(seed.priority))
                    .await?
            }
        };
        source_ids.insert(seed.name.as_str(), source.id);
    }

    let subscribers = SubscriberRepository::new(db.pool());
    let subscriptions = SubscriptionRepository::new(db.pool());
    let mut subscribed = 0;

    for seed in &config.subscribers {
        subscribers
            .upsert(&Subscriber::new(seed.chat_id, &seed.name))
            .await?;
        for name in &seed.sources {
            let source_id = source_ids
                .get(name.as_str())
                .copied()
                .ok_or_else(|| RelayError::NotFound(format!("source {}", name)))?;
            if subscriptions.subscribe(seed.chat_id, source_id).await? {
                subscribed += 1;
                debug!("Subscribed {} to {}", seed.chat_id, name);
            }
        }
    }

    info!(
        "Seeded {} new source(s), {} subscriber(s), {} new subscription(s)",
        created,
        config.subscribers.len(),
        subscribed
    );
    Ok(())
}
