use std::sync::Arc;

use tracing::{error, info};

use feedrelay::{
    delivery, seed, shutdown, Config, Database, Fetcher, HttpFeedClient, Notifier, Store,
};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = feedrelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        feedrelay::logging::init_console_only(&config.logging.level);
    }

    info!("feedrelay - Feed relay");

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> feedrelay::Result<()> {
    config.validate()?;

    let db = Arc::new(Database::open(&config.database.path).await?);
    seed::apply(&db, &config).await?;

    let store = Arc::new(Store::new(Arc::clone(&db)));
    let client = Arc::new(HttpFeedClient::new(&config.fetcher)?);
    let channel = delivery::from_config(&config.telegram)?;
    if config.telegram.dry_run {
        info!("Dry run: messages will be logged, not sent");
    }

    let (trigger, listener) = shutdown::channel();

    let fetcher = Fetcher::new(store.clone(), store.clone(), client)
        .with_config(&config.fetcher)
        .with_shutdown(listener.clone());
    let notifier = Notifier::new(store.clone(), store, channel)
        .with_config(&config.notifier)
        .with_shutdown(listener);

    let fetch_loop = {
        let enabled = config.fetcher.enabled;
        tokio::spawn(async move {
            if enabled {
                fetcher.run().await;
            } else {
                info!("Fetcher disabled");
            }
        })
    };
    let notify_loop = {
        let enabled = config.notifier.enabled;
        tokio::spawn(async move {
            if enabled {
                notifier.run().await;
            } else {
                info!("Notifier disabled");
            }
        })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
    trigger.trigger();

    for (name, handle) in [("fetcher", fetch_loop), ("notifier", notify_loop)] {
        if let Err(e) = handle.await {
            error!("{} task failed: {}", name, e);
        }
    }

    db.close().await;
    info!("feedrelay stopped");
    Ok(())
}
