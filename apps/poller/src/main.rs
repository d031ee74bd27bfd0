use anyhow::{Context, Result};
use currency::{FeedClient, RedisCurrencyStore};
use poller::{Poller, config::Config, logging::init_logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = Config::from_env()?;
    info!(feed_url = %config.feed_url, "loaded configuration");

    let feed = FeedClient::new(&config.feed_url, &config.feed_api_key, config.feed_timeout)
        .context("init feed client failed")?;

    let mut poller = Poller::new(feed, config.update_interval);

    poller
        .start(RedisCurrencyStore::connect(
            &config.redis_url,
            config.redis_key_prefix.clone(),
        ))
        .await
        .context("failed to start currency price poller")?;

    poller.run(shutdown_signal()).await?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::{
            select,
            signal::unix::{SignalKind, signal},
        };
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
            _ = sigint.recv()  => info!("received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C, shutting down gracefully");
    }
}
