use anyhow::Context;
use clap::Parser;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use remote_whitelist::storage::{DiskStorage, WhitelistStore};
use remote_whitelist::{
    AppConfig, DiscoveryCoordinator, DiscoveryScheduler, ReqwestTransport, ScraperChain,
    StatsTracker,
};

/// Discovers which top-level paths exist on the remotes of proxy repositories.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    config: PathBuf,

    /// Run one discovery for every repository, print the results and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("remote_whitelist", log::LevelFilter::Info)
        .filter_module("selectors", log::LevelFilter::Warn)
        .filter_module("html5ever", log::LevelFilter::Error)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let store = match &config.storage_dir {
        Some(dir) => Arc::new(WhitelistStore::with_persistence(DiskStorage::new(dir)?)?),
        None => Arc::new(WhitelistStore::new()),
    };
    let transport = Arc::new(ReqwestTransport::from_config(&config.discovery)?);
    let stats = Arc::new(StatsTracker::new());
    let coordinator = Arc::new(
        DiscoveryCoordinator::new(
            Arc::new(ScraperChain::default()),
            transport,
            Arc::clone(&store),
            config.discovery.clone(),
        )
        .with_stats(Arc::clone(&stats)),
    );
    for repository in config.repositories {
        coordinator.register(repository);
    }

    if cli.once {
        let ids = coordinator.repository_ids();
        info!("Discovering {} repositories", ids.len());
        stream::iter(ids)
            .map(|id| {
                let coordinator = Arc::clone(&coordinator);
                async move {
                    if let Err(e) = coordinator.run(&id).await {
                        warn!("Discovery of {} failed: {}", id, e);
                    }
                }
            })
            .buffer_unordered(config.discovery.workers.max(1))
            .collect::<Vec<_>>()
            .await;

        println!("{}", serde_json::to_string_pretty(&coordinator.statuses())?);
    } else {
        let scheduler = Arc::new(DiscoveryScheduler::new(Arc::clone(&coordinator)));
        scheduler.schedule_registered();

        // Nothing feeds repository changes in standalone mode; the sender
        // stays alive so the scheduler keeps listening.
        let (_events, receiver) = mpsc::channel(64);
        let runner = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run(receiver).await }
        });

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("Shutting down");
        scheduler.shutdown();
        runner.await?;
    }

    stats.finish();
    stats.print_summary();
    Ok(())
}
