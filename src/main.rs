use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tg_readlater::config::{self, Config, StorageBackend};
use tg_readlater::consumer::{Consumer, Settings};
use tg_readlater::db::{self, FileStore, ItemStore, SqliteStore};
use tg_readlater::fetcher::UpdateFetcher;
use tg_readlater::handlers::CommandRouter;
use tg_readlater::state::{MemoryStateStore, StateStore};
use tg_readlater::telegram::{EventSource, TelegramSource};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

async fn open_item_store(cfg: &Config) -> Result<Arc<dyn ItemStore>> {
    match cfg.storage.backend {
        StorageBackend::Sqlite => {
            let pool = db::init_pool(&cfg.database_url()).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        StorageBackend::Files => Ok(Arc::new(FileStore::new(cfg.pages_dir()))),
    }
}

async fn open_state_store(cfg: &Config) -> Result<Arc<dyn StateStore>> {
    match &cfg.state.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => Ok(Arc::new(
            tg_readlater::state::RedisStateStore::connect(url).await?,
        )),
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("state.redis_url is set but the redis feature is disabled"),
        None => {
            info!("no redis configured; keeping conversation state in memory");
            Ok(Arc::new(MemoryStateStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let items = open_item_store(&cfg).await?;
    let state = open_state_store(&cfg).await?;
    let source: Arc<dyn EventSource> = Arc::new(TelegramSource::from_config(&cfg)?);

    let router = Arc::new(CommandRouter::new(source.clone(), items, state));
    let consumer = Consumer::new(
        UpdateFetcher::new(source),
        router,
        Settings::from_config(&cfg),
    );

    info!(backend = ?cfg.storage.backend, "service started");
    consumer.start().await?;
    Ok(())
}
