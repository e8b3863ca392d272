use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use goldwatch_core::ingest::aggregator::FallbackAggregator;
use goldwatch_core::ingest::cache::{PriceCache, SystemClock};
use goldwatch_core::ingest::emasku::EmaskuSource;
use goldwatch_core::ingest::metals::MetalsApiSource;
use goldwatch_core::ingest::pegadaian::PegadaianSource;
use goldwatch_core::ingest::source::PriceSourceClient;
use goldwatch_core::notify::channel::NotificationChannel;
use goldwatch_core::notify::dispatcher::NotificationDispatcher;
use goldwatch_core::notify::telegram::TelegramChannel;
use goldwatch_core::notify::whatsapp::WhatsAppChannel;

mod tick;

const DEFAULT_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Parser)]
#[command(name = "goldwatch_worker")]
struct Args {
    /// Run a single ingest/alert tick and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between scheduled ticks. Falls back to the
    /// WORKER_INTERVAL_SECS env var, then to one hour.
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = goldwatch_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    goldwatch_core::storage::migrate(&pool).await?;

    let aggregator = build_aggregator()?;
    let whatsapp = Arc::new(
        WhatsAppChannel::from_settings(&settings)
            .map_err(|e| anyhow::anyhow!("whatsapp channel init failed: {e}"))?,
    );
    let telegram = Arc::new(
        TelegramChannel::from_settings(&settings)
            .map_err(|e| anyhow::anyhow!("telegram channel init failed: {e}"))?,
    );
    let channels: Vec<Arc<dyn NotificationChannel>> = vec![telegram, whatsapp.clone()];
    let dispatcher = NotificationDispatcher::new(channels, Arc::new(SystemClock));

    if args.once {
        tick::run_tick(&pool, &aggregator, &dispatcher, &whatsapp).await?;
        return Ok(());
    }

    let interval_secs = args.interval_secs.unwrap_or_else(|| {
        std::env::var("WORKER_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_INTERVAL_SECS)
    });
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    tracing::info!(interval_secs, "worker scheduling ticks");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // A failed tick is reported and the schedule keeps going.
                if let Err(err) = tick::run_tick(&pool, &aggregator, &dispatcher, &whatsapp).await {
                    sentry_anyhow::capture_anyhow(&err);
                    tracing::error!(error = %err, "tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

fn build_aggregator() -> anyhow::Result<FallbackAggregator> {
    let sources: Vec<Arc<dyn PriceSourceClient>> = vec![
        Arc::new(EmaskuSource::from_env().context("emasku source init failed")?),
        Arc::new(PegadaianSource::from_env().context("pegadaian source init failed")?),
        Arc::new(MetalsApiSource::from_env().context("metals source init failed")?),
    ];
    Ok(FallbackAggregator::new(
        sources,
        PriceCache::with_ttl_from_env(),
        Arc::new(SystemClock),
    ))
}

fn init_sentry(settings: &goldwatch_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
