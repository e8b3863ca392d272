use axum::{
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anyhow::Context;
use goldwatch_core::ingest::aggregator::FallbackAggregator;
use goldwatch_core::ingest::cache::{PriceCache, SystemClock};
use goldwatch_core::ingest::emasku::EmaskuSource;
use goldwatch_core::ingest::metals::MetalsApiSource;
use goldwatch_core::ingest::pegadaian::PegadaianSource;
use goldwatch_core::ingest::source::PriceSourceClient;

mod alerts;
mod prices;

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match goldwatch_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let aggregator = Arc::new(build_aggregator()?);
    let state = AppState { pool, aggregator };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/gold-prices/current", get(prices::current_price))
        .route("/gold-prices/history", get(prices::price_history))
        .route("/gold-prices/chart", get(prices::price_chart))
        .route(
            "/gold-prices/recent-changes",
            get(prices::recent_price_changes),
        )
        .route(
            "/alerts",
            get(alerts::list_alerts).post(alerts::create_alert),
        )
        .route(
            "/alerts/:id",
            get(alerts::get_alert)
                .put(alerts::update_alert)
                .patch(alerts::update_alert)
                .delete(alerts::delete_alert),
        )
        .route("/notification-logs", get(alerts::notification_logs))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

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

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub pool: Option<PgPool>,
    pub aggregator: Arc<FallbackAggregator>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorBody>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

pub(crate) fn internal_error(err: anyhow::Error) -> ApiError {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

pub(crate) fn require_pool(state: &AppState) -> Result<&PgPool, ApiError> {
    state.pool.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "database unavailable; API is running in degraded mode",
        )
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
