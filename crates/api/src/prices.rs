use crate::{api_error, internal_error, require_pool, ApiError, AppState};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use goldwatch_core::domain::price::{PriceContext, PriceSnapshot, SourceId};
use goldwatch_core::ingest::aggregator::FetchOptions;
use goldwatch_core::storage::prices::{self, Timeframe};

/// A stored reading older than this no longer satisfies `/current`; the
/// request triggers a live fetch instead.
const STALE_AFTER_HOURS: i64 = 3;

fn is_stale(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - fetched_at >= Duration::hours(STALE_AFTER_HOURS)
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiPrice {
    #[serde(flatten)]
    snapshot: PriceSnapshot,
    price_change: f64,
    buy_price_change: f64,
    sell_price_change: f64,
}

fn api_price(ctx: PriceContext) -> ApiPrice {
    ApiPrice {
        price_change: ctx.price_change(),
        buy_price_change: ctx.buy_price_change(),
        sell_price_change: ctx.sell_price_change(),
        snapshot: ctx.current,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentQuery {
    refresh: Option<bool>,
    source: Option<String>,
}

pub(crate) async fn current_price(
    State(state): State<AppState>,
    Query(q): Query<CurrentQuery>,
) -> Result<Json<ApiPrice>, ApiError> {
    let pool = require_pool(&state)?;

    let refresh = q.refresh.unwrap_or(false);
    let source: Option<SourceId> = match q.source.as_deref() {
        Some(s) => Some(
            s.parse()
                .map_err(|e: anyhow::Error| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        ),
        None => None,
    };

    // The stored reading satisfies a plain read as long as it is recent
    // enough; forced refreshes and explicit source picks always go live.
    if !refresh && source.is_none() {
        if let Some(ctx) = prices::stored_price_context(pool)
            .await
            .map_err(internal_error)?
        {
            if !is_stale(ctx.current.fetched_at, Utc::now()) {
                return Ok(Json(api_price(ctx)));
            }
        }
    }

    let opts = FetchOptions { refresh, source };
    match goldwatch_core::ingest::refresh_and_store(pool, &state.aggregator, opts).await {
        Ok(snapshot) => {
            let ctx = prices::context_for(pool, snapshot)
                .await
                .map_err(internal_error)?;
            Ok(Json(api_price(ctx)))
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "live price fetch failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    timeframe: Option<String>,
}

fn parse_timeframe(q: &HistoryQuery) -> Result<Timeframe, ApiError> {
    q.timeframe
        .as_deref()
        .unwrap_or("1w")
        .parse()
        .map_err(|e: anyhow::Error| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryPoint {
    #[serde(flatten)]
    snapshot: PriceSnapshot,
    change: f64,
    change_percent: f64,
}

/// Pairs each reading with its movement against the preceding one and
/// returns the list newest first. The oldest reading reports zero change.
fn annotate_history(snapshots: Vec<PriceSnapshot>) -> Vec<HistoryPoint> {
    let mut points = Vec::with_capacity(snapshots.len());
    let mut previous: Option<f64> = None;
    for snapshot in snapshots {
        let change = previous
            .map(|p| snapshot.price_per_gram - p)
            .unwrap_or(0.0);
        let change_percent = previous
            .filter(|p| *p != 0.0)
            .map(|p| change / p * 100.0)
            .unwrap_or(0.0);
        previous = Some(snapshot.price_per_gram);
        points.push(HistoryPoint {
            snapshot,
            change,
            change_percent,
        });
    }
    points.reverse();
    points
}

pub(crate) async fn price_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let pool = require_pool(&state)?;
    let timeframe = parse_timeframe(&q)?;

    let snapshots = prices::snapshots_since(pool, timeframe.cutoff(Utc::now()))
        .await
        .map_err(internal_error)?;
    Ok(Json(annotate_history(snapshots)))
}

const DEFAULT_CHANGES_LIMIT: i64 = 5;
const MAX_CHANGES_LIMIT: i64 = 50;

/// One buy- or sell-quote movement between two consecutive readings, as
/// listed in the dashboard's recent-changes table.
#[derive(Debug, Serialize)]
pub(crate) struct RecentChange {
    fetched_at: DateTime<Utc>,
    kind: &'static str,
    price: f64,
    change: f64,
}

/// Walks consecutive pairs (input newest first) and emits an entry per
/// quote that actually moved; unchanged quotes produce nothing.
fn recent_changes_from(snapshots: &[PriceSnapshot], limit: usize) -> Vec<RecentChange> {
    let mut out = Vec::new();
    for pair in snapshots.windows(2) {
        let (current, previous) = (&pair[0], &pair[1]);
        if current.buy_price != previous.buy_price {
            out.push(RecentChange {
                fetched_at: current.fetched_at,
                kind: "buy",
                price: current.buy_price,
                change: current.buy_price - previous.buy_price,
            });
        }
        if current.sell_price != previous.sell_price {
            out.push(RecentChange {
                fetched_at: current.fetched_at,
                kind: "sell",
                price: current.sell_price,
                change: current.sell_price - previous.sell_price,
            });
        }
    }
    out.truncate(limit);
    out
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangesQuery {
    limit: Option<i64>,
}

pub(crate) async fn recent_price_changes(
    State(state): State<AppState>,
    Query(q): Query<ChangesQuery>,
) -> Result<Json<Vec<RecentChange>>, ApiError> {
    let pool = require_pool(&state)?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_CHANGES_LIMIT)
        .clamp(1, MAX_CHANGES_LIMIT);

    // One extra row so the oldest requested entry has a predecessor.
    let snapshots = prices::recent_snapshots(pool, limit + 1)
        .await
        .map_err(internal_error)?;
    Ok(Json(recent_changes_from(&snapshots, limit as usize)))
}

#[derive(Debug, Serialize)]
pub(crate) struct ChartData {
    labels: Vec<String>,
    prices: Vec<f64>,
}

/// Label granularity follows the window: intraday shows clock time, a
/// week shows weekday and hour, anything longer shows the calendar day.
fn chart_label(fetched_at: DateTime<Utc>, timeframe: Timeframe, offset: FixedOffset) -> String {
    let local = fetched_at.with_timezone(&offset);
    let fmt = match timeframe {
        Timeframe::Day => "%H:%M",
        Timeframe::Week => "%a %Hh",
        _ => "%b %-d",
    };
    local.format(fmt).to_string()
}

pub(crate) async fn price_chart(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<ChartData>, ApiError> {
    let pool = require_pool(&state)?;
    let timeframe = parse_timeframe(&q)?;
    let offset = goldwatch_core::config::display_offset().map_err(internal_error)?;

    let snapshots = prices::snapshots_since(pool, timeframe.cutoff(Utc::now()))
        .await
        .map_err(internal_error)?;

    let mut labels = Vec::with_capacity(snapshots.len());
    let mut points = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        labels.push(chart_label(snapshot.fetched_at, timeframe, offset));
        points.push(snapshot.price_per_gram);
    }

    Ok(Json(ChartData {
        labels,
        prices: points,
    }))
}
