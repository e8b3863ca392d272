use crate::domain::price::{PriceContext, PriceSnapshot, SourceId};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};

/// How far back the previous snapshot for a day-over-day comparison may
/// lie. Anything newer than this before the current reading counts as
/// "yesterday's" price.
const PREVIOUS_LOOKBACK_HOURS: i64 = 24;

type SnapshotRow = (
    DateTime<Utc>,
    f64,
    f64,
    f64,
    Option<f64>,
    Option<f64>,
    String,
    String,
    String,
);

const SNAPSHOT_COLUMNS: &str =
    "fetched_at, buy_price, sell_price, price_per_gram, high_price, low_price, source, currency, unit";

fn snapshot_from_row(row: SnapshotRow) -> anyhow::Result<PriceSnapshot> {
    let (fetched_at, buy_price, sell_price, price_per_gram, high_price, low_price, source, currency, unit) =
        row;
    let source: SourceId = source
        .parse()
        .with_context(|| format!("stored snapshot has unknown source {source:?}"))?;
    // Rows passed PriceSnapshot::new at ingest time; rebuild directly so a
    // read never re-fails validation.
    Ok(PriceSnapshot {
        fetched_at,
        buy_price,
        sell_price,
        price_per_gram,
        high_price,
        low_price,
        source,
        currency,
        unit,
    })
}

pub async fn insert_snapshot(
    pool: &sqlx::PgPool,
    snapshot: &PriceSnapshot,
) -> anyhow::Result<uuid::Uuid> {
    let id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO gold_price_snapshots \
         (fetched_at, buy_price, sell_price, price_per_gram, high_price, low_price, source, currency, unit) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING id",
    )
    .bind(snapshot.fetched_at)
    .bind(snapshot.buy_price)
    .bind(snapshot.sell_price)
    .bind(snapshot.price_per_gram)
    .bind(snapshot.high_price)
    .bind(snapshot.low_price)
    .bind(snapshot.source.as_str())
    .bind(&snapshot.currency)
    .bind(&snapshot.unit)
    .fetch_one(pool)
    .await
    .context("insert gold_price_snapshots failed")?;

    Ok(id)
}

pub async fn latest_snapshot(pool: &sqlx::PgPool) -> anyhow::Result<Option<PriceSnapshot>> {
    let row: Option<SnapshotRow> = sqlx::query_as(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM gold_price_snapshots ORDER BY fetched_at DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await
    .context("select latest gold_price_snapshots failed")?;

    row.map(snapshot_from_row).transpose()
}

/// Most recent snapshot strictly before `cutoff`.
pub async fn latest_snapshot_before(
    pool: &sqlx::PgPool,
    cutoff: DateTime<Utc>,
) -> anyhow::Result<Option<PriceSnapshot>> {
    let row: Option<SnapshotRow> = sqlx::query_as(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM gold_price_snapshots \
         WHERE fetched_at < $1 ORDER BY fetched_at DESC LIMIT 1"
    ))
    .bind(cutoff)
    .fetch_optional(pool)
    .await
    .context("select previous gold_price_snapshots failed")?;

    row.map(snapshot_from_row).transpose()
}

/// The `limit` newest snapshots, newest first.
pub async fn recent_snapshots(
    pool: &sqlx::PgPool,
    limit: i64,
) -> anyhow::Result<Vec<PriceSnapshot>> {
    let rows: Vec<SnapshotRow> = sqlx::query_as(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM gold_price_snapshots \
         ORDER BY fetched_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select recent gold_price_snapshots failed")?;

    rows.into_iter().map(snapshot_from_row).collect()
}

/// Snapshots at or after `cutoff`, oldest first, ready for charting.
pub async fn snapshots_since(
    pool: &sqlx::PgPool,
    cutoff: Option<DateTime<Utc>>,
) -> anyhow::Result<Vec<PriceSnapshot>> {
    let rows: Vec<SnapshotRow> = match cutoff {
        Some(cutoff) => {
            sqlx::query_as(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM gold_price_snapshots \
                 WHERE fetched_at >= $1 ORDER BY fetched_at ASC"
            ))
            .bind(cutoff)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM gold_price_snapshots ORDER BY fetched_at ASC"
            ))
            .fetch_all(pool)
            .await
        }
    }
    .context("select gold_price_snapshots history failed")?;

    rows.into_iter().map(snapshot_from_row).collect()
}

/// Latest stored snapshot paired with its day-over-day predecessor.
pub async fn stored_price_context(pool: &sqlx::PgPool) -> anyhow::Result<Option<PriceContext>> {
    let Some(current) = latest_snapshot(pool).await? else {
        return Ok(None);
    };
    let previous = latest_snapshot_before(
        pool,
        current.fetched_at - Duration::hours(PREVIOUS_LOOKBACK_HOURS),
    )
    .await?;
    Ok(Some(PriceContext { current, previous }))
}

/// Builds a [`PriceContext`] around a fresh snapshot: the predecessor is
/// the newest stored row at least a day older than the new reading.
pub async fn context_for(
    pool: &sqlx::PgPool,
    current: PriceSnapshot,
) -> anyhow::Result<PriceContext> {
    let previous = latest_snapshot_before(
        pool,
        current.fetched_at - Duration::hours(PREVIOUS_LOOKBACK_HOURS),
    )
    .await?;
    Ok(PriceContext { current, previous })
}

/// History window selector as accepted by the API's `?timeframe=` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Day,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
    All,
}

impl Timeframe {
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let back = match self {
            Timeframe::Day => Duration::days(1),
            Timeframe::Week => Duration::weeks(1),
            Timeframe::Month => Duration::days(30),
            Timeframe::ThreeMonths => Duration::days(90),
            Timeframe::SixMonths => Duration::days(180),
            Timeframe::Year => Duration::days(365),
            Timeframe::All => return None,
        };
        Some(now - back)
    }
}

impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Timeframe::Day),
            "1w" => Ok(Timeframe::Week),
            "1m" => Ok(Timeframe::Month),
            "3m" => Ok(Timeframe::ThreeMonths),
            "6m" => Ok(Timeframe::SixMonths),
            "1y" => Ok(Timeframe::Year),
            "all" => Ok(Timeframe::All),
            other => anyhow::bail!("unknown timeframe: {other}"),
        }
    }
}
