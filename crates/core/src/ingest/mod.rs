pub mod aggregator;
pub mod cache;
pub mod emasku;
pub mod error;
pub mod metals;
pub mod pegadaian;
pub mod source;

use crate::domain::price::PriceSnapshot;
use anyhow::Context;

/// Runs one aggregator fetch cycle and appends the resulting snapshot.
/// Shared by the API's on-demand refresh and the worker's scheduled tick.
pub async fn refresh_and_store(
    pool: &sqlx::PgPool,
    aggregator: &aggregator::FallbackAggregator,
    opts: aggregator::FetchOptions,
) -> anyhow::Result<PriceSnapshot> {
    let snapshot = aggregator.fetch(opts).await?;
    crate::storage::prices::insert_snapshot(pool, &snapshot)
        .await
        .context("persist fetched snapshot failed")?;
    Ok(snapshot)
}
