use chrono::Utc;
use sqlx::PgPool;

use goldwatch_core::alerts::evaluator::evaluate;
use goldwatch_core::domain::alert::{Alert, AlertRule};
use goldwatch_core::ingest::aggregator::{FallbackAggregator, FetchOptions};
use goldwatch_core::notify::dispatcher::NotificationDispatcher;
use goldwatch_core::notify::whatsapp::WhatsAppChannel;
use goldwatch_core::storage;

/// One scheduled pass: refresh the price, evaluate alerts, dispatch what
/// is due. Guarded by the pipeline advisory lock so parallel workers
/// sharing a database do not double-send.
pub async fn run_tick(
    pool: &PgPool,
    aggregator: &FallbackAggregator,
    dispatcher: &NotificationDispatcher,
    whatsapp: &WhatsAppChannel,
) -> anyhow::Result<()> {
    let Some(lock) = storage::lock::try_acquire_pipeline_lock(pool).await? else {
        tracing::info!("pipeline lock held elsewhere; skipping tick");
        return Ok(());
    };

    let result = tick_inner(pool, aggregator, dispatcher, whatsapp).await;
    if let Err(err) = lock.release().await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "pipeline lock release failed");
    }
    result
}

async fn tick_inner(
    pool: &PgPool,
    aggregator: &FallbackAggregator,
    dispatcher: &NotificationDispatcher,
    whatsapp: &WhatsAppChannel,
) -> anyhow::Result<()> {
    let session = whatsapp.sync_session().await;
    tracing::debug!(?session, "whatsapp session state");

    let offset = goldwatch_core::config::display_offset()?;
    let now_local = Utc::now().with_timezone(&offset);

    let alerts = storage::alerts::active_alerts(pool).await?;

    // The scheduled tick always goes to the network; the short cache TTL
    // exists for on-demand API reads, not for this path.
    let opts = FetchOptions {
        refresh: true,
        source: None,
    };
    let (ctx, fresh) = match goldwatch_core::ingest::refresh_and_store(pool, aggregator, opts).await
    {
        Ok(snapshot) => {
            tracing::info!(
                source = %snapshot.source,
                per_gram = snapshot.price_per_gram,
                "stored fresh price snapshot"
            );
            let ctx = storage::prices::context_for(pool, snapshot).await?;
            (Some(ctx), true)
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "price refresh failed; falling back to stored data");
            (storage::prices::stored_price_context(pool).await?, false)
        }
    };

    let Some(ctx) = ctx else {
        tracing::warn!("no price data available; skipping alert evaluation");
        return Ok(());
    };

    // Without a fresh reading, price-threshold alerts would fire on stale
    // quotes; only daily summaries still make sense.
    let candidates: Vec<Alert> = if fresh {
        alerts
    } else {
        alerts
            .into_iter()
            .filter(|a| matches!(a.rule, AlertRule::Daily { .. }))
            .collect()
    };

    let due = evaluate(&ctx, &candidates, now_local);
    if due.is_empty() {
        tracing::debug!("no alerts due");
        return Ok(());
    }
    tracing::info!(due = due.len(), "alerts due for dispatch");

    for alert in &due {
        if let Err(err) = dispatcher.dispatch_and_record(pool, alert, &ctx).await {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(alert_id = %alert.id, error = %err, "dispatch bookkeeping failed");
        }
    }

    Ok(())
}
