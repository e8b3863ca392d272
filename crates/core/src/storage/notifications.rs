use crate::domain::alert::NotificationRecord;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A notification log row as served by the API. Channel and status stay
/// strings here: old rows must remain readable even if the enum set
/// changes.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationLogEntry {
    pub id: Uuid,
    pub alert_id: Option<Uuid>,
    pub channel: String,
    pub message: String,
    pub status: String,
    pub error_detail: Option<String>,
    pub sent_at: DateTime<Utc>,
}

pub async fn insert_notification_log(
    pool: &sqlx::PgPool,
    record: &NotificationRecord,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO notification_logs (alert_id, channel, message, status, error_detail, sent_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(record.alert_id)
    .bind(record.channel.as_str())
    .bind(&record.message)
    .bind(record.status.as_str())
    .bind(&record.error_detail)
    .bind(record.sent_at)
    .fetch_one(pool)
    .await
    .context("insert notification_logs failed")?;

    Ok(id)
}

pub async fn recent_notification_logs(
    pool: &sqlx::PgPool,
    limit: i64,
) -> anyhow::Result<Vec<NotificationLogEntry>> {
    let rows: Vec<(
        Uuid,
        Option<Uuid>,
        String,
        String,
        String,
        Option<String>,
        DateTime<Utc>,
    )> = sqlx::query_as(
        "SELECT id, alert_id, channel, message, status, error_detail, sent_at \
         FROM notification_logs ORDER BY sent_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select notification_logs failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(id, alert_id, channel, message, status, error_detail, sent_at)| {
                NotificationLogEntry {
                    id,
                    alert_id,
                    channel,
                    message,
                    status,
                    error_detail,
                    sent_at,
                }
            },
        )
        .collect())
}
