use crate::domain::alert::{Alert, AlertChannels, AlertRule, DEFAULT_FREQUENCY_HOURS};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

type AlertRow = (
    Uuid,
    String,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

const ALERT_COLUMNS: &str = "id, alert_type, target_price, daily_time, telegram_chat_id, \
     whatsapp_number, active, frequency_hours, last_triggered_at, created_at";

fn alert_from_row(row: AlertRow) -> anyhow::Result<Alert> {
    let (
        id,
        alert_type,
        target_price,
        daily_time,
        telegram_chat_id,
        whatsapp_number,
        active,
        frequency_hours,
        last_triggered_at,
        created_at,
    ) = row;
    let rule = AlertRule::from_parts(&alert_type, target_price, daily_time.as_deref())
        .with_context(|| format!("stored alert {id} has an invalid rule"))?;
    Ok(Alert {
        id,
        rule,
        channels: AlertChannels {
            telegram_chat_id,
            whatsapp_number,
        },
        active,
        frequency_hours,
        last_triggered_at,
        created_at,
    })
}

/// Alert as submitted through the API, before it has an id or history.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub rule: AlertRule,
    pub channels: AlertChannels,
    pub frequency_hours: Option<i64>,
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct AlertUpdate {
    pub rule: Option<AlertRule>,
    pub channels: Option<AlertChannels>,
    pub active: Option<bool>,
    pub frequency_hours: Option<i64>,
}

pub async fn create_alert(pool: &sqlx::PgPool, new: &NewAlert) -> anyhow::Result<Alert> {
    new.channels.validate()?;
    let frequency_hours = new.frequency_hours.unwrap_or(DEFAULT_FREQUENCY_HOURS);
    anyhow::ensure!(
        frequency_hours > 0,
        "frequency_hours must be positive (got {frequency_hours})"
    );

    let row: AlertRow = sqlx::query_as(&format!(
        "INSERT INTO price_alerts \
         (alert_type, target_price, daily_time, telegram_chat_id, whatsapp_number, frequency_hours) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {ALERT_COLUMNS}"
    ))
    .bind(new.rule.kind())
    .bind(new.rule.target_price())
    .bind(new.rule.daily_time())
    .bind(&new.channels.telegram_chat_id)
    .bind(&new.channels.whatsapp_number)
    .bind(frequency_hours)
    .fetch_one(pool)
    .await
    .context("insert price_alerts failed")?;

    alert_from_row(row)
}

pub async fn get_alert(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<Option<Alert>> {
    let row: Option<AlertRow> = sqlx::query_as(&format!(
        "SELECT {ALERT_COLUMNS} FROM price_alerts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("select price_alerts by id failed")?;

    row.map(alert_from_row).transpose()
}

pub async fn list_alerts(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Alert>> {
    let rows: Vec<AlertRow> = sqlx::query_as(&format!(
        "SELECT {ALERT_COLUMNS} FROM price_alerts ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await
    .context("select price_alerts failed")?;

    rows.into_iter().map(alert_from_row).collect()
}

pub async fn active_alerts(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Alert>> {
    let rows: Vec<AlertRow> = sqlx::query_as(&format!(
        "SELECT {ALERT_COLUMNS} FROM price_alerts WHERE active ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await
    .context("select active price_alerts failed")?;

    rows.into_iter().map(alert_from_row).collect()
}

/// Applies a partial update on top of the stored alert. Returns `None`
/// when the alert does not exist.
pub async fn update_alert(
    pool: &sqlx::PgPool,
    id: Uuid,
    update: &AlertUpdate,
) -> anyhow::Result<Option<Alert>> {
    let Some(existing) = get_alert(pool, id).await? else {
        return Ok(None);
    };
    let merged = apply_update(&existing, update)?;

    let row: AlertRow = sqlx::query_as(&format!(
        "UPDATE price_alerts SET \
         alert_type = $2, target_price = $3, daily_time = $4, \
         telegram_chat_id = $5, whatsapp_number = $6, active = $7, frequency_hours = $8 \
         WHERE id = $1 \
         RETURNING {ALERT_COLUMNS}"
    ))
    .bind(id)
    .bind(merged.rule.kind())
    .bind(merged.rule.target_price())
    .bind(merged.rule.daily_time())
    .bind(&merged.channels.telegram_chat_id)
    .bind(&merged.channels.whatsapp_number)
    .bind(merged.active)
    .bind(merged.frequency_hours)
    .fetch_one(pool)
    .await
    .context("update price_alerts failed")?;

    alert_from_row(row).map(Some)
}

fn apply_update(existing: &Alert, update: &AlertUpdate) -> anyhow::Result<Alert> {
    let mut merged = existing.clone();
    if let Some(rule) = &update.rule {
        merged.rule = rule.clone();
    }
    if let Some(channels) = &update.channels {
        channels.validate()?;
        merged.channels = channels.clone();
    }
    if let Some(active) = update.active {
        merged.active = active;
    }
    if let Some(frequency_hours) = update.frequency_hours {
        anyhow::ensure!(
            frequency_hours > 0,
            "frequency_hours must be positive (got {frequency_hours})"
        );
        merged.frequency_hours = frequency_hours;
    }
    Ok(merged)
}

/// Returns whether a row was actually deleted.
pub async fn delete_alert(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM price_alerts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete price_alerts failed")?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_last_triggered(
    pool: &sqlx::PgPool,
    id: Uuid,
    at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE price_alerts SET last_triggered_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await
        .context("update price_alerts.last_triggered_at failed")?;
    Ok(())
}
