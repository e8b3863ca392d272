use crate::{api_error, internal_error, require_pool, ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use goldwatch_core::domain::alert::{Alert, AlertChannels, AlertRule};
use goldwatch_core::storage::alerts::{self, AlertUpdate, NewAlert};
use goldwatch_core::storage::notifications::{self, NotificationLogEntry};

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 500;

/// Flat wire shape for an alert, mirroring what clients submit.
#[derive(Debug, Serialize)]
pub(crate) struct ApiAlert {
    id: Uuid,
    alert_type: &'static str,
    target_price: Option<f64>,
    daily_time: Option<String>,
    telegram_chat_id: Option<String>,
    whatsapp_number: Option<String>,
    active: bool,
    frequency_hours: i64,
    last_triggered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

fn api_alert(alert: Alert) -> ApiAlert {
    ApiAlert {
        id: alert.id,
        alert_type: alert.rule.kind(),
        target_price: alert.rule.target_price(),
        daily_time: alert.rule.daily_time().map(String::from),
        telegram_chat_id: alert.channels.telegram_chat_id,
        whatsapp_number: alert.channels.whatsapp_number,
        active: alert.active,
        frequency_hours: alert.frequency_hours,
        last_triggered_at: alert.last_triggered_at,
        created_at: alert.created_at,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateAlertPayload {
    alert_type: String,
    target_price: Option<f64>,
    daily_time: Option<String>,
    telegram_chat_id: Option<String>,
    whatsapp_number: Option<String>,
    frequency_hours: Option<i64>,
}

pub(crate) async fn create_alert(
    State(state): State<AppState>,
    Json(payload): Json<CreateAlertPayload>,
) -> Result<(StatusCode, Json<ApiAlert>), ApiError> {
    let pool = require_pool(&state)?;

    let rule = AlertRule::from_parts(
        &payload.alert_type,
        payload.target_price,
        payload.daily_time.as_deref(),
    )
    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let channels = AlertChannels {
        telegram_chat_id: payload.telegram_chat_id,
        whatsapp_number: payload.whatsapp_number,
    };
    channels
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    if payload.frequency_hours.is_some_and(|h| h <= 0) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "frequency_hours must be positive",
        ));
    }

    let alert = alerts::create_alert(
        pool,
        &NewAlert {
            rule,
            channels,
            frequency_hours: payload.frequency_hours,
        },
    )
    .await
    .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(api_alert(alert))))
}

pub(crate) async fn list_alerts(
    State(state): State<AppState>,
) -> Result<Json<Vec<ApiAlert>>, ApiError> {
    let pool = require_pool(&state)?;
    let alerts = alerts::list_alerts(pool).await.map_err(internal_error)?;
    Ok(Json(alerts.into_iter().map(api_alert).collect()))
}

pub(crate) async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiAlert>, ApiError> {
    let pool = require_pool(&state)?;
    let alert = alerts::get_alert(pool, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no alert with id {id}")))?;
    Ok(Json(api_alert(alert)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateAlertPayload {
    alert_type: Option<String>,
    target_price: Option<f64>,
    daily_time: Option<String>,
    telegram_chat_id: Option<String>,
    whatsapp_number: Option<String>,
    active: Option<bool>,
    frequency_hours: Option<i64>,
}

/// Rule fields travel together: changing the trigger requires the full
/// `alert_type` + dependent-field set, and changing channels requires the
/// full destination set.
fn update_from_payload(payload: UpdateAlertPayload) -> Result<AlertUpdate, ApiError> {
    let rule = match &payload.alert_type {
        Some(alert_type) => Some(
            AlertRule::from_parts(
                alert_type,
                payload.target_price,
                payload.daily_time.as_deref(),
            )
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        ),
        None => {
            if payload.target_price.is_some() || payload.daily_time.is_some() {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "changing the trigger requires alert_type alongside its fields",
                ));
            }
            None
        }
    };

    let channels = if payload.telegram_chat_id.is_some() || payload.whatsapp_number.is_some() {
        let channels = AlertChannels {
            telegram_chat_id: payload.telegram_chat_id,
            whatsapp_number: payload.whatsapp_number,
        };
        channels
            .validate()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
        Some(channels)
    } else {
        None
    };

    if payload.frequency_hours.is_some_and(|h| h <= 0) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "frequency_hours must be positive",
        ));
    }

    Ok(AlertUpdate {
        rule,
        channels,
        active: payload.active,
        frequency_hours: payload.frequency_hours,
    })
}

pub(crate) async fn update_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAlertPayload>,
) -> Result<Json<ApiAlert>, ApiError> {
    let pool = require_pool(&state)?;
    let update = update_from_payload(payload)?;

    let alert = alerts::update_alert(pool, id, &update)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no alert with id {id}")))?;
    Ok(Json(api_alert(alert)))
}

pub(crate) async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let pool = require_pool(&state)?;
    let deleted = alerts::delete_alert(pool, id)
        .await
        .map_err(internal_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("no alert with id {id}"),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsQuery {
    limit: Option<i64>,
}

pub(crate) async fn notification_logs(
    State(state): State<AppState>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<Vec<NotificationLogEntry>>, ApiError> {
    let pool = require_pool(&state)?;
    let limit = q.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let logs = notifications::recent_notification_logs(pool, limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(logs))
}
