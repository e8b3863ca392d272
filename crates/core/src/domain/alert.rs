use anyhow::ensure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum spacing between two firings of the same alert, unless the user
/// configured something else.
pub const DEFAULT_FREQUENCY_HOURS: i64 = 24;

/// What makes an alert fire. Each variant carries only the field that is
/// meaningful for it, so an increase alert with a daily time (or a daily
/// alert with a target price) is unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "alert_type", rename_all = "lowercase")]
pub enum AlertRule {
    Increase { target_price: f64 },
    Decrease { target_price: f64 },
    Daily { daily_time: String },
}

impl AlertRule {
    /// Builds a rule from the loosely-typed shape used by the API payload
    /// and the database row, enforcing the type-dependent field rules.
    pub fn from_parts(
        alert_type: &str,
        target_price: Option<f64>,
        daily_time: Option<&str>,
    ) -> anyhow::Result<Self> {
        match alert_type {
            "increase" | "decrease" => {
                ensure!(
                    daily_time.is_none(),
                    "daily_time is only valid for daily alerts"
                );
                let target = target_price
                    .ok_or_else(|| anyhow::anyhow!("target_price is required for {alert_type} alerts"))?;
                ensure!(target > 0.0, "target_price must be positive (got {target})");
                if alert_type == "increase" {
                    Ok(AlertRule::Increase { target_price: target })
                } else {
                    Ok(AlertRule::Decrease { target_price: target })
                }
            }
            "daily" => {
                ensure!(
                    target_price.is_none(),
                    "target_price is not valid for daily alerts"
                );
                let time = daily_time
                    .ok_or_else(|| anyhow::anyhow!("daily_time is required for daily alerts"))?
                    .trim()
                    .to_string();
                ensure!(
                    parse_daily_hour(&time).is_some(),
                    "daily_time must be HH:MM (got {time:?})"
                );
                Ok(AlertRule::Daily { daily_time: time })
            }
            other => anyhow::bail!("unknown alert type: {other}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AlertRule::Increase { .. } => "increase",
            AlertRule::Decrease { .. } => "decrease",
            AlertRule::Daily { .. } => "daily",
        }
    }

    pub fn target_price(&self) -> Option<f64> {
        match self {
            AlertRule::Increase { target_price } | AlertRule::Decrease { target_price } => {
                Some(*target_price)
            }
            AlertRule::Daily { .. } => None,
        }
    }

    pub fn daily_time(&self) -> Option<&str> {
        match self {
            AlertRule::Daily { daily_time } => Some(daily_time),
            _ => None,
        }
    }

    /// Hour component of a daily rule; `None` for price rules.
    pub fn daily_hour(&self) -> Option<u32> {
        self.daily_time().and_then(parse_daily_hour)
    }
}

fn parse_daily_hour(time: &str) -> Option<u32> {
    let (hour, minute) = time.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    (hour <= 23 && minute <= 59).then_some(hour)
}

/// Enabled delivery destinations for one alert. At least one must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertChannels {
    pub telegram_chat_id: Option<String>,
    pub whatsapp_number: Option<String>,
}

impl AlertChannels {
    pub fn validate(&self) -> anyhow::Result<()> {
        let telegram = self.telegram_chat_id.as_deref().map(str::trim);
        let whatsapp = self.whatsapp_number.as_deref().map(str::trim);
        ensure!(
            telegram.is_some_and(|s| !s.is_empty()) || whatsapp.is_some_and(|s| !s.is_empty()),
            "alert must have at least one notification channel"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub rule: AlertRule,
    pub channels: AlertChannels,
    pub active: bool,
    pub frequency_hours: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    Whatsapp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::Whatsapp => "whatsapp",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

/// One dispatch attempt on one channel. `error_detail` is present exactly
/// when the attempt failed. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub alert_id: Option<Uuid>,
    pub channel: ChannelKind,
    pub message: String,
    pub status: NotificationStatus,
    pub error_detail: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn sent(
        alert_id: Option<Uuid>,
        channel: ChannelKind,
        message: String,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id,
            channel,
            message,
            status: NotificationStatus::Sent,
            error_detail: None,
            sent_at,
        }
    }

    pub fn failed(
        alert_id: Option<Uuid>,
        channel: ChannelKind,
        message: String,
        error_detail: String,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id,
            channel,
            message,
            status: NotificationStatus::Failed,
            error_detail: Some(error_detail),
            sent_at,
        }
    }
}
