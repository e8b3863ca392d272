use crate::alerts::messages;
use crate::domain::alert::{Alert, AlertRule, ChannelKind, NotificationRecord};
use crate::domain::price::PriceContext;
use crate::ingest::cache::Clock;
use crate::notify::channel::NotificationChannel;
use anyhow::Context;
use std::sync::Arc;

/// Fans one triggered alert out to its enabled channels. Channel failures
/// are isolated: each enabled channel gets its own attempt and its own
/// record, and nothing escapes `dispatch`.
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    clock: Arc<dyn Clock>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, clock: Arc<dyn Clock>) -> Self {
        Self { channels, clock }
    }

    /// One record per enabled channel on the alert, Sent or Failed.
    pub async fn dispatch(&self, alert: &Alert, ctx: &PriceContext) -> Vec<NotificationRecord> {
        let mut records = Vec::new();
        for (kind, destination) in enabled_destinations(alert) {
            let message = build_message(kind, &alert.rule, ctx);
            let sent_at = self.clock.now();
            let record = match self.channel(kind) {
                Some(channel) => match channel.send(&destination, &message).await {
                    Ok(()) => {
                        tracing::info!(alert_id = %alert.id, channel = %kind, "notification sent");
                        NotificationRecord::sent(Some(alert.id), kind, message, sent_at)
                    }
                    Err(err) => {
                        tracing::warn!(
                            alert_id = %alert.id,
                            channel = %kind,
                            error = %err,
                            "notification send failed"
                        );
                        NotificationRecord::failed(
                            Some(alert.id),
                            kind,
                            message,
                            err.to_string(),
                            sent_at,
                        )
                    }
                },
                None => NotificationRecord::failed(
                    Some(alert.id),
                    kind,
                    message,
                    format!("no {kind} channel registered"),
                    sent_at,
                ),
            };
            records.push(record);
        }
        records
    }

    /// Dispatches, logs every attempt, and stamps the alert as triggered.
    /// The stamp is written once dispatch was *attempted*, even when every
    /// channel failed: re-sending each tick while a destination stays
    /// unreachable would flood the log and the user's other channels.
    pub async fn dispatch_and_record(
        &self,
        pool: &sqlx::PgPool,
        alert: &Alert,
        ctx: &PriceContext,
    ) -> anyhow::Result<Vec<NotificationRecord>> {
        let records = self.dispatch(alert, ctx).await;

        for record in &records {
            crate::storage::notifications::insert_notification_log(pool, record)
                .await
                .context("log notification attempt failed")?;
        }
        crate::storage::alerts::update_last_triggered(pool, alert.id, self.clock.now())
            .await
            .context("stamp alert last_triggered_at failed")?;

        Ok(records)
    }

    fn channel(&self, kind: ChannelKind) -> Option<&Arc<dyn NotificationChannel>> {
        self.channels.iter().find(|c| c.kind() == kind)
    }
}

fn enabled_destinations(alert: &Alert) -> Vec<(ChannelKind, String)> {
    let mut out = Vec::new();
    if let Some(chat_id) = alert.channels.telegram_chat_id.as_deref() {
        if !chat_id.trim().is_empty() {
            out.push((ChannelKind::Telegram, chat_id.trim().to_string()));
        }
    }
    if let Some(number) = alert.channels.whatsapp_number.as_deref() {
        if !number.trim().is_empty() {
            out.push((ChannelKind::Whatsapp, number.trim().to_string()));
        }
    }
    out
}

fn build_message(kind: ChannelKind, rule: &AlertRule, ctx: &PriceContext) -> String {
    match rule {
        AlertRule::Daily { .. } => messages::daily_summary_message(kind, ctx),
        _ => messages::price_alert_message(kind, rule, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::{AlertChannels, NotificationStatus, DEFAULT_FREQUENCY_HOURS};
    use crate::domain::price::{PriceSnapshot, SourceId};
    use crate::ingest::cache::SystemClock;
    use crate::notify::channel::SendError;
    use chrono::Utc;
    use uuid::Uuid;

    struct FixedChannel {
        kind: ChannelKind,
        outcome: Result<(), SendError>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for FixedChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(&self, _destination: &str, _message: &str) -> Result<(), SendError> {
            self.outcome.clone()
        }
    }

    fn ctx() -> PriceContext {
        PriceContext {
            current: PriceSnapshot::new(
                Utc::now(),
                1_058_000.0,
                967_000.0,
                1_058_000.0,
                None,
                None,
                SourceId::Emasku,
            )
            .unwrap(),
            previous: None,
        }
    }

    fn alert(channels: AlertChannels) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            rule: AlertRule::Increase { target_price: 1_050_000.0 },
            channels,
            active: true,
            frequency_hours: DEFAULT_FREQUENCY_HOURS,
            last_triggered_at: None,
            created_at: Utc::now(),
        }
    }

    fn dispatcher(channels: Vec<Arc<dyn NotificationChannel>>) -> NotificationDispatcher {
        NotificationDispatcher::new(channels, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn one_record_per_enabled_channel() {
        let d = dispatcher(vec![
            Arc::new(FixedChannel { kind: ChannelKind::Telegram, outcome: Ok(()) }),
            Arc::new(FixedChannel { kind: ChannelKind::Whatsapp, outcome: Ok(()) }),
        ]);
        let a = alert(AlertChannels {
            telegram_chat_id: Some("12345".into()),
            whatsapp_number: Some("6281234567890".into()),
        });

        let records = d.dispatch(&a, &ctx()).await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == NotificationStatus::Sent));
        assert!(records.iter().all(|r| r.alert_id == Some(a.id)));
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_the_other() {
        let d = dispatcher(vec![
            Arc::new(FixedChannel { kind: ChannelKind::Telegram, outcome: Ok(()) }),
            Arc::new(FixedChannel {
                kind: ChannelKind::Whatsapp,
                outcome: Err(SendError::NotReady),
            }),
        ]);
        let a = alert(AlertChannels {
            telegram_chat_id: Some("12345".into()),
            whatsapp_number: Some("6281234567890".into()),
        });

        let records = d.dispatch(&a, &ctx()).await;
        assert_eq!(records.len(), 2);

        let telegram = records.iter().find(|r| r.channel == ChannelKind::Telegram).unwrap();
        assert_eq!(telegram.status, NotificationStatus::Sent);
        assert!(telegram.error_detail.is_none());

        let whatsapp = records.iter().find(|r| r.channel == ChannelKind::Whatsapp).unwrap();
        assert_eq!(whatsapp.status, NotificationStatus::Failed);
        assert!(whatsapp.error_detail.as_deref().unwrap().contains("not ready"));
    }

    #[tokio::test]
    async fn disabled_channel_gets_no_attempt() {
        let d = dispatcher(vec![
            Arc::new(FixedChannel { kind: ChannelKind::Telegram, outcome: Ok(()) }),
            Arc::new(FixedChannel { kind: ChannelKind::Whatsapp, outcome: Ok(()) }),
        ]);
        let a = alert(AlertChannels {
            telegram_chat_id: Some("12345".into()),
            whatsapp_number: None,
        });

        let records = d.dispatch(&a, &ctx()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].channel, ChannelKind::Telegram);
    }

    #[tokio::test]
    async fn message_carries_the_formatted_current_price() {
        let d = dispatcher(vec![Arc::new(FixedChannel {
            kind: ChannelKind::Telegram,
            outcome: Ok(()),
        })]);
        let a = alert(AlertChannels {
            telegram_chat_id: Some("12345".into()),
            whatsapp_number: None,
        });

        let records = d.dispatch(&a, &ctx()).await;
        assert!(records[0].message.contains("Rp 1.058.000"));
    }

    #[tokio::test]
    async fn triggered_increase_alert_ends_as_one_sent_record() {
        use crate::alerts::evaluator::evaluate;
        use chrono::FixedOffset;

        let a = alert(AlertChannels {
            telegram_chat_id: Some("12345".into()),
            whatsapp_number: None,
        });
        let ctx = ctx();
        let now = Utc::now().with_timezone(&FixedOffset::east_opt(7 * 3600).unwrap());

        let due = evaluate(&ctx, &[a], now);
        assert_eq!(due.len(), 1);

        let d = dispatcher(vec![Arc::new(FixedChannel {
            kind: ChannelKind::Telegram,
            outcome: Ok(()),
        })]);
        let records = d.dispatch(&due[0], &ctx).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, NotificationStatus::Sent);
        assert_eq!(records[0].channel, ChannelKind::Telegram);
        assert!(records[0].message.contains("Rp 1.058.000"));
    }

    #[tokio::test]
    async fn missing_channel_registration_yields_failed_record() {
        let d = dispatcher(vec![]);
        let a = alert(AlertChannels {
            telegram_chat_id: Some("12345".into()),
            whatsapp_number: None,
        });

        let records = d.dispatch(&a, &ctx()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, NotificationStatus::Failed);
    }
}
