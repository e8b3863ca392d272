use crate::domain::alert::{Alert, AlertRule};
use crate::domain::price::PriceContext;
use chrono::{DateTime, Duration, FixedOffset, Timelike};

/// Decides which alerts should fire for the given reading. Pure over its
/// inputs: loading alerts and persisting `last_triggered_at` updates are
/// the caller's business.
///
/// `now` carries the display timezone so daily alerts compare their
/// configured hour against the user's wall clock, not UTC.
pub fn evaluate(ctx: &PriceContext, alerts: &[Alert], now: DateTime<FixedOffset>) -> Vec<Alert> {
    alerts
        .iter()
        .filter(|alert| should_fire(alert, ctx, now))
        .cloned()
        .collect()
}

fn should_fire(alert: &Alert, ctx: &PriceContext, now: DateTime<FixedOffset>) -> bool {
    if !alert.active {
        return false;
    }

    let condition_met = match &alert.rule {
        // Boundary equality fires on both price rules.
        AlertRule::Increase { target_price } => ctx.current.price_per_gram >= *target_price,
        AlertRule::Decrease { target_price } => ctx.current.price_per_gram <= *target_price,
        AlertRule::Daily { .. } => alert.rule.daily_hour() == Some(now.hour()),
    };
    if !condition_met {
        return false;
    }

    frequency_gate_open(alert, now)
}

/// Suppresses re-firing while the threshold stays crossed (or, for daily
/// alerts, across repeated ticks within the matching hour).
fn frequency_gate_open(alert: &Alert, now: DateTime<FixedOffset>) -> bool {
    match alert.last_triggered_at {
        Some(last) => now.signed_duration_since(last) >= Duration::hours(alert.frequency_hours),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::{AlertChannels, DEFAULT_FREQUENCY_HOURS};
    use crate::domain::price::{PriceSnapshot, SourceId};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn at(hour: u32) -> DateTime<FixedOffset> {
        wib().with_ymd_and_hms(2026, 8, 24, hour, 5, 0).unwrap()
    }

    fn ctx(per_gram: f64) -> PriceContext {
        PriceContext {
            current: PriceSnapshot::new(
                Utc::now(),
                per_gram,
                per_gram * 0.95,
                per_gram,
                None,
                None,
                SourceId::Emasku,
            )
            .unwrap(),
            previous: None,
        }
    }

    fn alert(rule: AlertRule) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            rule,
            channels: AlertChannels {
                telegram_chat_id: Some("12345".into()),
                whatsapp_number: None,
            },
            active: true,
            frequency_hours: DEFAULT_FREQUENCY_HOURS,
            last_triggered_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn increase_fires_on_boundary_equality() {
        let a = alert(AlertRule::Increase { target_price: 1_000_000.0 });
        assert_eq!(evaluate(&ctx(1_000_000.0), &[a.clone()], at(10)).len(), 1);
        assert_eq!(evaluate(&ctx(999_999.0), &[a], at(10)).len(), 0);
    }

    #[test]
    fn decrease_fires_at_or_below_target() {
        let a = alert(AlertRule::Decrease { target_price: 950_000.0 });
        assert_eq!(evaluate(&ctx(950_000.0), &[a.clone()], at(10)).len(), 1);
        assert_eq!(evaluate(&ctx(949_000.0), &[a.clone()], at(10)).len(), 1);
        assert_eq!(evaluate(&ctx(950_001.0), &[a], at(10)).len(), 0);
    }

    #[test]
    fn daily_fires_only_in_its_hour_regardless_of_price() {
        let a = alert(AlertRule::Daily { daily_time: "20:00".into() });
        assert_eq!(evaluate(&ctx(1.0e6), &[a.clone()], at(20)).len(), 1);
        assert_eq!(evaluate(&ctx(1.0e6), &[a], at(19)).len(), 0);
    }

    #[test]
    fn frequency_gate_suppresses_while_threshold_stays_crossed() {
        let mut a = alert(AlertRule::Increase { target_price: 1_000_000.0 });
        let fired_at = at(10);
        a.last_triggered_at = Some(fired_at.with_timezone(&Utc));

        let one_hour_later = fired_at + Duration::hours(1);
        assert_eq!(evaluate(&ctx(1_100_000.0), &[a.clone()], one_hour_later).len(), 0);

        let next_day = fired_at + Duration::hours(25);
        assert_eq!(evaluate(&ctx(1_100_000.0), &[a], next_day).len(), 1);
    }

    #[test]
    fn frequency_gate_respects_custom_spacing() {
        let mut a = alert(AlertRule::Increase { target_price: 1_000_000.0 });
        a.frequency_hours = 6;
        a.last_triggered_at = Some(at(10).with_timezone(&Utc));

        assert_eq!(evaluate(&ctx(1_100_000.0), &[a.clone()], at(15)).len(), 0);
        assert_eq!(evaluate(&ctx(1_100_000.0), &[a], at(16)).len(), 1);
    }

    #[test]
    fn inactive_alerts_are_never_evaluated() {
        let mut a = alert(AlertRule::Increase { target_price: 1.0 });
        a.active = false;
        assert_eq!(evaluate(&ctx(1_000_000.0), &[a], at(10)).len(), 0);
    }

    #[test]
    fn returns_only_the_firing_subset() {
        let hit = alert(AlertRule::Increase { target_price: 1_050_000.0 });
        let miss = alert(AlertRule::Decrease { target_price: 900_000.0 });
        let fired = evaluate(&ctx(1_058_000.0), &[hit.clone(), miss], at(10));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, hit.id);
    }
}
