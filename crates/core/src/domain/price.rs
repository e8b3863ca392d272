use anyhow::ensure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CANONICAL_CURRENCY: &str = "IDR";
pub const CANONICAL_UNIT: &str = "gram";

/// Identifier of the provider that produced a snapshot. Doubles as the
/// cache key and the `?source=` query value on the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Emasku,
    Pegadaian,
    Metals,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Emasku => "emasku",
            SourceId::Pegadaian => "pegadaian",
            SourceId::Metals => "metals",
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emasku" => Ok(SourceId::Emasku),
            "pegadaian" => Ok(SourceId::Pegadaian),
            "metals" => Ok(SourceId::Metals),
            other => anyhow::bail!("unknown price source: {other}"),
        }
    }
}

/// One normalized gold price reading. Constructed only through
/// [`PriceSnapshot::new`], which enforces the pricing invariants; rows in
/// the database are append-only so a stored snapshot is never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub buy_price: f64,
    pub sell_price: f64,
    pub price_per_gram: f64,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub source: SourceId,
    pub currency: String,
    pub unit: String,
}

impl PriceSnapshot {
    /// All price fields must be strictly positive, and the retail buy
    /// quote can never be cheaper than the dealer's buy-back quote.
    /// Violations are normalization failures, never silently corrected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetched_at: DateTime<Utc>,
        buy_price: f64,
        sell_price: f64,
        price_per_gram: f64,
        high_price: Option<f64>,
        low_price: Option<f64>,
        source: SourceId,
    ) -> anyhow::Result<Self> {
        ensure!(
            buy_price > 0.0 && sell_price > 0.0 && price_per_gram > 0.0,
            "non-positive price from {source}: buy={buy_price}, sell={sell_price}, per_gram={price_per_gram}"
        );
        ensure!(
            buy_price >= sell_price,
            "inverted quotes from {source}: buy={buy_price} < sell={sell_price}"
        );
        if let Some(high) = high_price {
            ensure!(high > 0.0, "non-positive high price from {source}: {high}");
        }
        if let Some(low) = low_price {
            ensure!(low > 0.0, "non-positive low price from {source}: {low}");
        }

        Ok(Self {
            fetched_at,
            buy_price,
            sell_price,
            price_per_gram,
            high_price,
            low_price,
            source,
            currency: CANONICAL_CURRENCY.to_string(),
            unit: CANONICAL_UNIT.to_string(),
        })
    }
}

/// Current snapshot plus the previous one (when any exists), used both by
/// the alert evaluator and for day-over-day deltas in messages and API
/// responses.
#[derive(Debug, Clone)]
pub struct PriceContext {
    pub current: PriceSnapshot,
    pub previous: Option<PriceSnapshot>,
}

impl PriceContext {
    pub fn price_change(&self) -> f64 {
        self.previous
            .as_ref()
            .map(|p| self.current.price_per_gram - p.price_per_gram)
            .unwrap_or(0.0)
    }

    pub fn buy_price_change(&self) -> f64 {
        self.previous
            .as_ref()
            .map(|p| self.current.buy_price - p.buy_price)
            .unwrap_or(0.0)
    }

    pub fn sell_price_change(&self) -> f64 {
        self.previous
            .as_ref()
            .map(|p| self.current.sell_price - p.sell_price)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(buy: f64, sell: f64, per_gram: f64) -> anyhow::Result<PriceSnapshot> {
        PriceSnapshot::new(Utc::now(), buy, sell, per_gram, None, None, SourceId::Emasku)
    }

    #[test]
    fn accepts_valid_quotes() {
        let s = snapshot(1_874_000.0, 1_789_000.0, 1_874_000.0).unwrap();
        assert_eq!(s.currency, "IDR");
        assert_eq!(s.unit, "gram");
        assert_eq!(s.source, SourceId::Emasku);
    }

    #[test]
    fn rejects_non_positive_prices() {
        assert!(snapshot(0.0, 1_789_000.0, 1_874_000.0).is_err());
        assert!(snapshot(1_874_000.0, -1.0, 1_874_000.0).is_err());
        assert!(snapshot(1_874_000.0, 1_789_000.0, 0.0).is_err());
    }

    #[test]
    fn rejects_inverted_buy_sell() {
        let err = snapshot(1_789_000.0, 1_874_000.0, 1_789_000.0).unwrap_err();
        assert!(err.to_string().contains("inverted"));
    }

    #[test]
    fn equal_buy_and_sell_is_allowed() {
        assert!(snapshot(1_800_000.0, 1_800_000.0, 1_800_000.0).is_ok());
    }

    #[test]
    fn price_change_without_previous_is_zero() {
        let ctx = PriceContext {
            current: snapshot(1_874_000.0, 1_789_000.0, 1_874_000.0).unwrap(),
            previous: None,
        };
        assert_eq!(ctx.price_change(), 0.0);
    }

    #[test]
    fn price_change_against_previous() {
        let ctx = PriceContext {
            current: snapshot(1_874_000.0, 1_789_000.0, 1_874_000.0).unwrap(),
            previous: Some(snapshot(1_850_000.0, 1_760_000.0, 1_850_000.0).unwrap()),
        };
        assert_eq!(ctx.price_change(), 24_000.0);
        assert_eq!(ctx.buy_price_change(), 24_000.0);
        assert_eq!(ctx.sell_price_change(), 29_000.0);
    }

    #[test]
    fn source_id_round_trips_through_str() {
        for s in [SourceId::Emasku, SourceId::Pegadaian, SourceId::Metals] {
            assert_eq!(s.as_str().parse::<SourceId>().unwrap(), s);
        }
        assert!("antam".parse::<SourceId>().is_err());
    }
}
