use crate::domain::price::{PriceSnapshot, SourceId};
use crate::ingest::error::SourceError;
use crate::ingest::source::{build_http_client, timeout_secs_from_env, PriceSourceClient};
use chrono::{DateTime, Utc};
use serde_json::Value;

const DEFAULT_URL: &str = "https://api.metals.live/v1/spot";

const TROY_OUNCE_GRAMS: f64 = 31.103_476_8;
const DEFAULT_USD_TO_IDR: f64 = 15_500.0;

// Spot is a mid price; retail quotes sit on either side of it.
const DEFAULT_SPREAD: f64 = 0.03;

/// Last-resort source: a spot API quoting gold in USD per troy ounce.
/// Normalization converts to IDR per gram and derives buy/sell quotes by
/// applying the configured spread above and below spot.
pub struct MetalsApiSource {
    http: reqwest::Client,
    url: String,
    timeout_secs: u64,
    usd_to_idr: f64,
    spread: f64,
}

impl MetalsApiSource {
    pub fn from_env() -> Result<Self, SourceError> {
        let url = std::env::var("METALS_API_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let timeout_secs = timeout_secs_from_env("METALS_TIMEOUT_SECS");
        let usd_to_idr = std::env::var("USD_TO_IDR")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(DEFAULT_USD_TO_IDR);
        let spread = std::env::var("METALS_SPREAD")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(DEFAULT_SPREAD);

        Ok(Self {
            http: build_http_client(timeout_secs)?,
            url,
            timeout_secs,
            usd_to_idr,
            spread,
        })
    }
}

#[async_trait::async_trait]
impl PriceSourceClient for MetalsApiSource {
    fn id(&self) -> SourceId {
        SourceId::Metals
    }

    async fn fetch(&self, fetched_at: DateTime<Utc>) -> Result<PriceSnapshot, SourceError> {
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, self.timeout_secs))?;

        let status = res.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!("HTTP {status} from spot API")));
        }

        let body: Value = res
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("spot API returned invalid JSON: {e}")))?;

        let spot_usd = gold_spot_usd(&body)?;
        let (per_gram, buy, sell) = convert_spot(spot_usd, self.usd_to_idr, self.spread);

        PriceSnapshot::new(fetched_at, buy, sell, per_gram, None, None, self.id())
            .map_err(|e| SourceError::Validation(e.to_string()))
    }
}

/// The API answers with an array of single-key objects, one per metal.
fn gold_spot_usd(body: &Value) -> Result<f64, SourceError> {
    let items = body
        .as_array()
        .ok_or_else(|| SourceError::Parse("expected a JSON array of spot quotes".into()))?;

    items
        .iter()
        .find_map(|item| item.get("gold").and_then(Value::as_f64))
        .ok_or_else(|| SourceError::Parse("gold quote not present in spot response".into()))
}

/// USD per troy ounce -> IDR per gram, with buy above and sell below spot
/// so the buy >= sell invariant holds by construction.
fn convert_spot(spot_usd: f64, usd_to_idr: f64, spread: f64) -> (f64, f64, f64) {
    let per_gram = (spot_usd * usd_to_idr / TROY_OUNCE_GRAMS).round();
    let buy = (per_gram * (1.0 + spread)).round();
    let sell = (per_gram * (1.0 - spread)).round();
    (per_gram, buy, sell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_troy_ounce_usd_to_gram_idr() {
        let (per_gram, buy, sell) = convert_spot(2_000.0, 15_500.0, 0.03);
        // 2000 * 15500 / 31.1034768 = 996,673.XX
        assert_eq!(per_gram, 996_673.0);
        assert_eq!(buy, 1_026_573.0);
        assert_eq!(sell, 966_773.0);
        assert!(buy >= sell);
    }

    #[test]
    fn zero_spread_collapses_quotes_onto_spot() {
        let (per_gram, buy, sell) = convert_spot(2_000.0, 15_500.0, 0.0);
        assert_eq!(buy, per_gram);
        assert_eq!(sell, per_gram);
    }

    #[test]
    fn finds_gold_entry_among_other_metals() {
        let body = json!([{"silver": 27.5}, {"gold": 2390.2}, {"platinum": 950.0}]);
        assert_eq!(gold_spot_usd(&body).unwrap(), 2390.2);
    }

    #[test]
    fn missing_gold_entry_is_a_parse_error() {
        let body = json!([{"silver": 27.5}]);
        assert!(matches!(gold_spot_usd(&body), Err(SourceError::Parse(_))));
    }

    #[test]
    fn non_array_body_is_a_parse_error() {
        let body = json!({"error": "rate limited"});
        assert!(matches!(gold_spot_usd(&body), Err(SourceError::Parse(_))));
    }
}
