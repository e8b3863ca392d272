use crate::domain::price::{PriceSnapshot, SourceId};
use crate::ingest::error::SourceError;
use crate::ingest::source::{
    build_http_client, extract_price, fetch_page, timeout_secs_from_env, PriceSourceClient,
};
use chrono::{DateTime, Utc};

const DEFAULT_URL: &str = "https://www.pegadaian.co.id/harga-emas";

// Pegadaian's buyback quote is frequently missing from the page; the
// historical ratio between buyback and the per-gram price is ~91.5%.
const SELL_ESTIMATE_RATIO: f64 = 0.915;

// How far past a label we look for its price cell.
const MARKER_WINDOW: usize = 200;

/// Secondary source. The Pegadaian page is label/value markup rather than
/// a table: a per-gram headline price plus labeled buy ("Harga Beli"),
/// sell ("Harga Jual") and daily high/low figures.
pub struct PegadaianSource {
    http: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl PegadaianSource {
    pub fn from_env() -> Result<Self, SourceError> {
        let url = std::env::var("PEGADAIAN_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let timeout_secs = timeout_secs_from_env("PEGADAIAN_TIMEOUT_SECS");
        Ok(Self {
            http: build_http_client(timeout_secs)?,
            url,
            timeout_secs,
        })
    }
}

#[async_trait::async_trait]
impl PriceSourceClient for PegadaianSource {
    fn id(&self) -> SourceId {
        SourceId::Pegadaian
    }

    async fn fetch(&self, fetched_at: DateTime<Utc>) -> Result<PriceSnapshot, SourceError> {
        let html = fetch_page(&self.http, &self.url, self.timeout_secs).await?;
        let parsed = parse_prices(&html)?;

        PriceSnapshot::new(
            fetched_at,
            parsed.buy,
            parsed.sell,
            parsed.per_gram,
            parsed.high,
            parsed.low,
            self.id(),
        )
        .map_err(|e| SourceError::Validation(e.to_string()))
    }
}

#[derive(Debug, PartialEq)]
struct ParsedPrices {
    per_gram: f64,
    buy: f64,
    sell: f64,
    high: Option<f64>,
    low: Option<f64>,
}

fn parse_prices(html: &str) -> Result<ParsedPrices, SourceError> {
    let per_gram = price_after(html, "data-price")
        .ok_or_else(|| SourceError::Parse("per-gram price not found".into()))?;

    let buy = price_after(html, "Harga Beli").unwrap_or(per_gram);
    let sell = price_after(html, "Harga Jual").unwrap_or(per_gram * SELL_ESTIMATE_RATIO);
    let high = price_after(html, "Tertinggi");
    let low = price_after(html, "Terendah");

    Ok(ParsedPrices {
        per_gram,
        buy,
        sell,
        high,
        low,
    })
}

fn price_after(html: &str, marker: &str) -> Option<f64> {
    let rest = &html[html.find(marker)? + marker.len()..];
    // Collect by chars so the window never splits a multi-byte character.
    let window: String = rest.chars().take(MARKER_WINDOW).collect();
    extract_price(&window)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="price-gold-chart"><span class="date">24 Agustus 2026</span></div>
        <div class="items-price"><span class="data-price">Rp 1.058.000</span></div>
        <div class="items-price">Harga Beli <span class="data-price">Rp 1.058.000</span></div>
        <div class="items-price">Harga Jual <span class="data-price">Rp 967.000</span></div>
        <div class="items-price">Tertinggi <span class="data-price">Rp 1.061.000</span></div>
        <div class="items-price">Terendah <span class="data-price">Rp 1.049.000</span></div>"#;

    #[test]
    fn parses_labeled_prices() {
        let parsed = parse_prices(PAGE).unwrap();
        assert_eq!(parsed.per_gram, 1_058_000.0);
        assert_eq!(parsed.buy, 1_058_000.0);
        assert_eq!(parsed.sell, 967_000.0);
        assert_eq!(parsed.high, Some(1_061_000.0));
        assert_eq!(parsed.low, Some(1_049_000.0));
    }

    #[test]
    fn estimates_missing_sell_quote() {
        let page = r#"<span class="data-price">Rp 1.000.000</span>"#;
        let parsed = parse_prices(page).unwrap();
        assert_eq!(parsed.buy, 1_000_000.0);
        assert_eq!(parsed.sell, 915_000.0);
        assert_eq!(parsed.high, None);
        assert_eq!(parsed.low, None);
    }

    #[test]
    fn page_without_prices_is_a_parse_error() {
        let err = parse_prices("<html><body>maintenance</body></html>").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
