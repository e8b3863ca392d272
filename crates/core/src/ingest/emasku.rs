use crate::domain::price::{PriceSnapshot, SourceId};
use crate::ingest::error::SourceError;
use crate::ingest::source::{
    build_http_client, extract_prices, fetch_page, timeout_secs_from_env, PriceSourceClient,
};
use chrono::{DateTime, Utc};

const DEFAULT_URL: &str = "https://emasku.co.id/Harga_emas";

/// Primary source. Emasku publishes a price table with a REGULAR section;
/// the 1 gram row carries the retail (buy) and buyback (sell) quotes in
/// IDR, already per gram.
pub struct EmaskuSource {
    http: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl EmaskuSource {
    pub fn from_env() -> Result<Self, SourceError> {
        let url = std::env::var("EMASKU_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let timeout_secs = timeout_secs_from_env("EMASKU_TIMEOUT_SECS");
        Ok(Self {
            http: build_http_client(timeout_secs)?,
            url,
            timeout_secs,
        })
    }
}

#[async_trait::async_trait]
impl PriceSourceClient for EmaskuSource {
    fn id(&self) -> SourceId {
        SourceId::Emasku
    }

    async fn fetch(&self, fetched_at: DateTime<Utc>) -> Result<PriceSnapshot, SourceError> {
        let html = fetch_page(&self.http, &self.url, self.timeout_secs).await?;
        let (buy, sell) = parse_regular_one_gram(&html)?;

        PriceSnapshot::new(fetched_at, buy, sell, buy, None, None, self.id())
            .map_err(|e| SourceError::Validation(e.to_string()))
    }
}

/// Locates the 1 gram row of the REGULAR section and reads its two price
/// cells (buy first, then sell).
fn parse_regular_one_gram(html: &str) -> Result<(f64, f64), SourceError> {
    let regular = html
        .find("REGULAR")
        .map(|i| &html[i..])
        .ok_or_else(|| SourceError::Parse("REGULAR section not found".into()))?;

    let row_start = regular
        .find("1 gr")
        .map(|i| &regular[i..])
        .ok_or_else(|| SourceError::Parse("1 gram row not found in REGULAR section".into()))?;
    let row = match row_start.find("</tr>") {
        Some(end) => &row_start[..end],
        None => row_start,
    };

    let prices = extract_prices(row);
    match prices.as_slice() {
        [buy, sell, ..] => Ok((*buy, *sell)),
        _ => Err(SourceError::Parse(format!(
            "expected buy and sell cells in 1 gram row, found {} price(s)",
            prices.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <table class="table">
          <tr><th colspan="5">REGULAR</th></tr>
          <tr><td>0.5 gr</td><td>Rp.</td><td class="text-end">962,000</td><td>Rp.</td><td class="text-end">915,000</td></tr>
          <tr><td>1 gr</td><td>Rp.</td><td class="text-end">1,874,000</td><td>Rp.</td><td class="text-end">1,789,000</td></tr>
          <tr><td>2 gr</td><td>Rp.</td><td class="text-end">3,718,000</td><td>Rp.</td><td class="text-end">3,578,000</td></tr>
        </table>"#;

    #[test]
    fn parses_one_gram_row() {
        let (buy, sell) = parse_regular_one_gram(PAGE).unwrap();
        assert_eq!(buy, 1_874_000.0);
        assert_eq!(sell, 1_789_000.0);
    }

    #[test]
    fn missing_regular_section_is_a_parse_error() {
        let err = parse_regular_one_gram("<table><tr><td>1 gr</td></tr></table>").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
        assert!(err.to_string().contains("REGULAR"));
    }

    #[test]
    fn missing_one_gram_row_is_a_parse_error() {
        let err = parse_regular_one_gram("REGULAR <tr><td>5 gr</td></tr>").unwrap_err();
        assert!(err.to_string().contains("1 gram row"));
    }

    #[test]
    fn row_with_single_price_cell_is_rejected() {
        let err =
            parse_regular_one_gram("REGULAR <tr><td>1 gr</td><td>1,874,000</td></tr>").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
