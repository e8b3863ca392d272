use crate::domain::price::{PriceSnapshot, SourceId};
use crate::ingest::error::SourceError;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

// Scraped sites serve a different (sometimes empty) page to obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// One external gold price provider. Implementations fetch a single
/// reading and normalize it to a validated [`PriceSnapshot`] in IDR per
/// gram; anything that cannot be normalized is a [`SourceError`], and the
/// aggregator moves on to the next source.
#[async_trait::async_trait]
pub trait PriceSourceClient: Send + Sync {
    fn id(&self) -> SourceId;

    async fn fetch(&self, fetched_at: DateTime<Utc>) -> Result<PriceSnapshot, SourceError>;
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SourceError::Transport(format!("failed to build http client: {e}")))
}

pub(crate) fn timeout_secs_from_env(var: &str) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

pub(crate) async fn fetch_page(
    http: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<String, SourceError> {
    let res = http
        .get(url)
        .header("Accept", "text/html,application/xhtml+xml,application/xml")
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout_secs))?;

    let status = res.status();
    if !status.is_success() {
        return Err(SourceError::Transport(format!("HTTP {status} from {url}")));
    }

    res.text()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout_secs))
}

/// Pulls the first grouped price figure out of a fragment of page text,
/// e.g. "Rp. 1,874,000" or "1.874.000" -> 1874000. Groups shorter than
/// four digits are ignored so table ordinals ("1 gr") don't match.
pub(crate) fn extract_price(text: &str) -> Option<f64> {
    extract_prices(text).into_iter().next()
}

pub(crate) fn extract_prices(text: &str) -> Vec<f64> {
    let mut out = Vec::new();
    let mut digits = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if (c == ',' || c == '.')
            && !digits.is_empty()
            && chars.peek().is_some_and(|n| n.is_ascii_digit())
        {
            // Thousands separator inside a number; skip it.
        } else {
            flush_group(&mut digits, &mut out);
        }
    }
    flush_group(&mut digits, &mut out);
    out
}

fn flush_group(digits: &mut String, out: &mut Vec<f64>) {
    if digits.len() >= 4 {
        if let Ok(n) = digits.parse::<f64>() {
            out.push(n);
        }
    }
    digits.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_comma_grouped_price() {
        assert_eq!(extract_price("Rp. 1,874,000"), Some(1_874_000.0));
    }

    #[test]
    fn extracts_dot_grouped_price() {
        assert_eq!(extract_price("Rp 1.058.000 / gram"), Some(1_058_000.0));
    }

    #[test]
    fn ignores_short_digit_runs() {
        assert_eq!(extract_price("1 gr"), None);
        assert_eq!(extract_price("weight: 100 gr, price 967,000"), Some(967_000.0));
    }

    #[test]
    fn extracts_multiple_prices_in_order() {
        let cells = "<td>1 gr</td><td>Rp.</td><td>1,874,000</td><td>Rp.</td><td>1,789,000</td>";
        assert_eq!(extract_prices(cells), vec![1_874_000.0, 1_789_000.0]);
    }

    #[test]
    fn no_price_in_plain_text() {
        assert!(extract_prices("Harga Emas Hari Ini").is_empty());
    }
}
