use crate::types::{DexPair, TokenPairsResponse};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::debug;

/// Client for the DexScreener token endpoint. One HTTP request per lookup,
/// no retries: callers treat failures as "unknown token" (fail-closed).
#[derive(Clone)]
pub struct DexScreenerClient {
    base_url: String,
    client: reqwest::Client,
    min_volume_24h_usd: f64,
}

impl DexScreenerClient {
    pub fn new(base_url: &str, timeout: Duration, min_volume_24h_usd: f64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            min_volume_24h_usd,
        }
    }

    pub fn token_url(&self, mint: &str) -> String {
        format!(
            "{}/latest/dex/tokens/{}",
            self.base_url,
            urlencoding::encode(mint)
        )
    }

    /// Fetch all trading pairs referencing `mint`. An unknown token yields
    /// an empty list (`pairs: null` in the response body).
    pub async fn fetch_token_pairs(&self, mint: &str) -> Result<Vec<DexPair>> {
        let url = self.token_url(mint);
        debug!(mint = mint, "fetching dex pairs");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch pairs for {mint}"))?;

        let status = resp.status();
        if !status.is_success() {
            metrics::counter!("agents_market_lookup_errors_total").increment(1);
            anyhow::bail!("dexscreener returned {status} for {mint}");
        }

        let body: TokenPairsResponse = resp
            .json()
            .await
            .context("failed to deserialize dexscreener response")?;
        Ok(body.pairs.unwrap_or_default())
    }

    /// Whether `mint` clears the 24h volume threshold. Lookup failures and
    /// zero-pair responses both return false — a spam token and a token we
    /// could not check are excluded alike, never priced from thin air.
    pub async fn is_legitimate(&self, mint: &str) -> bool {
        match self.fetch_token_pairs(mint).await {
            Ok(pairs) => sum_volume_24h(&pairs) > self.min_volume_24h_usd,
            Err(e) => {
                debug!(mint = mint, error = %e, "legitimacy check failed, excluding token");
                false
            }
        }
    }

    /// Current USD spot price for `mint`: the first pair in DexScreener's own
    /// ordering (most liquid first). None when unknown, unpriced, or the
    /// lookup fails.
    pub async fn price_usd(&self, mint: &str) -> Option<f64> {
        match self.fetch_token_pairs(mint).await {
            Ok(pairs) => first_pair_price(&pairs),
            Err(e) => {
                debug!(mint = mint, error = %e, "price lookup failed");
                None
            }
        }
    }
}

/// Sum of 24h volume (USD) over all pairs. Unparsable or missing entries
/// contribute zero.
pub fn sum_volume_24h(pairs: &[DexPair]) -> f64 {
    pairs
        .iter()
        .filter_map(|p| p.volume.as_ref()?.h24.as_deref())
        .filter_map(|v| v.parse::<f64>().ok())
        .sum()
}

/// Price of the first pair, parsed from its decimal string.
pub fn first_pair_price(pairs: &[DexPair]) -> Option<f64> {
    pairs
        .first()?
        .price_usd
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PairVolume;

    fn pair(price: Option<&str>, h24: Option<&str>) -> DexPair {
        DexPair {
            price_usd: price.map(str::to_string),
            volume: Some(PairVolume {
                h24: h24.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_token_url_encodes_mint() {
        let client = DexScreenerClient::new(
            "https://api.dexscreener.com",
            Duration::from_secs(5),
            100_000.0,
        );
        let url = client.token_url("So11111111111111111111111111111111111111112");
        assert_eq!(
            url,
            "https://api.dexscreener.com/latest/dex/tokens/So11111111111111111111111111111111111111112"
        );
    }

    #[test]
    fn test_sum_volume_across_pairs() {
        let pairs = vec![
            pair(Some("1.0"), Some("60000")),
            pair(Some("0.99"), Some("40001")),
        ];
        assert!((sum_volume_24h(&pairs) - 100_001.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sum_volume_ignores_unparsable() {
        let pairs = vec![
            pair(Some("1.0"), Some("not-a-number")),
            pair(Some("1.0"), None),
            pair(Some("1.0"), Some("500.5")),
        ];
        assert!((sum_volume_24h(&pairs) - 500.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sum_volume_empty() {
        assert_eq!(sum_volume_24h(&[]), 0.0);
    }

    #[test]
    fn test_first_pair_price_takes_first() {
        let pairs = vec![pair(Some("2.00"), None), pair(Some("1.50"), None)];
        assert_eq!(first_pair_price(&pairs), Some(2.0));
    }

    #[test]
    fn test_first_pair_price_unparsable_is_none() {
        let pairs = vec![pair(Some("n/a"), None)];
        assert_eq!(first_pair_price(&pairs), None);
    }

    #[test]
    fn test_first_pair_price_empty_is_none() {
        assert_eq!(first_pair_price(&[]), None);
    }

    // Threshold boundary is exclusive: exactly 100k stays out.
    #[test]
    fn test_volume_boundary_exclusive() {
        let threshold = 100_000.0;
        let at = vec![pair(None, Some("100000"))];
        let above = vec![pair(None, Some("100001"))];
        assert!(!(sum_volume_24h(&at) > threshold));
        assert!(sum_volume_24h(&above) > threshold);
    }
}
