use serde::{Deserialize, Serialize};

/// One legitimate token position inside a [`BalanceSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub mint: String,
    pub balance: f64,
    pub decimals: u8,
    #[serde(rename = "usdValue")]
    pub usd_value: Option<f64>,
}

/// Point-in-time valuation of one wallet. The only artifact the balance
/// pipeline produces; serialized to the API caller and reduced to two
/// scalar columns (`current_sol`, `current_usd`) on the agent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    #[serde(rename = "solBalance")]
    pub sol_balance: f64,
    #[serde(rename = "solValue")]
    pub sol_value: f64,
    pub tokens: Vec<TokenBalance>,
    #[serde(rename = "totalUsdValue")]
    pub total_usd_value: f64,
    #[serde(rename = "totalSolValue")]
    pub total_sol_value: f64,
}

/// Response of DexScreener `GET /latest/dex/tokens/{mint}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// Trading pair from DexScreener. Prices and volumes arrive as decimal
/// strings; anything unparsable is treated the same as absent.
#[derive(Debug, Clone, Deserialize)]
pub struct DexPair {
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    pub volume: Option<PairVolume>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairVolume {
    pub h24: Option<String>,
}

/// One SPL token account owned by a wallet, as reported by
/// `getTokenAccountsByOwner` with `jsonParsed` encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAccountBalance {
    pub mint: String,
    /// Balance in UI units (raw amount scaled by `decimals`).
    pub ui_amount: f64,
    pub decimals: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snap = BalanceSnapshot {
            sol_balance: 10.0,
            sol_value: 1500.0,
            tokens: vec![TokenBalance {
                mint: "M1".to_string(),
                balance: 5.0,
                decimals: 0,
                usd_value: Some(10.0),
            }],
            total_usd_value: 1510.0,
            total_sol_value: 10.066_666_666_666_666,
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["solBalance"], 10.0);
        assert_eq!(json["solValue"], 1500.0);
        assert_eq!(json["totalUsdValue"], 1510.0);
        assert_eq!(json["tokens"][0]["usdValue"], 10.0);
    }

    #[test]
    fn test_parse_dexscreener_pairs() {
        let json = r#"{"pairs":[{"priceUsd":"2.00","volume":{"h24":"250000"}},{"priceUsd":"1.98","volume":{"h24":"1200.5"}}]}"#;
        let resp: TokenPairsResponse = serde_json::from_str(json).unwrap();
        let pairs = resp.pairs.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].price_usd.as_deref(), Some("2.00"));
        assert_eq!(
            pairs[1].volume.as_ref().unwrap().h24.as_deref(),
            Some("1200.5")
        );
    }

    #[test]
    fn test_parse_dexscreener_null_pairs() {
        // DexScreener returns {"pairs": null} for unknown tokens.
        let resp: TokenPairsResponse = serde_json::from_str(r#"{"pairs":null}"#).unwrap();
        assert!(resp.pairs.is_none());
    }

    #[test]
    fn test_parse_dexscreener_pair_missing_fields() {
        let resp: TokenPairsResponse =
            serde_json::from_str(r#"{"pairs":[{"volume":{}}]}"#).unwrap();
        let pairs = resp.pairs.unwrap();
        assert!(pairs[0].price_usd.is_none());
        assert!(pairs[0].volume.as_ref().unwrap().h24.is_none());
    }
}
