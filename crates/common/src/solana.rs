use crate::types::TokenAccountBalance;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// SPL token program — the filter for `getTokenAccountsByOwner`.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Wrapped SOL mint, used to price the native balance on DexScreener.
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// A syntactically valid Solana account key: base58, decoding to 32 bytes.
pub fn is_valid_address(addr: &str) -> bool {
    bs58::decode(addr)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

/// Read-only JSON-RPC client against a public Solana endpoint. All calls use
/// `confirmed` commitment — the fastest finality level is enough for a
/// best-effort valuation.
#[derive(Clone)]
pub struct SolanaRpcClient {
    rpc_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    account: AccountInfo,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    data: AccountData,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    parsed: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    info: ParsedTokenInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenInfo {
    mint: String,
    #[serde(rename = "tokenAmount")]
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    #[serde(rename = "uiAmount")]
    ui_amount: Option<f64>,
    #[serde(rename = "uiAmountString")]
    ui_amount_string: Option<String>,
    decimals: u8,
}

impl TokenAmount {
    /// `uiAmount` is null for some legacy accounts; the string form is the
    /// documented fallback.
    fn ui_amount_or_parse(&self) -> f64 {
        self.ui_amount
            .or_else(|| {
                self.ui_amount_string
                    .as_deref()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(0.0)
    }
}

impl SolanaRpcClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("solana rpc {method} request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            metrics::counter!("agents_ledger_rpc_errors_total").increment(1);
            anyhow::bail!("solana rpc {method} returned {status}");
        }

        let envelope: RpcEnvelope<T> = resp
            .json()
            .await
            .with_context(|| format!("failed to deserialize {method} response"))?;

        if let Some(err) = envelope.error {
            metrics::counter!("agents_ledger_rpc_errors_total").increment(1);
            anyhow::bail!("solana rpc {method} error {}: {}", err.code, err.message);
        }
        envelope
            .result
            .with_context(|| format!("solana rpc {method} returned no result"))
    }

    /// Native balance in lamports.
    pub async fn get_balance(&self, address: &str) -> Result<u64> {
        let result: RpcValue<u64> = self
            .call(
                "getBalance",
                json!([address, { "commitment": "confirmed" }]),
            )
            .await?;
        debug!(address = address, lamports = result.value, "fetched balance");
        Ok(result.value)
    }

    /// All SPL token accounts owned by `address`, in ledger order.
    pub async fn get_token_accounts(&self, address: &str) -> Result<Vec<TokenAccountBalance>> {
        let result: RpcValue<Vec<KeyedAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    address,
                    { "programId": TOKEN_PROGRAM_ID },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;

        let accounts = result
            .value
            .into_iter()
            .map(|keyed| {
                let info = keyed.account.data.parsed.info;
                TokenAccountBalance {
                    ui_amount: info.token_amount.ui_amount_or_parse(),
                    decimals: info.token_amount.decimals,
                    mint: info.mint,
                }
            })
            .collect::<Vec<_>>();

        debug!(address = address, count = accounts.len(), "fetched token accounts");
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address_wrapped_sol_mint() {
        assert!(is_valid_address(WRAPPED_SOL_MINT));
    }

    #[test]
    fn test_valid_address_token_program() {
        assert!(is_valid_address(TOKEN_PROGRAM_ID));
    }

    #[test]
    fn test_invalid_address_short() {
        assert!(!is_valid_address("abc"));
    }

    #[test]
    fn test_invalid_address_bad_alphabet() {
        // 0, O, I, l are not in the base58 alphabet
        assert!(!is_valid_address("0OIl111111111111111111111111111111111111111"));
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_parse_get_balance_envelope() {
        let json = r#"{"jsonrpc":"2.0","result":{"context":{"slot":123},"value":10000000000},"id":1}"#;
        let envelope: RpcEnvelope<RpcValue<u64>> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.result.unwrap().value, 10_000_000_000);
    }

    #[test]
    fn test_parse_rpc_error_envelope() {
        let json = r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid param"},"id":1}"#;
        let envelope: RpcEnvelope<RpcValue<u64>> = serde_json::from_str(json).unwrap();
        assert!(envelope.result.is_none());
        let err = envelope.error.unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Invalid param");
    }

    #[test]
    fn test_parse_token_accounts_response() {
        let json = r#"{
            "context": {"slot": 1},
            "value": [{
                "pubkey": "acc1",
                "account": {
                    "data": {
                        "program": "spl-token",
                        "parsed": {
                            "type": "account",
                            "info": {
                                "mint": "MintA11111111111111111111111111111111111111",
                                "tokenAmount": {
                                    "amount": "5000000",
                                    "decimals": 6,
                                    "uiAmount": 5.0,
                                    "uiAmountString": "5"
                                }
                            }
                        }
                    }
                }
            }]
        }"#;
        let value: RpcValue<Vec<KeyedAccount>> = serde_json::from_str(json).unwrap();
        let info = &value.value[0].account.data.parsed.info;
        assert_eq!(info.mint, "MintA11111111111111111111111111111111111111");
        assert_eq!(info.token_amount.decimals, 6);
        assert!((info.token_amount.ui_amount_or_parse() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ui_amount_null_falls_back_to_string() {
        let amount = TokenAmount {
            ui_amount: None,
            ui_amount_string: Some("12.5".to_string()),
            decimals: 1,
        };
        assert!((amount.ui_amount_or_parse() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ui_amount_missing_everywhere_is_zero() {
        let amount = TokenAmount {
            ui_amount: None,
            ui_amount_string: None,
            decimals: 0,
        };
        assert_eq!(amount.ui_amount_or_parse(), 0.0);
    }
}
