use anyhow::Result;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub database: Database,
    pub solana: Solana,
    pub dexscreener: Dexscreener,
    pub refresh: Refresh,
    pub server: Option<Server>,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct Solana {
    pub rpc_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Dexscreener {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// 24h volume (USD) a token must strictly exceed to be valued.
    pub min_volume_24h_usd: f64,
    /// Upper bound on concurrent market-data lookups per snapshot.
    pub max_concurrent_lookups: usize,
}

#[derive(Debug, Deserialize)]
pub struct Refresh {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub prometheus_port: Option<u16>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let content = std::fs::read_to_string("config/default.toml")?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_default_config() {
        let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert!(config.solana.rpc_url.starts_with("https://"));
        assert!(config.dexscreener.min_volume_24h_usd > 0.0);
        assert!(config.dexscreener.max_concurrent_lookups > 0);
        assert!(config.refresh.interval_secs > 0);
    }

    #[test]
    fn test_server_config_section() {
        let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        let server = config.server.expect("server section should be present");
        assert_eq!(server.port, 8080);
        assert_eq!(server.host, "0.0.0.0");
    }

    #[test]
    fn test_server_config_optional() {
        // Config without [server] section should still parse
        let toml = r#"
[general]
log_level = "debug"

[database]
path = "data/agents.db"

[solana]
rpc_url = "https://api.mainnet-beta.solana.com"
request_timeout_secs = 10

[dexscreener]
base_url = "https://api.dexscreener.com"
request_timeout_secs = 5
min_volume_24h_usd = 100000.0
max_concurrent_lookups = 8

[refresh]
enabled = true
interval_secs = 300
"#;
        let config = Config::from_toml_str(toml).unwrap();
        assert!(config.server.is_none());
        assert_eq!(config.dexscreener.request_timeout_secs, 5);
    }
}
