use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pyth_sdk_solana::state::{load_price_account, PriceStatus};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;

use crate::errors::{MonitorError, Result};

/// Pyth SOL/USD price account (mainnet-beta).
pub const PYTH_SOL_USD: &str = "H6ARHf6YXhGYeQfUzQNGk6rDNnLBQKrenN712K4AQJEG";

pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Spot price of the collateral asset in the quote currency.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn spot_price(&self) -> Result<f64>;
}

/// Simple-price style HTTP API: `GET {url}?ids={asset}&vs_currencies={vs}`
/// answering `{ "<asset>": { "<vs>": <price> } }`.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    url: String,
    asset: String,
    vs: String,
}

impl HttpPriceFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            asset: "solana".to_string(),
            vs: "usd".to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn spot_price(&self) -> Result<f64> {
        let body: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(&self.url)
            .query(&[("ids", self.asset.as_str()), ("vs_currencies", self.vs.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = extract_price(&body, &self.asset, &self.vs)?;
        Ok(price)
    }
}

fn extract_price(
    body: &HashMap<String, HashMap<String, f64>>,
    asset: &str,
    vs: &str,
) -> Result<f64> {
    let price = body
        .get(asset)
        .and_then(|quotes| quotes.get(vs))
        .copied()
        .ok_or_else(|| MonitorError::Price(format!("missing {asset}/{vs} in response")))?;
    validate(price)
}

fn validate(price: f64) -> Result<f64> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(MonitorError::Price(format!("unusable price {price}")))
    }
}

/// Reads the aggregate price straight from a Pyth price account.
pub struct PythPriceFeed {
    rpc: RpcClient,
    account: Pubkey,
}

impl PythPriceFeed {
    pub fn new(rpc_url: String, account: Pubkey, timeout: Duration) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout(rpc_url, timeout),
            account,
        }
    }
}

#[async_trait]
impl PriceFeed for PythPriceFeed {
    async fn spot_price(&self) -> Result<f64> {
        let data = self.rpc.get_account_data(&self.account).await?;
        let price_account = load_price_account(&data)
            .map_err(|e| MonitorError::Price(format!("bad pyth account: {e:?}")))?;

        if price_account.agg.status != PriceStatus::Trading {
            return Err(MonitorError::Price(format!(
                "pyth aggregate not trading: {:?}",
                price_account.agg.status
            )));
        }

        validate(scale(price_account.agg.price, price_account.expo))
    }
}

fn scale(raw: i64, expo: i32) -> f64 {
    raw as f64 * 10f64.powi(expo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> HashMap<String, HashMap<String, f64>> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn reads_nested_quote() {
        let b = body(r#"{"solana":{"usd":142.37}}"#);
        assert_eq!(extract_price(&b, "solana", "usd").unwrap(), 142.37);
    }

    #[test]
    fn missing_quote_is_an_error() {
        let b = body(r#"{"solana":{"eur":130.0}}"#);
        assert!(matches!(extract_price(&b, "solana", "usd"), Err(MonitorError::Price(_))));
        let b = body(r#"{}"#);
        assert!(extract_price(&b, "solana", "usd").is_err());
    }

    #[test]
    fn zero_price_is_rejected() {
        let b = body(r#"{"solana":{"usd":0.0}}"#);
        assert!(extract_price(&b, "solana", "usd").is_err());
    }

    #[test]
    fn pyth_exponent_scaling() {
        assert!((scale(14_237_000_000, -8) - 142.37).abs() < 1e-9);
        assert_eq!(scale(5, 2), 500.0);
    }
}
