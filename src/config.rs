use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use dotenvy::dotenv;
use solana_sdk::pubkey::Pubkey;

use crate::monitor::MonitorSettings;
use crate::price::{DEFAULT_PRICE_API_URL, PYTH_SOL_USD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriceSource {
    /// Simple-price HTTP API
    Http,
    /// On-chain Pyth price account
    Pyth,
}

/// Values read from the command line or environment before validation.
#[derive(Debug, Default)]
pub struct RawConfig {
    pub database_url: Option<String>,
    pub price_source: Option<PriceSource>,
    pub price_api_url: Option<String>,
    pub rpc_url: Option<String>,
    pub pyth_price_account: Option<String>,
    pub fallback_price: Option<f64>,
    pub check_interval_secs: Option<u64>,
    pub warning_cooldown_hours: Option<i64>,
    pub request_timeout_secs: Option<u64>,
    pub fallback_alert_after: Option<u32>,
    pub listen_addr: Option<String>,
}

pub enum PriceConfig {
    Http { url: String },
    Pyth { rpc_url: String, account: Pubkey },
}

/// Runtime configuration loaded from environment and CLI.
pub struct Config {
    pub database_url: String,
    pub price: PriceConfig,
    pub listen_addr: SocketAddr,
    pub monitor: MonitorSettings,
}

/// Longest accepted warning cooldown, one year.
pub const MAX_WARNING_COOLDOWN_HOURS: i64 = 24 * 365;

impl FromStr for PriceSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

/// CLI value if given, else the environment variable `key`.
fn env_or<T>(cli: Option<T>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    if cli.is_some() {
        return Ok(cli);
    }
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {key}={value}: {e}")),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from `.env` and the environment, with CLI values taking priority.
    pub fn from_env(raw: RawConfig) -> Result<Self> {
        dotenv().ok();

        let database_url = env_or(raw.database_url, "DATABASE_URL")?
            .context("DATABASE_URL is not set")?;

        let price = match env_or(raw.price_source, "PRICE_SOURCE")?.unwrap_or(PriceSource::Http) {
            PriceSource::Http => PriceConfig::Http {
                url: env_or(raw.price_api_url, "PRICE_API_URL")?
                    .unwrap_or_else(|| DEFAULT_PRICE_API_URL.to_string()),
            },
            PriceSource::Pyth => {
                let rpc_url = env_or(raw.rpc_url, "RPC_URL")?
                    .unwrap_or_else(|| "https://api.mainnet-beta.solana.com".to_string());
                let account = env_or(raw.pyth_price_account, "PYTH_PRICE_ACCOUNT")?
                    .unwrap_or_else(|| PYTH_SOL_USD.to_string());
                let account = account
                    .parse()
                    .map_err(|e| anyhow!("Invalid Pyth price account {account}: {e}"))?;
                PriceConfig::Pyth { rpc_url, account }
            }
        };

        let listen_addr = env_or(raw.listen_addr, "LISTEN_ADDR")?
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let listen_addr = listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {listen_addr}"))?;

        let mut monitor = MonitorSettings::default();
        if let Some(secs) = env_or(raw.check_interval_secs, "CHECK_INTERVAL_SECS")? {
            if secs == 0 {
                bail!("CHECK_INTERVAL_SECS must be positive");
            }
            monitor.check_interval = Duration::from_secs(secs);
        }
        if let Some(hours) = env_or(raw.warning_cooldown_hours, "WARNING_COOLDOWN_HOURS")? {
            if !(0..=MAX_WARNING_COOLDOWN_HOURS).contains(&hours) {
                bail!("WARNING_COOLDOWN_HOURS must be between 0 and {MAX_WARNING_COOLDOWN_HOURS}");
            }
            monitor.warning_cooldown = chrono::Duration::try_hours(hours)
                .context("WARNING_COOLDOWN_HOURS out of range")?;
        }
        if let Some(price) = env_or(raw.fallback_price, "FALLBACK_PRICE")? {
            if !(price.is_finite() && price > 0.0) {
                bail!("FALLBACK_PRICE must be a positive number");
            }
            monitor.fallback_price = price;
        }
        if let Some(secs) = env_or(raw.request_timeout_secs, "REQUEST_TIMEOUT_SECS")? {
            if secs == 0 {
                bail!("REQUEST_TIMEOUT_SECS must be positive");
            }
            monitor.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_or(raw.fallback_alert_after, "FALLBACK_ALERT_AFTER")? {
            monitor.fallback_alert_after = n.max(1);
        }

        Ok(Self {
            database_url,
            price,
            listen_addr,
            monitor,
        })
    }
}
