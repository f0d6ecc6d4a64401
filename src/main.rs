use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use position_monitor::api;
use position_monitor::config::{Config, PriceConfig, PriceSource, RawConfig};
use position_monitor::notify::{DryRunSink, NotificationSink};
use position_monitor::price::{HttpPriceFeed, PriceFeed, PythPriceFeed};
use position_monitor::store::PgStore;
use position_monitor::PositionHealthMonitor;

/// Position health monitor entrypoint.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Postgres connection string for positions and notifications
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Where the SOL price comes from
    #[arg(long, env = "PRICE_SOURCE", value_enum)]
    price_source: Option<PriceSource>,

    /// Simple-price API endpoint
    #[arg(long, env = "PRICE_API_URL")]
    price_api_url: Option<String>,

    /// RPC URL for Solana cluster (pyth price source)
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Pyth SOL/USD price account
    #[arg(long, env = "PYTH_PRICE_ACCOUNT")]
    pyth_price_account: Option<String>,

    /// Price used when the feed is unavailable
    #[arg(long, env = "FALLBACK_PRICE")]
    fallback_price: Option<f64>,

    /// Seconds between scans
    #[arg(long, env = "CHECK_INTERVAL_SECS")]
    check_interval_secs: Option<u64>,

    /// Hours before a wallet can get another warning alert
    #[arg(long, env = "WARNING_COOLDOWN_HOURS")]
    warning_cooldown_hours: Option<i64>,

    /// Deadline in seconds for price, history and dispatch calls
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Consecutive fallback-price scans before warning about a stale feed
    #[arg(long, env = "FALLBACK_ALERT_AFTER")]
    fallback_alert_after: Option<u32>,

    /// Admin API bind address
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Postgres pool size
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    db_max_connections: u32,

    /// Log alerts instead of writing notifications
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Run one scan then exit
    #[arg(long, action = ArgAction::SetTrue)]
    once: bool,
}

impl Cli {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            database_url: self.database_url.clone(),
            price_source: self.price_source,
            price_api_url: self.price_api_url.clone(),
            rpc_url: self.rpc_url.clone(),
            pyth_price_account: self.pyth_price_account.clone(),
            fallback_price: self.fallback_price,
            check_interval_secs: self.check_interval_secs,
            warning_cooldown_hours: self.warning_cooldown_hours,
            request_timeout_secs: self.request_timeout_secs,
            fallback_alert_after: self.fallback_alert_after,
            listen_addr: self.listen_addr.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    // Load .env before clap reads `env` fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = Config::from_env(cli.raw_config())?;

    let store = PgStore::connect(&cfg.database_url, cli.db_max_connections)
        .await
        .context("Failed to connect to database")?;

    let price_feed: Arc<dyn PriceFeed> = match cfg.price {
        PriceConfig::Http { url } => {
            info!(url = %url, "Using HTTP price feed");
            Arc::new(
                HttpPriceFeed::new(url, cfg.monitor.request_timeout)
                    .context("Failed to build HTTP client")?,
            )
        }
        PriceConfig::Pyth { rpc_url, account } => {
            info!(rpc = %rpc_url, account = %account, "Using Pyth price feed");
            Arc::new(PythPriceFeed::new(rpc_url, account, cfg.monitor.request_timeout))
        }
    };

    let sink: Arc<dyn NotificationSink> = if cli.dry_run {
        Arc::new(DryRunSink::new(store.clone()))
    } else {
        Arc::new(store.clone())
    };

    let monitor = Arc::new(PositionHealthMonitor::new(
        Arc::new(store),
        price_feed,
        sink,
        cfg.monitor,
    ));

    if cli.once {
        monitor
            .check_all_positions()
            .await
            .context("Health scan failed")?;
        return Ok(());
    }

    monitor.start();

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, dry_run = cli.dry_run, "Admin API listening");

    axum::serve(listener, api::router(Arc::clone(&monitor)))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("Admin API failed")?;

    monitor.stop();
    info!("Shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn every_setting_has_an_env_fallback() {
        let cmd = Cli::command();
        for id in ["database_url", "price_source", "check_interval_secs", "listen_addr"] {
            let arg = cmd
                .get_arguments()
                .find(|a| a.get_id() == id)
                .unwrap_or_else(|| panic!("missing arg {id}"));
            assert!(arg.get_env().is_some(), "{id} has no env fallback");
        }
    }

    #[test]
    fn flags_map_into_raw_config() {
        let cli = Cli::try_parse_from([
            "position-monitor",
            "--price-source",
            "pyth",
            "--check-interval-secs",
            "5",
            "--dry-run",
        ])
        .unwrap();
        let raw = cli.raw_config();
        assert_eq!(raw.price_source, Some(PriceSource::Pyth));
        assert_eq!(raw.check_interval_secs, Some(5));
        assert!(cli.dry_run);
    }
}
