//! Collateral health monitoring for stablecoin debt positions.
//!
//! [`monitor::PositionHealthMonitor`] scans open positions on a fixed
//! interval, classifies each against the SOL spot price and writes
//! deduplicated alerts to the owner's notification feed.

pub mod api;
pub mod config;
pub mod errors;
pub mod health;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod price;
pub mod store;

pub use errors::{MonitorError, Result};
pub use monitor::{MonitorSettings, PositionHealthMonitor};
