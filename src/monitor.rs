use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::{MonitorError, Result};
use crate::health::{classify_ratio, collateral_ratio, HealthTier, PositionHealth};
use crate::models::{HealthSummary, NotificationKind, Position};
use crate::notify::{HealthAlert, NotificationSink};
use crate::price::PriceFeed;
use crate::store::PositionStore;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_WARNING_COOLDOWN_HOURS: i64 = 4;
/// Price used when the feed fails, USD per SOL.
pub const DEFAULT_FALLBACK_PRICE: f64 = 100.0;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FALLBACK_ALERT_AFTER: u32 = 5;

/// Tunables for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub check_interval: Duration,
    /// Suppression window for repeated warning alerts to one wallet.
    pub warning_cooldown: chrono::Duration,
    pub fallback_price: f64,
    /// Deadline for each price fetch, dedup query and dispatch.
    pub request_timeout: Duration,
    /// Consecutive fallback-price scans before the staleness warning fires.
    pub fallback_alert_after: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            warning_cooldown: chrono::Duration::hours(DEFAULT_WARNING_COOLDOWN_HOURS),
            fallback_price: DEFAULT_FALLBACK_PRICE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fallback_alert_after: DEFAULT_FALLBACK_ALERT_AFTER,
        }
    }
}

/// Periodically scans active positions and alerts owners of at-risk ones.
///
/// One instance is built in `main` and shared behind an `Arc` with the
/// admin API. The scheduled loop checks the running flag on every tick, so
/// `stop` takes effect at the next tick and never interrupts a scan.
pub struct PositionHealthMonitor {
    positions: Arc<dyn PositionStore>,
    price_feed: Arc<dyn PriceFeed>,
    sink: Arc<dyn NotificationSink>,
    settings: MonitorSettings,
    running: AtomicBool,
    // Bumped on every start so a loop left over from before a stop/start
    // pair exits on its next tick.
    generation: AtomicU64,
    scan_guard: Mutex<()>,
    fallback_streak: AtomicU32,
}

impl PositionHealthMonitor {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        price_feed: Arc<dyn PriceFeed>,
        sink: Arc<dyn NotificationSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            positions,
            price_feed,
            sink,
            settings,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            scan_guard: Mutex::new(()),
            fallback_streak: AtomicU32::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consecutive scans that ran against the fallback price.
    pub fn fallback_streak(&self) -> u32 {
        self.fallback_streak.load(Ordering::SeqCst)
    }

    /// Start periodic monitoring. Returns `false` if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Position health monitor already running");
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            interval_secs = self.settings.check_interval.as_secs(),
            "Starting position health monitor"
        );

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run(generation).await });
        true
    }

    /// Stop periodic monitoring. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            info!("Stopping position health monitor");
        }
        was_running
    }

    fn is_live(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run(&self, generation: u64) {
        // First tick completes immediately.
        let mut timer = interval(self.settings.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            if !self.is_live(generation) {
                debug!(generation, "Monitor loop exiting");
                break;
            }
            self.check_now().await;
        }
    }

    /// Run one scan unless another is in flight. Returns whether it ran.
    pub async fn check_now(&self) -> bool {
        let Ok(_guard) = self.scan_guard.try_lock() else {
            warn!("Previous health scan still running, skipping");
            return false;
        };

        if let Err(e) = self.check_all_positions().await {
            error!(error = %e, "Error checking positions");
        }
        true
    }

    /// Scan all active positions once and dispatch alerts.
    pub async fn check_all_positions(&self) -> Result<()> {
        let positions = self.positions.active_positions().await?;
        if positions.is_empty() {
            debug!("No active positions to check");
            return Ok(());
        }

        let (price, live) = self.price_or_fallback().await;
        self.track_price_source(live);

        info!(count = positions.len(), price, "Checking position health");

        for position in &positions {
            match self.check_position_health(position, price).await {
                Ok(health) if health.should_notify => self.send_health_alert(&health).await,
                Ok(_) => {}
                Err(e) => warn!(position = %position.pubkey, error = %e, "Failed to check position"),
            }
        }

        Ok(())
    }

    /// Classify one position against `price` and decide whether to alert.
    pub async fn check_position_health(
        &self,
        position: &Position,
        price: f64,
    ) -> Result<PositionHealth> {
        position.pubkey()?;
        position.owner()?;

        let ratio = collateral_ratio(position, price);
        let health = classify_ratio(ratio);
        let should_notify = match health {
            HealthTier::Critical => true,
            HealthTier::Warning => self.should_send_warning(&position.owner).await,
            HealthTier::Healthy => false,
        };

        Ok(PositionHealth {
            pubkey: position.pubkey.clone(),
            owner: position.owner.clone(),
            collateral_ratio: ratio,
            health,
            should_notify,
        })
    }

    /// False only when the wallet got a warning inside the cooldown window.
    /// Fails open.
    async fn should_send_warning(&self, wallet: &str) -> bool {
        let since = warning_cutoff(Utc::now(), self.settings.warning_cooldown);
        let recent = self.with_timeout(
            "notification history query",
            self.sink
                .has_recent(wallet, NotificationKind::PositionHealthWarning, since),
        );

        match recent.await {
            Ok(recent) => !recent,
            Err(e) => {
                warn!(wallet, error = %e, "Dedup check failed, notifying anyway");
                true
            }
        }
    }

    async fn send_health_alert(&self, health: &PositionHealth) {
        let alert = HealthAlert {
            wallet: health.owner.clone(),
            position: health.pubkey.clone(),
            collateral_ratio: health.collateral_ratio,
            health: health.health,
        };

        let sent = self.with_timeout(
            "notification dispatch",
            self.sink.notify_position_health_warning(&alert),
        );

        match sent.await {
            Ok(()) => {
                info!(
                    wallet = %alert.wallet,
                    position = %alert.position,
                    ratio = %format!("{:.1}", alert.collateral_ratio),
                    health = alert.health.as_str(),
                    "Sent health alert"
                );
                self.update_last_notified(&alert.wallet, &alert.position);
            }
            Err(e) => error!(
                wallet = %alert.wallet,
                position = %alert.position,
                error = %e,
                "Failed to send health alert"
            ),
        }
    }

    /// Hook for a dedicated last-notified table. Dedup is currently derived
    /// from the notification history, so there is nothing to record.
    fn update_last_notified(&self, _wallet: &str, _position: &str) {}

    /// Current SOL price, or the configured fallback if the feed fails.
    pub async fn get_sol_price(&self) -> f64 {
        self.price_or_fallback().await.0
    }

    async fn price_or_fallback(&self) -> (f64, bool) {
        match self
            .with_timeout("price fetch", self.price_feed.spot_price())
            .await
        {
            Ok(price) => (price, true),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = self.settings.fallback_price,
                    "Price feed failed, using fallback price"
                );
                (self.settings.fallback_price, false)
            }
        }
    }

    fn track_price_source(&self, live: bool) {
        if live {
            self.fallback_streak.store(0, Ordering::SeqCst);
            return;
        }

        let streak = self.fallback_streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak >= self.settings.fallback_alert_after {
            warn!(
                consecutive_scans = streak,
                fallback = self.settings.fallback_price,
                "Health scans are running on the fallback price"
            );
        }
    }

    /// Fresh classification pass. Never dispatches notifications.
    pub async fn get_health_summary(&self) -> Result<HealthSummary> {
        let positions = self.positions.active_positions().await?;
        let mut summary = HealthSummary::default();
        if positions.is_empty() {
            return Ok(summary);
        }

        let price = self.get_sol_price().await;
        for position in &positions {
            summary.total += 1;
            match classify_ratio(collateral_ratio(position, price)) {
                HealthTier::Healthy => summary.healthy += 1,
                HealthTier::Warning => summary.warning += 1,
                HealthTier::Critical => summary.critical += 1,
            }
        }

        Ok(summary)
    }

    async fn with_timeout<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        timeout(self.settings.request_timeout, fut)
            .await
            .map_err(|_| MonitorError::Timeout(what))?
    }
}

/// Start of the warning cooldown window ending at `now`.
fn warning_cutoff(now: DateTime<Utc>, cooldown: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(cooldown)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_cooldown_before_now() {
        let now = Utc::now();
        let cutoff = warning_cutoff(now, chrono::Duration::hours(4));
        assert_eq!(now - cutoff, chrono::Duration::hours(4));
    }

    #[test]
    fn cutoff_saturates_instead_of_overflowing() {
        let cutoff = warning_cutoff(Utc::now(), chrono::Duration::MAX);
        assert_eq!(cutoff, DateTime::<Utc>::MIN_UTC);
    }
}
