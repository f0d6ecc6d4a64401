use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use crate::errors::Result;
use crate::health::{HealthTier, LIQUIDATION_THRESHOLD};
use crate::models::NotificationKind;

/// Alert for one at-risk position.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthAlert {
    pub wallet: String,
    pub position: String,
    pub collateral_ratio: f64,
    pub health: HealthTier,
}

impl HealthAlert {
    pub fn kind(&self) -> NotificationKind {
        NotificationKind::PositionHealthWarning
    }

    pub fn title(&self) -> &'static str {
        match self.health {
            HealthTier::Critical => "Position at risk of liquidation",
            _ => "Position health warning",
        }
    }

    pub fn message(&self) -> String {
        match self.health {
            HealthTier::Critical => format!(
                "URGENT: Your position collateral ratio is {:.1}%, close to the {}% liquidation threshold. \
                 Add collateral or repay debt now to avoid liquidation.",
                self.collateral_ratio, LIQUIDATION_THRESHOLD
            ),
            _ => format!(
                "Your position collateral ratio has dropped to {:.1}%. \
                 Consider adding collateral to stay clear of the {}% liquidation threshold.",
                self.collateral_ratio, LIQUIDATION_THRESHOLD
            ),
        }
    }

    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "positionPubkey": self.position,
            "collateralRatio": self.collateral_ratio,
            "health": self.health.as_str(),
        })
    }
}

/// Persists and delivers alerts, and answers dedup queries against the
/// notification history.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Whether a notification of `kind` was created for `wallet` at or after `since`.
    async fn has_recent(
        &self,
        wallet: &str,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> Result<bool>;

    async fn notify_position_health_warning(&self, alert: &HealthAlert) -> Result<()>;
}

/// Reads from the wrapped sink, logs instead of writing.
pub struct DryRunSink<S> {
    inner: S,
}

impl<S> DryRunSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: NotificationSink> NotificationSink for DryRunSink<S> {
    async fn has_recent(
        &self,
        wallet: &str,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.has_recent(wallet, kind, since).await
    }

    async fn notify_position_health_warning(&self, alert: &HealthAlert) -> Result<()> {
        info!(
            wallet = %alert.wallet,
            position = %alert.position,
            ratio = alert.collateral_ratio,
            message = %alert.message(),
            "Dry-run: skipped notification write"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert(health: HealthTier, ratio: f64) -> HealthAlert {
        HealthAlert {
            wallet: "wallet".into(),
            position: "position".into(),
            collateral_ratio: ratio,
            health,
        }
    }

    #[test]
    fn messages_carry_ratio_and_threshold() {
        let critical = alert(HealthTier::Critical, 104.56).message();
        assert!(critical.starts_with("URGENT"));
        assert!(critical.contains("104.6%"));
        assert!(critical.contains("105%"));

        let warning = alert(HealthTier::Warning, 120.0).message();
        assert!(!warning.starts_with("URGENT"));
        assert!(warning.contains("120.0%"));
        assert!(warning.contains("105%"));
    }

    #[test]
    fn metadata_names_the_position() {
        let meta = alert(HealthTier::Warning, 125.0).metadata();
        assert_eq!(meta["positionPubkey"], "position");
        assert_eq!(meta["health"], "warning");
    }

    #[derive(Default)]
    struct Counting {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for Counting {
        async fn has_recent(&self, _: &str, _: NotificationKind, _: DateTime<Utc>) -> Result<bool> {
            Ok(true)
        }

        async fn notify_position_health_warning(&self, _: &HealthAlert) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dry_run_reads_through_and_never_writes() {
        let sink = DryRunSink::new(Counting::default());
        let recent = sink
            .has_recent("wallet", NotificationKind::PositionHealthWarning, Utc::now())
            .await
            .unwrap();
        assert!(recent);

        sink.notify_position_health_warning(&alert(HealthTier::Critical, 100.0))
            .await
            .unwrap();
        assert_eq!(sink.inner.writes.load(Ordering::SeqCst), 0);
    }
}
