use chrono::NaiveDateTime;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

use crate::errors::{MonitorError, Result};

/// Status code of an open position.
pub const STATUS_ACTIVE: i32 = 0;

/// A debt position row as stored by the app. Read-only here.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Position {
    pub pubkey: String,
    pub owner: String,
    #[sqlx(rename = "collateralAmount")]
    pub collateral_amount: f64,
    pub debt: f64,
    pub status: i32,
    #[sqlx(rename = "closedAt")]
    /// UTC wall-clock time, stored without a zone like every app timestamp.
    pub closed_at: Option<NaiveDateTime>,
}

impl Position {
    /// Whether the position takes part in a scan.
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE && self.closed_at.is_none()
    }

    pub fn pubkey(&self) -> Result<Pubkey> {
        parse_address(&self.pubkey)
    }

    pub fn owner(&self) -> Result<Pubkey> {
        parse_address(&self.owner)
    }
}

fn parse_address(s: &str) -> Result<Pubkey> {
    s.parse().map_err(|e: solana_sdk::pubkey::ParsePubkeyError| {
        MonitorError::InvalidAddress {
            address: s.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Notification kinds the monitor reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    PositionHealthWarning,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PositionHealthWarning => "POSITION_HEALTH_WARNING",
        }
    }
}

/// Counts returned by an on-demand health pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(status: i32, closed_at: Option<NaiveDateTime>) -> Position {
        Position {
            pubkey: Pubkey::new_unique().to_string(),
            owner: Pubkey::new_unique().to_string(),
            collateral_amount: 1.0,
            debt: 1.0,
            status,
            closed_at,
        }
    }

    #[test]
    fn only_open_status_zero_positions_are_active() {
        assert!(position(0, None).is_active());
        assert!(!position(1, None).is_active());
        assert!(!position(0, Some(chrono::Utc::now().naive_utc())).is_active());
    }

    #[test]
    fn malformed_owner_is_rejected() {
        let mut p = position(0, None);
        p.owner = "not-a-wallet".to_string();
        assert!(matches!(p.owner(), Err(MonitorError::InvalidAddress { .. })));
        assert!(p.pubkey().is_ok());
    }

    #[test]
    fn kind_matches_db_value() {
        assert_eq!(NotificationKind::PositionHealthWarning.as_str(), "POSITION_HEALTH_WARNING");
    }
}
