use crate::models::Position;

/// On-chain liquidation point, percent. Informational only.
pub const LIQUIDATION_THRESHOLD: f64 = 105.0;
/// At or below this ratio a position is critical and always alerted.
pub const CRITICAL_HEALTH_THRESHOLD: f64 = 110.0;
/// At or below this ratio (above critical) a position is in warning.
pub const WARNING_HEALTH_THRESHOLD: f64 = 130.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthTier {
    Healthy,
    Warning,
    Critical,
}

impl HealthTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthTier::Healthy => "healthy",
            HealthTier::Warning => "warning",
            HealthTier::Critical => "critical",
        }
    }
}

/// Per-scan view of a position. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHealth {
    pub pubkey: String,
    pub owner: String,
    pub collateral_ratio: f64,
    pub health: HealthTier,
    pub should_notify: bool,
}

/// Collateral ratio in percent.
/// Returns infinity for positions without debt.
pub fn collateral_ratio(position: &Position, price: f64) -> f64 {
    let collateral_value = position.collateral_amount * price;

    if position.debt > 0.0 {
        collateral_value / position.debt * 100.0
    } else {
        f64::INFINITY
    }
}

pub fn classify_ratio(ratio: f64) -> HealthTier {
    if ratio <= CRITICAL_HEALTH_THRESHOLD {
        HealthTier::Critical
    } else if ratio <= WARNING_HEALTH_THRESHOLD {
        HealthTier::Warning
    } else {
        HealthTier::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn position(collateral: f64, debt: f64) -> Position {
        Position {
            pubkey: "pos".into(),
            owner: "owner".into(),
            collateral_amount: collateral,
            debt,
            status: 0,
            closed_at: None,
        }
    }

    #[test]
    fn zero_debt_is_infinitely_healthy() {
        let ratio = collateral_ratio(&position(0.0, 0.0), 150.0);
        assert!(ratio.is_infinite());
        assert_eq!(classify_ratio(ratio), HealthTier::Healthy);
    }

    #[test]
    fn price_walk_moves_through_tiers() {
        let p = position(10.0, 1000.0);

        let ratio = collateral_ratio(&p, 150.0);
        assert_eq!(ratio, 150.0);
        assert_eq!(classify_ratio(ratio), HealthTier::Healthy);

        let ratio = collateral_ratio(&p, 120.0);
        assert_eq!(ratio, 120.0);
        assert_eq!(classify_ratio(ratio), HealthTier::Warning);

        let ratio = collateral_ratio(&p, 100.0);
        assert_eq!(ratio, 100.0);
        assert_eq!(classify_ratio(ratio), HealthTier::Critical);
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(classify_ratio(CRITICAL_HEALTH_THRESHOLD), HealthTier::Critical);
        assert_eq!(classify_ratio(110.01), HealthTier::Warning);
        assert_eq!(classify_ratio(WARNING_HEALTH_THRESHOLD), HealthTier::Warning);
        assert_eq!(classify_ratio(130.01), HealthTier::Healthy);
        assert_eq!(classify_ratio(LIQUIDATION_THRESHOLD), HealthTier::Critical);
    }
}
