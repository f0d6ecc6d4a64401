use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use crate::errors::Result;
use crate::models::{NotificationKind, Position, STATUS_ACTIVE};
use crate::notify::{HealthAlert, NotificationSink};

const RECENT_NOTIFICATION_SQL: &str = r#"SELECT 1 FROM "Notification"
   WHERE "walletAddress" = $1 AND "type" = $2 AND "createdAt" >= $3
   LIMIT 1"#;

// "createdAt" is a zoneless timestamp holding UTC wall-clock time, so the
// insert pins NOW() to UTC regardless of the session time zone.
const INSERT_NOTIFICATION_SQL: &str = r#"INSERT INTO "Notification"
     ("id", "walletAddress", "type", "title", "message", "metadata", "read", "createdAt")
   VALUES (gen_random_uuid()::text, $1, $2, $3, $4, $5, FALSE, NOW() AT TIME ZONE 'UTC')"#;

/// Bind value for comparisons against zoneless UTC timestamp columns.
fn utc_wall_clock(at: DateTime<Utc>) -> NaiveDateTime {
    at.naive_utc()
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Positions with status 0 and no close timestamp. Order is irrelevant.
    async fn active_positions(&self) -> Result<Vec<Position>>;
}

/// Postgres-backed position store and notification history.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl PositionStore for PgStore {
    async fn active_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, Position>(
            r#"SELECT "pubkey", "owner", "collateralAmount", "debt", "status", "closedAt"
               FROM "Position"
               WHERE "status" = $1 AND "closedAt" IS NULL"#,
        )
        .bind(STATUS_ACTIVE)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Loaded active positions");
        Ok(rows)
    }
}

#[async_trait]
impl NotificationSink for PgStore {
    async fn has_recent(
        &self,
        wallet: &str,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(RECENT_NOTIFICATION_SQL)
            .bind(wallet)
            .bind(kind.as_str())
            .bind(utc_wall_clock(since))
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn notify_position_health_warning(&self, alert: &HealthAlert) -> Result<()> {
        sqlx::query(INSERT_NOTIFICATION_SQL)
            .bind(&alert.wallet)
            .bind(alert.kind().as_str())
            .bind(alert.title())
            .bind(alert.message())
            .bind(alert.metadata())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn cutoff_binds_utc_wall_clock_regardless_of_offset() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let local = tokyo.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();

        let bound = utc_wall_clock(local.with_timezone(&Utc));

        assert_eq!(bound.to_string(), "2026-03-01 00:30:00");
    }

    #[test]
    fn insert_stamps_created_at_in_utc() {
        assert!(INSERT_NOTIFICATION_SQL.contains("NOW() AT TIME ZONE 'UTC'"));
        assert!(RECENT_NOTIFICATION_SQL.contains(r#""createdAt" >= $3"#));
    }
}
