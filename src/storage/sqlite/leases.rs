use crate::error::CoreError;
use crate::storage::LeaseStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::SqliteStorage;

#[async_trait]
impl LeaseStore for SqliteStorage {
    async fn try_acquire_exclusive(
        &self,
        run_type: &str,
        holder: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let expires_at = now + chrono::Duration::from_std(lease_ttl).unwrap_or(chrono::Duration::seconds(60));

        sqlx::query(
            r#"INSERT INTO cron_leases (run_type, holder_id, expires_at) VALUES ($1, $2, $3)
               ON CONFLICT(run_type) DO UPDATE SET
                   holder_id = excluded.holder_id,
                   expires_at = excluded.expires_at
               WHERE cron_leases.expires_at < $4"#,
        )
        .bind(run_type)
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        let current_holder: Option<String> =
            sqlx::query_scalar("SELECT holder_id FROM cron_leases WHERE run_type = $1")
                .bind(run_type)
                .fetch_optional(self.pool())
                .await?;

        Ok(current_holder.as_deref() == Some(holder))
    }

    async fn release_exclusive(&self, run_type: &str, holder: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM cron_leases WHERE run_type = $1 AND holder_id = $2")
            .bind(run_type)
            .bind(holder)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
