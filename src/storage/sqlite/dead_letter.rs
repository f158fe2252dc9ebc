use crate::error::CoreError;
use crate::models::{DeadLetterJob, DeadLetterResolution, GenerationJob, JobStatus};
use crate::storage::DeadLetterStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::SqliteStorage;

#[async_trait]
impl DeadLetterStore for SqliteStorage {
    async fn list_dead_letter(&self, limit: i64) -> Result<Vec<DeadLetterJob>, CoreError> {
        let rows = sqlx::query_as::<_, DeadLetterJob>(
            "SELECT * FROM dead_letter_jobs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn get_dead_letter(&self, id: Uuid) -> Result<Option<DeadLetterJob>, CoreError> {
        let row = sqlx::query_as::<_, DeadLetterJob>("SELECT * FROM dead_letter_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    /// Retrying schedules the new job immediately (`scheduled_for = now`)
    /// rather than preserving the original schedule.
    async fn retry_dead_letter(&self, id: Uuid, reviewer: &str, now: DateTime<Utc>) -> Result<GenerationJob, CoreError> {
        let mut tx = self.pool().begin().await?;

        let entry: DeadLetterJob = sqlx::query_as("SELECT * FROM dead_letter_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("dead-letter entry {id} not found")))?;

        if entry.resolution != DeadLetterResolution::Pending {
            return Err(CoreError::Conflict(format!(
                "dead-letter entry {id} already resolved"
            )));
        }

        let job = GenerationJob {
            id: Uuid::now_v7(),
            template_id: entry.template_id,
            generate_from: entry.generate_from,
            generate_until: entry.generate_until,
            scheduled_for: now,
            status: JobStatus::Pending,
            retry_count: 0,
            claimed_by: None,
            available_at: None,
            last_error: None,
            cancel_requested: false,
            created_at: now,
        };

        sqlx::query(
            r#"INSERT INTO generation_jobs
                (id, template_id, generate_from, generate_until, scheduled_for, status,
                 retry_count, claimed_by, available_at, last_error, cancel_requested, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(job.id)
        .bind(job.template_id)
        .bind(job.generate_from)
        .bind(job.generate_until)
        .bind(job.scheduled_for)
        .bind(job.status)
        .bind(job.retry_count)
        .bind(&job.claimed_by)
        .bind(job.available_at)
        .bind(&job.last_error)
        .bind(job.cancel_requested)
        .bind(job.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE dead_letter_jobs SET resolution = 'retried', reviewed_by = $1 WHERE id = $2")
            .bind(reviewer)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn discard_dead_letter(&self, id: Uuid, reviewer: &str, note: Option<&str>) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE dead_letter_jobs SET resolution = 'discarded', reviewed_by = $1, note = $2 WHERE id = $3 AND resolution = 'pending'",
        )
        .bind(reviewer)
        .bind(note)
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("dead-letter entry {id} not found")));
        }
        Ok(())
    }
}
