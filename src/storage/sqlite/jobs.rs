use crate::config::RetryConfig;
use crate::error::CoreError;
use crate::models::{DeadLetterJob, DeadLetterResolution, GenerationJob, JobErrorType, JobStatus, NewGenerationJob};
use crate::storage::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use super::SqliteStorage;

#[async_trait]
impl JobStore for SqliteStorage {
    async fn enqueue_job(&self, job: NewGenerationJob, now: DateTime<Utc>) -> Result<GenerationJob, CoreError> {
        let row = GenerationJob {
            id: Uuid::now_v7(),
            template_id: job.template_id,
            generate_from: job.generate_from,
            generate_until: job.generate_until,
            scheduled_for: job.scheduled_for,
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
        .bind(row.id)
        .bind(row.template_id)
        .bind(row.generate_from)
        .bind(row.generate_until)
        .bind(row.scheduled_for)
        .bind(row.status)
        .bind(row.retry_count)
        .bind(&row.claimed_by)
        .bind(row.available_at)
        .bind(&row.last_error)
        .bind(row.cancel_requested)
        .bind(row.created_at)
        .execute(self.pool())
        .await?;

        Ok(row)
    }

    /// SQLite has no `SELECT ... FOR UPDATE SKIP LOCKED`; `BEGIN IMMEDIATE`
    /// takes the single writer lock up front, so the select-then-update
    /// below is exclusive across workers without row-level locking.
    async fn claim_next(
        &self,
        worker_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<GenerationJob>, CoreError> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let candidate: Option<(Uuid, String, i32)> = sqlx::query_as(
            r#"SELECT id, status, retry_count FROM generation_jobs
               WHERE (status = 'pending' AND scheduled_for <= $1)
                  OR (status = 'running' AND available_at <= $1)
               ORDER BY scheduled_for
               LIMIT 1"#,
        )
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((job_id, prior_status, _retry_count)) = candidate else {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            return Ok(None);
        };

        let lease_ttl = chrono::Duration::from_std(lease_ttl).unwrap_or(chrono::Duration::seconds(60));
        let available_at = now + lease_ttl;
        let reclaiming = prior_status == "running";

        if reclaiming {
            sqlx::query(
                "UPDATE generation_jobs SET status = 'running', claimed_by = $1, available_at = $2, retry_count = retry_count + 1 WHERE id = $3",
            )
            .bind(worker_id)
            .bind(available_at)
            .bind(job_id)
            .execute(&mut *conn)
            .await?;
        } else {
            sqlx::query(
                "UPDATE generation_jobs SET status = 'running', claimed_by = $1, available_at = $2 WHERE id = $3",
            )
            .bind(worker_id)
            .bind(available_at)
            .bind(job_id)
            .execute(&mut *conn)
            .await?;
        }

        let job: GenerationJob = sqlx::query_as("SELECT * FROM generation_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query("COMMIT").execute(&mut *conn).await?;
        Ok(Some(job))
    }

    async fn extend(&self, job_id: Uuid, worker_id: &str, ttl: Duration, now: DateTime<Utc>) -> Result<(), CoreError> {
        let available_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60));
        let result = sqlx::query(
            "UPDATE generation_jobs SET available_at = $1 WHERE id = $2 AND claimed_by = $3 AND status = 'running'",
        )
        .bind(available_at)
        .bind(job_id)
        .bind(worker_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::OwnershipLost);
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE generation_jobs SET status = 'completed' WHERE id = $1 AND claimed_by = $2 AND status = 'running'",
        )
        .bind(job_id)
        .bind(worker_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::OwnershipLost);
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        err: &str,
        retry_cfg: &RetryConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let mut tx = self.pool().begin().await?;

        let job: GenerationJob = sqlx::query_as("SELECT * FROM generation_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("job {job_id} not found")))?;

        if job.claimed_by.as_deref() != Some(worker_id) || job.status != JobStatus::Running {
            return Err(CoreError::OwnershipLost);
        }

        if job.retry_count < retry_cfg.max_retries {
            let new_retry_count = job.retry_count + 1;
            let delay = crate::retry::backoff_delay(new_retry_count, retry_cfg);
            let scheduled_for = now + chrono::Duration::from_std(delay).unwrap_or_default();

            sqlx::query(
                r#"UPDATE generation_jobs SET
                    status = 'pending', retry_count = $1, scheduled_for = $2,
                    claimed_by = NULL, available_at = NULL, last_error = $3
                   WHERE id = $4"#,
            )
            .bind(new_retry_count)
            .bind(scheduled_for)
            .bind(err)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(true)
        } else {
            sqlx::query("UPDATE generation_jobs SET status = 'discarded', last_error = $1 WHERE id = $2")
                .bind(err)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;

            insert_dead_letter(
                &mut tx,
                job.id,
                job.template_id,
                job.generate_from,
                job.generate_until,
                JobErrorType::Exhausted,
                err,
                None,
                now,
            )
            .await?;

            tx.commit().await?;
            Ok(false)
        }
    }

    async fn move_to_dead_letter(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_type: JobErrorType,
        message: &str,
        stack_trace: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        let job: GenerationJob = sqlx::query_as("SELECT * FROM generation_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("job {job_id} not found")))?;

        if job.claimed_by.as_deref() != Some(worker_id) || job.status != JobStatus::Running {
            return Err(CoreError::OwnershipLost);
        }

        sqlx::query("UPDATE generation_jobs SET status = 'discarded', last_error = $1 WHERE id = $2")
            .bind(message)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        insert_dead_letter(
            &mut tx,
            job.id,
            job.template_id,
            job.generate_from,
            job.generate_until,
            error_type,
            message,
            stack_trace,
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<(), CoreError> {
        let pending = sqlx::query("UPDATE generation_jobs SET status = 'cancelled' WHERE id = $1 AND status = 'pending'")
            .bind(job_id)
            .execute(self.pool())
            .await?;
        if pending.rows_affected() > 0 {
            return Ok(());
        }

        let running = sqlx::query(
            "UPDATE generation_jobs SET cancel_requested = 1 WHERE id = $1 AND status = 'running'",
        )
        .bind(job_id)
        .execute(self.pool())
        .await?;
        if running.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("job {job_id} not found")));
        }
        Ok(())
    }

    async fn is_cancel_requested(&self, job_id: Uuid) -> Result<bool, CoreError> {
        let flag: Option<bool> = sqlx::query_scalar("SELECT cancel_requested FROM generation_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(flag.unwrap_or(false))
    }

    async fn has_active_job_for_template(&self, template_id: Uuid) -> Result<bool, CoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM generation_jobs WHERE template_id = $1 AND status IN ('pending', 'running'))",
        )
        .bind(template_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_dead_letter(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    job_id: Uuid,
    template_id: Uuid,
    generate_from: DateTime<Utc>,
    generate_until: DateTime<Utc>,
    error_type: JobErrorType,
    message: &str,
    stack_trace: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DeadLetterJob, CoreError> {
    let row = DeadLetterJob {
        id: Uuid::now_v7(),
        job_id,
        template_id,
        generate_from,
        generate_until,
        error_type,
        error_message: message.to_string(),
        stack_trace: stack_trace.map(|s| s.to_string()),
        resolution: DeadLetterResolution::Pending,
        reviewed_by: None,
        note: None,
        created_at: now,
    };

    sqlx::query(
        r#"INSERT INTO dead_letter_jobs
            (id, job_id, template_id, generate_from, generate_until, error_type,
             error_message, stack_trace, resolution, reviewed_by, note, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
    )
    .bind(row.id)
    .bind(row.job_id)
    .bind(row.template_id)
    .bind(row.generate_from)
    .bind(row.generate_until)
    .bind(row.error_type)
    .bind(&row.error_message)
    .bind(&row.stack_trace)
    .bind(row.resolution)
    .bind(&row.reviewed_by)
    .bind(&row.note)
    .bind(row.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(row)
}
