//! Generation Coordinator: a thin orchestration layer over
//! `JobStore`/`LeaseStore` that supplies "now" from the injected clock and
//! adds the structured logging every mutation deserves.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::RetryConfig;
use crate::error::CoreError;
use crate::models::{GenerationJob, JobErrorType, NewGenerationJob};
use crate::storage::Storage;

pub struct Coordinator {
    storage: Arc<dyn Storage>,
    clock: SharedClock,
}

impl Coordinator {
    pub fn new(storage: Arc<dyn Storage>, clock: SharedClock) -> Self {
        Self { storage, clock }
    }

    pub async fn enqueue(&self, job: NewGenerationJob) -> Result<GenerationJob, CoreError> {
        let now = self.clock.now();
        let template_id = job.template_id;
        let job = self.storage.enqueue_job(job, now).await?;
        tracing::info!(job_id = %job.id, template_id = %template_id, "enqueued generation job");
        Ok(job)
    }

    pub async fn claim_next(&self, worker_id: &str, lease_ttl: Duration) -> Result<Option<GenerationJob>, CoreError> {
        let now = self.clock.now();
        let job = self.storage.claim_next(worker_id, lease_ttl, now).await?;
        if let Some(job) = &job {
            tracing::debug!(job_id = %job.id, worker_id, retry_count = job.retry_count, "claimed generation job");
        }
        Ok(job)
    }

    pub async fn extend(&self, job_id: Uuid, worker_id: &str, ttl: Duration) -> Result<(), CoreError> {
        let now = self.clock.now();
        self.storage.extend(job_id, worker_id, ttl, now).await
    }

    pub async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<(), CoreError> {
        self.storage.complete(job_id, worker_id).await?;
        tracing::info!(job_id = %job_id, "generation job completed");
        Ok(())
    }

    /// Returns whether the job will retry. On exhaustion the storage layer
    /// has already dead-lettered it.
    pub async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        err: &str,
        retry_cfg: &RetryConfig,
    ) -> Result<bool, CoreError> {
        let now = self.clock.now();
        let will_retry = self.storage.fail(job_id, worker_id, err, retry_cfg, now).await?;
        if will_retry {
            tracing::warn!(job_id = %job_id, error = err, "generation job failed, scheduled for retry");
        } else {
            tracing::error!(job_id = %job_id, error = err, "generation job exhausted retries, dead-lettered");
        }
        Ok(will_retry)
    }

    pub async fn move_to_dead_letter(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_type: JobErrorType,
        message: &str,
        stack_trace: Option<&str>,
    ) -> Result<(), CoreError> {
        let now = self.clock.now();
        self.storage
            .move_to_dead_letter(job_id, worker_id, error_type, message, stack_trace, now)
            .await?;
        tracing::error!(job_id = %job_id, error_type = ?error_type, "generation job moved to dead letter");
        Ok(())
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<(), CoreError> {
        self.storage.cancel(job_id).await
    }

    pub async fn is_cancel_requested(&self, job_id: Uuid) -> Result<bool, CoreError> {
        self.storage.is_cancel_requested(job_id).await
    }

    pub async fn has_active_job_for_template(&self, template_id: Uuid) -> Result<bool, CoreError> {
        self.storage.has_active_job_for_template(template_id).await
    }

    pub async fn try_acquire_exclusive(&self, run_type: &str, holder: &str, lease_ttl: Duration) -> Result<bool, CoreError> {
        let now = self.clock.now();
        self.storage.try_acquire_exclusive(run_type, holder, lease_ttl, now).await
    }

    pub async fn release_exclusive(&self, run_type: &str, holder: &str) -> Result<(), CoreError> {
        self.storage.release_exclusive(run_type, holder).await
    }
}
