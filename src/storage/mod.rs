//! The abstract storage contract. Domain traits are defined here and
//! implemented in `storage::sqlite`'s submodules, one per entity.

pub mod sqlite;

use crate::error::CoreError;
use crate::generator::GeneratedItem;
use crate::models::{
    DeadLetterJob, DeadLetterResolution, GenerationJob, JobErrorType, NewGenerationJob,
    NewItemData, NewTemplateException, RecurringTemplate, TaskItem,
    TemplateException, UpdateItemData, UpdateTemplateData,
};
use crate::query::ListItemsParams;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Domain-specific trait for recurring template operations.
#[async_trait]
pub trait TemplateStore {
    async fn get_template(&self, list_id: Uuid, id: Uuid) -> Result<Option<RecurringTemplate>, CoreError>;
    /// Ownership-unchecked lookup for background components (worker pool,
    /// reconciliation) that only ever have a bare `template_id` to work
    /// with — jobs don't carry the owning list.
    async fn get_template_by_id(&self, id: Uuid) -> Result<Option<RecurringTemplate>, CoreError>;
    async fn list_templates(&self, list_id: Uuid, active_only: bool) -> Result<Vec<RecurringTemplate>, CoreError>;
    /// Content-only update: no regeneration, just a versioned field write.
    async fn update_template_fields(
        &self,
        id: Uuid,
        data: UpdateTemplateData,
        now: DateTime<Utc>,
    ) -> Result<RecurringTemplate, CoreError>;
    /// Cascades to exceptions and jobs; materialized items keep a dangling
    /// back-reference rather than being retracted.
    async fn delete_template(&self, id: Uuid) -> Result<(), CoreError>;
    /// Templates eligible for reconciliation: `generated_through` lags the
    /// horizon, no pending/running job exists, and the template was last
    /// touched before `grace_cutoff`.
    async fn list_templates_needing_reconciliation(
        &self,
        now: DateTime<Utc>,
        grace_cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RecurringTemplate>, CoreError>;
}

/// Domain-specific trait for task item operations.
#[async_trait]
pub trait ItemStore {
    async fn get_item(&self, id: Uuid) -> Result<Option<TaskItem>, CoreError>;
    async fn insert_item(&self, data: NewItemData, now: DateTime<Utc>) -> Result<TaskItem, CoreError>;
    /// Plain (non-exception-triggering) update. `data.etag`, when set, must
    /// match the row's current `version` or this returns `VersionConflict`.
    async fn update_item(&self, id: Uuid, data: UpdateItemData, now: DateTime<Utc>) -> Result<TaskItem, CoreError>;
    /// Hard delete, for non-recurring items only.
    async fn delete_item(&self, id: Uuid) -> Result<(), CoreError>;
    async fn list_items(&self, params: &ListItemsParams) -> Result<(Vec<TaskItem>, i64), CoreError>;
}

/// Domain-specific trait for per-occurrence exception operations.
#[async_trait]
pub trait ExceptionStore {
    /// Tolerates a duplicate `(template_id, occurs_at)` as a no-op success
    /// returning the existing row instead of erroring.
    async fn add_exception(&self, exception: NewTemplateException, now: DateTime<Utc>) -> Result<TemplateException, CoreError>;
    async fn list_exceptions(
        &self,
        template_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<TemplateException>, CoreError>;
    async fn remove_exception(&self, template_id: Uuid, occurs_at: DateTime<Utc>) -> Result<(), CoreError>;
}

/// Domain-specific trait for the generation job queue.
#[async_trait]
pub trait JobStore {
    async fn enqueue_job(&self, job: NewGenerationJob, now: DateTime<Utc>) -> Result<GenerationJob, CoreError>;
    /// Claims `(pending, scheduled_for <= now)` or `(running, available_at
    /// <= now)`, ordered by `scheduled_for`, skipping rows locked by other
    /// in-flight transactions.
    async fn claim_next(
        &self,
        worker_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<GenerationJob>, CoreError>;
    async fn extend(&self, job_id: Uuid, worker_id: &str, ttl: Duration, now: DateTime<Utc>) -> Result<(), CoreError>;
    async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<(), CoreError>;
    /// Returns whether the job will retry. On exhaustion, atomically inserts
    /// a dead-letter row (`error_type = exhausted`) and discards the job.
    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        err: &str,
        retry_cfg: &crate::config::RetryConfig,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError>;
    async fn move_to_dead_letter(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error_type: JobErrorType,
        message: &str,
        stack_trace: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError>;
    /// Pending jobs are cancelled immediately. Running jobs only have a
    /// cooperative flag set; the executing worker observes it at its next
    /// yield point.
    async fn cancel(&self, job_id: Uuid) -> Result<(), CoreError>;
    async fn is_cancel_requested(&self, job_id: Uuid) -> Result<bool, CoreError>;
    async fn has_active_job_for_template(&self, template_id: Uuid) -> Result<bool, CoreError>;
}

/// Domain-specific trait for dead-letter review operations.
#[async_trait]
pub trait DeadLetterStore {
    async fn list_dead_letter(&self, limit: i64) -> Result<Vec<DeadLetterJob>, CoreError>;
    async fn get_dead_letter(&self, id: Uuid) -> Result<Option<DeadLetterJob>, CoreError>;
    /// Creates a fresh pending job (`retry_count = 0`) and marks the
    /// dead-letter row `retried`.
    async fn retry_dead_letter(&self, id: Uuid, reviewer: &str, now: DateTime<Utc>) -> Result<GenerationJob, CoreError>;
    async fn discard_dead_letter(&self, id: Uuid, reviewer: &str, note: Option<&str>) -> Result<(), CoreError>;
    #[allow(dead_code)]
    fn _resolution_kind(&self) -> DeadLetterResolution {
        DeadLetterResolution::Pending
    }
}

/// Domain-specific trait for the cross-instance exclusive-run lease.
#[async_trait]
pub trait LeaseStore {
    /// Conditional upsert: acquires iff no live (non-expired) lease for
    /// `run_type` exists. Returns whether this call acquired it.
    async fn try_acquire_exclusive(
        &self,
        run_type: &str,
        holder: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError>;
    async fn release_exclusive(&self, run_type: &str, holder: &str) -> Result<(), CoreError>;
}

/// Transactional scopes spanning more than one entity, modeled as named
/// composite methods that each own their own `sqlx::Transaction` rather
/// than a generic callback scope.
#[async_trait]
pub trait AtomicStore {
    /// Create: persist the already-assembled template (the service
    /// layer assigns its id up front so the generated items below can carry
    /// the right back-reference), batch-insert the sync-horizon items
    /// (conflict-suppressed), and optionally enqueue the remainder job —
    /// all in one transaction.
    async fn create_template_with_materialization(
        &self,
        template: RecurringTemplate,
        items: Vec<GeneratedItem>,
        job: Option<NewGenerationJob>,
    ) -> Result<RecurringTemplate, CoreError>;

    /// Update (pattern change): update the template, delete future
    /// pending items linked to it, insert the regenerated sync-horizon
    /// items, advance `generated_through`, and enqueue the remainder job.
    #[allow(clippy::too_many_arguments)]
    async fn apply_template_pattern_change(
        &self,
        template_id: Uuid,
        data: UpdateTemplateData,
        now: DateTime<Utc>,
        new_items: Vec<GeneratedItem>,
        new_generated_through: DateTime<Utc>,
        job: Option<NewGenerationJob>,
    ) -> Result<RecurringTemplate, CoreError>;

    /// Item update requiring the exception protocol: insert the
    /// exception (tolerating duplicate), then apply the field update.
    async fn apply_item_update_with_exception(
        &self,
        item_id: Uuid,
        exception: NewTemplateException,
        update: UpdateItemData,
        now: DateTime<Utc>,
    ) -> Result<TaskItem, CoreError>;

    /// Item delete requiring the exception protocol: insert a `deleted`
    /// exception, then soft-delete (archive) the item.
    async fn apply_item_delete_with_exception(
        &self,
        item_id: Uuid,
        exception: NewTemplateException,
        now: DateTime<Utc>,
    ) -> Result<TaskItem, CoreError>;

    /// Shared by the worker pool and reconciliation/on-demand top-up:
    /// batch-insert generated items with conflict suppression and
    /// advance `generated_through` in the same transaction, so a crash
    /// between the two never leaves the marker ahead of what's persisted.
    async fn insert_generation_batch(
        &self,
        template_id: Uuid,
        items: Vec<GeneratedItem>,
        new_generated_through: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, CoreError>;
}

/// Composes every domain trait into the one contract the service layer and
/// job-queue components depend on.
pub trait Storage:
    TemplateStore + ItemStore + ExceptionStore + JobStore + DeadLetterStore + LeaseStore + AtomicStore + Send + Sync
{
}
