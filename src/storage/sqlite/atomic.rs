//! Transactional scopes spanning more than one entity. Each method owns its
//! `sqlx::Transaction` end to end rather than taking a generic callback
//! scope, so a reader can see the whole operation in one place.

use crate::error::CoreError;
use crate::generator::GeneratedItem;
use crate::models::{
    ItemStatus, NewGenerationJob, NewTemplateException, RecurringTemplate, TaskItem,
    UpdateItemData, UpdateTemplateData,
};
use crate::storage::AtomicStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use super::exceptions::add_exception_in_transaction;
use super::SqliteStorage;

#[async_trait]
impl AtomicStore for SqliteStorage {
    async fn create_template_with_materialization(
        &self,
        template: RecurringTemplate,
        items: Vec<GeneratedItem>,
        job: Option<NewGenerationJob>,
    ) -> Result<RecurringTemplate, CoreError> {
        let mut tx = self.pool().begin().await?;
        let now = template.created_at;

        insert_template(&mut tx, &template).await?;
        insert_items_batch(&mut tx, &items, now).await?;
        if let Some(job) = job {
            insert_job(&mut tx, &job, now).await?;
        }

        tx.commit().await?;
        Ok(template)
    }

    async fn apply_template_pattern_change(
        &self,
        template_id: Uuid,
        data: UpdateTemplateData,
        now: DateTime<Utc>,
        new_items: Vec<GeneratedItem>,
        new_generated_through: DateTime<Utc>,
        job: Option<NewGenerationJob>,
    ) -> Result<RecurringTemplate, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut tmpl: RecurringTemplate = sqlx::query_as("SELECT * FROM recurring_templates WHERE id = $1")
            .bind(template_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("template {template_id} not found")))?;

        if let Some(v) = data.title {
            tmpl.title = v;
        }
        if let Some(v) = data.tags {
            tmpl.tags = v;
        }
        if let Some(v) = data.priority {
            tmpl.priority = v;
        }
        if let Some(v) = data.estimated_duration_minutes {
            tmpl.estimated_duration_minutes = v;
        }
        if let Some(v) = data.due_offset_minutes {
            tmpl.due_offset_minutes = v;
        }
        if let Some(v) = data.recurrence_pattern {
            tmpl.recurrence_pattern = v;
        }
        if let Some(v) = data.recurrence_config {
            tmpl.recurrence_config = v;
        }
        if let Some(v) = data.sync_horizon_days {
            tmpl.sync_horizon_days = v;
        }
        if let Some(v) = data.generation_horizon_days {
            tmpl.generation_horizon_days = v;
        }
        if let Some(v) = data.is_active {
            tmpl.is_active = v;
        }
        tmpl.generated_through = new_generated_through;
        tmpl.updated_at = now;
        tmpl.version += 1;

        sqlx::query(
            r#"UPDATE recurring_templates SET
                title = $1, tags = $2, priority = $3, estimated_duration_minutes = $4,
                due_offset_minutes = $5, recurrence_pattern = $6, recurrence_config = $7,
                is_active = $8, sync_horizon_days = $9, generation_horizon_days = $10,
                generated_through = $11, updated_at = $12, version = $13
               WHERE id = $14"#,
        )
        .bind(&tmpl.title)
        .bind(&tmpl.tags)
        .bind(tmpl.priority)
        .bind(tmpl.estimated_duration_minutes)
        .bind(tmpl.due_offset_minutes)
        .bind(tmpl.recurrence_pattern)
        .bind(&tmpl.recurrence_config)
        .bind(tmpl.is_active)
        .bind(tmpl.sync_horizon_days)
        .bind(tmpl.generation_horizon_days)
        .bind(tmpl.generated_through)
        .bind(tmpl.updated_at)
        .bind(tmpl.version)
        .bind(tmpl.id)
        .execute(&mut *tx)
        .await?;

        // All future occurrences materialized under the old pattern are
        // stale; the regenerated set (exceptions already filtered) replaces
        // them wholesale.
        sqlx::query("DELETE FROM task_items WHERE recurring_template_id = $1 AND occurs_at >= $2")
            .bind(template_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        insert_items_batch(&mut tx, &new_items, now).await?;

        if let Some(job) = job {
            insert_job(&mut tx, &job, now).await?;
        }

        tx.commit().await?;
        Ok(tmpl)
    }

    async fn apply_item_update_with_exception(
        &self,
        item_id: Uuid,
        exception: NewTemplateException,
        update: UpdateItemData,
        now: DateTime<Utc>,
    ) -> Result<TaskItem, CoreError> {
        let mut tx = self.pool().begin().await?;
        add_exception_in_transaction(&mut tx, exception, now).await?;
        let item = apply_item_update(&mut tx, item_id, update, now).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn apply_item_delete_with_exception(
        &self,
        item_id: Uuid,
        exception: NewTemplateException,
        now: DateTime<Utc>,
    ) -> Result<TaskItem, CoreError> {
        let mut tx = self.pool().begin().await?;
        add_exception_in_transaction(&mut tx, exception, now).await?;

        let mut item: TaskItem = sqlx::query_as("SELECT * FROM task_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("item {item_id} not found")))?;

        item.status = ItemStatus::Archived;
        item.updated_at = now;
        item.version += 1;

        sqlx::query("UPDATE task_items SET status = $1, updated_at = $2, version = $3 WHERE id = $4")
            .bind(item.status)
            .bind(item.updated_at)
            .bind(item.version)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn insert_generation_batch(
        &self,
        template_id: Uuid,
        items: Vec<GeneratedItem>,
        new_generated_through: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, CoreError> {
        let mut tx = self.pool().begin().await?;
        let inserted = insert_items_batch(&mut tx, &items, now).await?;

        // Monotonic marker: never move it backward.
        sqlx::query(
            "UPDATE recurring_templates SET generated_through = $1 WHERE id = $2 AND generated_through < $1",
        )
        .bind(new_generated_through)
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }
}

async fn insert_template(tx: &mut Transaction<'_, Sqlite>, template: &RecurringTemplate) -> Result<(), CoreError> {
    sqlx::query(
        r#"INSERT INTO recurring_templates
            (id, list_id, title, tags, priority, estimated_duration_minutes, due_offset_minutes,
             recurrence_pattern, recurrence_config, is_active, sync_horizon_days,
             generation_horizon_days, generated_through, created_at, updated_at, version)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"#,
    )
    .bind(template.id)
    .bind(template.list_id)
    .bind(&template.title)
    .bind(&template.tags)
    .bind(template.priority)
    .bind(template.estimated_duration_minutes)
    .bind(template.due_offset_minutes)
    .bind(template.recurrence_pattern)
    .bind(&template.recurrence_config)
    .bind(template.is_active)
    .bind(template.sync_horizon_days)
    .bind(template.generation_horizon_days)
    .bind(template.generated_through)
    .bind(template.created_at)
    .bind(template.updated_at)
    .bind(template.version)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_items_batch(
    tx: &mut Transaction<'_, Sqlite>,
    items: &[GeneratedItem],
    now: DateTime<Utc>,
) -> Result<usize, CoreError> {
    let mut inserted = 0usize;
    for item in items {
        let result = sqlx::query(
            r#"INSERT INTO task_items
                (id, list_id, title, status, priority, tags, due_at, starts_at, occurs_at,
                 estimated_duration_minutes, actual_duration_minutes, timezone,
                 recurring_template_id, due_offset_minutes, created_at, updated_at, version)
               VALUES ($1, $2, $3, 'todo', $4, $5, $6, $7, $8, $9, NULL, $10, $11, $12, $13, $13, 1)
               ON CONFLICT (recurring_template_id, occurs_at) DO NOTHING"#,
        )
        .bind(item.id)
        .bind(item.list_id)
        .bind(&item.title)
        .bind(item.priority)
        .bind(&item.tags)
        .bind(item.due_at)
        .bind(item.starts_at)
        .bind(item.occurs_at)
        .bind(item.estimated_duration_minutes)
        .bind(&item.timezone)
        .bind(item.recurring_template_id)
        .bind(item.due_offset_minutes)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        inserted += result.rows_affected() as usize;
    }
    Ok(inserted)
}

async fn insert_job(tx: &mut Transaction<'_, Sqlite>, job: &NewGenerationJob, now: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query(
        r#"INSERT INTO generation_jobs
            (id, template_id, generate_from, generate_until, scheduled_for, status,
             retry_count, claimed_by, available_at, last_error, cancel_requested, created_at)
           VALUES ($1, $2, $3, $4, $5, 'pending', 0, NULL, NULL, NULL, 0, $6)"#,
    )
    .bind(Uuid::now_v7())
    .bind(job.template_id)
    .bind(job.generate_from)
    .bind(job.generate_until)
    .bind(job.scheduled_for)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_item_update(
    tx: &mut Transaction<'_, Sqlite>,
    id: Uuid,
    data: UpdateItemData,
    now: DateTime<Utc>,
) -> Result<TaskItem, CoreError> {
    let mut item: TaskItem = sqlx::query_as("SELECT * FROM task_items WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("item {id} not found")))?;

    if let Some(expected) = data.etag {
        if expected != item.version {
            return Err(CoreError::VersionConflict {
                expected,
                found: item.version,
            });
        }
    }

    if let Some(v) = data.title {
        item.title = v;
    }
    if let Some(v) = data.status {
        item.status = v;
    }
    if let Some(v) = data.priority {
        item.priority = v;
    }
    if let Some(v) = data.tags {
        item.tags = v;
    }
    if let Some(v) = data.due_at {
        item.due_at = v;
    }
    if let Some(v) = data.starts_at {
        item.starts_at = v;
    }
    if let Some(v) = data.occurs_at {
        item.occurs_at = Some(v);
    }
    if let Some(v) = data.estimated_duration_minutes {
        item.estimated_duration_minutes = v;
    }
    if let Some(v) = data.actual_duration_minutes {
        item.actual_duration_minutes = v;
    }
    if let Some(v) = data.timezone {
        item.timezone = v;
    }
    item.updated_at = now;
    item.version += 1;

    sqlx::query(
        r#"UPDATE task_items SET
            title = $1, status = $2, priority = $3, tags = $4, due_at = $5, starts_at = $6,
            occurs_at = $7, estimated_duration_minutes = $8, actual_duration_minutes = $9,
            timezone = $10, updated_at = $11, version = $12
           WHERE id = $13"#,
    )
    .bind(&item.title)
    .bind(item.status)
    .bind(item.priority)
    .bind(&item.tags)
    .bind(item.due_at)
    .bind(item.starts_at)
    .bind(item.occurs_at)
    .bind(item.estimated_duration_minutes)
    .bind(item.actual_duration_minutes)
    .bind(&item.timezone)
    .bind(item.updated_at)
    .bind(item.version)
    .bind(item.id)
    .execute(&mut **tx)
    .await?;

    Ok(item)
}
