use crate::error::CoreError;
use crate::models::{RecurringTemplate, UpdateTemplateData};
use crate::storage::TemplateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::SqliteStorage;

#[async_trait]
impl TemplateStore for SqliteStorage {
    async fn get_template(&self, list_id: Uuid, id: Uuid) -> Result<Option<RecurringTemplate>, CoreError> {
        let tmpl = sqlx::query_as::<_, RecurringTemplate>(
            "SELECT * FROM recurring_templates WHERE id = $1 AND list_id = $2",
        )
        .bind(id)
        .bind(list_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(tmpl)
    }

    async fn get_template_by_id(&self, id: Uuid) -> Result<Option<RecurringTemplate>, CoreError> {
        let tmpl = sqlx::query_as::<_, RecurringTemplate>("SELECT * FROM recurring_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(tmpl)
    }

    async fn list_templates(&self, list_id: Uuid, active_only: bool) -> Result<Vec<RecurringTemplate>, CoreError> {
        let templates = if active_only {
            sqlx::query_as::<_, RecurringTemplate>(
                "SELECT * FROM recurring_templates WHERE list_id = $1 AND is_active = 1 ORDER BY created_at",
            )
            .bind(list_id)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, RecurringTemplate>(
                "SELECT * FROM recurring_templates WHERE list_id = $1 ORDER BY created_at",
            )
            .bind(list_id)
            .fetch_all(self.pool())
            .await?
        };
        Ok(templates)
    }

    async fn update_template_fields(
        &self,
        id: Uuid,
        data: UpdateTemplateData,
        now: DateTime<Utc>,
    ) -> Result<RecurringTemplate, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut tmpl: RecurringTemplate = sqlx::query_as("SELECT * FROM recurring_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("template {id} not found")))?;

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

        tx.commit().await?;
        Ok(tmpl)
    }

    async fn delete_template(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM recurring_templates WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("template {id} not found")));
        }
        Ok(())
    }

    async fn list_templates_needing_reconciliation(
        &self,
        now: DateTime<Utc>,
        grace_cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RecurringTemplate>, CoreError> {
        let templates = sqlx::query_as::<_, RecurringTemplate>(
            r#"SELECT t.* FROM recurring_templates t
               WHERE t.is_active = 1
                 AND julianday(t.generated_through) < julianday($1) + t.generation_horizon_days
                 AND t.updated_at < $2
                 AND NOT EXISTS (
                     SELECT 1 FROM generation_jobs j
                     WHERE j.template_id = t.id AND j.status IN ('pending', 'running')
                 )
               ORDER BY t.updated_at
               LIMIT $3"#,
        )
        .bind(now)
        .bind(grace_cutoff)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(templates)
    }
}
