use crate::error::CoreError;
use crate::models::{NewItemData, TaskItem, UpdateItemData};
use crate::query::ListItemsParams;
use crate::storage::ItemStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;
use uuid::Uuid;

use super::SqliteStorage;

#[async_trait]
impl ItemStore for SqliteStorage {
    async fn get_item(&self, id: Uuid) -> Result<Option<TaskItem>, CoreError> {
        let item = sqlx::query_as::<_, TaskItem>("SELECT * FROM task_items WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(item)
    }

    async fn insert_item(&self, data: NewItemData, now: DateTime<Utc>) -> Result<TaskItem, CoreError> {
        let item = TaskItem {
            id: Uuid::now_v7(),
            list_id: data.list_id,
            title: data.title,
            status: crate::models::ItemStatus::Todo,
            priority: data.priority,
            tags: data.tags,
            due_at: data.due_at,
            starts_at: data.starts_at,
            occurs_at: None,
            estimated_duration_minutes: data.estimated_duration_minutes,
            actual_duration_minutes: None,
            timezone: data.timezone,
            recurring_template_id: None,
            due_offset_minutes: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        sqlx::query(
            r#"INSERT INTO task_items
                (id, list_id, title, status, priority, tags, due_at, starts_at, occurs_at,
                 estimated_duration_minutes, actual_duration_minutes, timezone,
                 recurring_template_id, due_offset_minutes, created_at, updated_at, version)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"#,
        )
        .bind(item.id)
        .bind(item.list_id)
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
        .bind(item.recurring_template_id)
        .bind(item.due_offset_minutes)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.version)
        .execute(self.pool())
        .await?;

        Ok(item)
    }

    async fn update_item(&self, id: Uuid, data: UpdateItemData, now: DateTime<Utc>) -> Result<TaskItem, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut item: TaskItem = sqlx::query_as("SELECT * FROM task_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
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
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn delete_item(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM task_items WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("item {id} not found")));
        }
        Ok(())
    }

    async fn list_items(&self, params: &ListItemsParams) -> Result<(Vec<TaskItem>, i64), CoreError> {
        let excluded = params.excluded_statuses();

        let mut count_qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM task_items WHERE list_id = ");
        count_qb.push_bind(params.list_id);
        push_status_clause(&mut count_qb, params.status, &excluded);
        let total: i64 = count_qb.build_query_scalar().fetch_one(self.pool()).await?;

        let mut qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM task_items WHERE list_id = ");
        qb.push_bind(params.list_id);
        push_status_clause(&mut qb, params.status, &excluded);
        qb.push(" ORDER BY COALESCE(occurs_at, created_at) LIMIT ");
        qb.push_bind(params.limit);
        qb.push(" OFFSET ");
        qb.push_bind(params.offset);

        let items: Vec<TaskItem> = qb.build_query_as().fetch_all(self.pool()).await?;
        Ok((items, total))
    }
}

fn push_status_clause(
    qb: &mut QueryBuilder<sqlx::Sqlite>,
    status: Option<crate::models::ItemStatus>,
    excluded: &[crate::models::ItemStatus],
) {
    if let Some(status) = status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    } else if !excluded.is_empty() {
        qb.push(" AND status NOT IN (");
        let mut separated = qb.separated(", ");
        for s in excluded {
            separated.push_bind(*s);
        }
        separated.push_unseparated(")");
    }
}
