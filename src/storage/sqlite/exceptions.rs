use crate::error::CoreError;
use crate::models::{NewTemplateException, TemplateException};
use crate::storage::ExceptionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::SqliteStorage;

#[async_trait]
impl ExceptionStore for SqliteStorage {
    async fn add_exception(
        &self,
        exception: NewTemplateException,
        now: DateTime<Utc>,
    ) -> Result<TemplateException, CoreError> {
        let row = TemplateException {
            id: Uuid::now_v7(),
            template_id: exception.template_id,
            occurs_at: exception.occurs_at,
            exception_type: exception.exception_type,
            item_id: exception.item_id,
            created_at: now,
        };

        sqlx::query(
            r#"INSERT INTO template_exceptions (id, template_id, occurs_at, exception_type, item_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (template_id, occurs_at) DO NOTHING"#,
        )
        .bind(row.id)
        .bind(row.template_id)
        .bind(row.occurs_at)
        .bind(row.exception_type)
        .bind(row.item_id)
        .bind(row.created_at)
        .execute(self.pool())
        .await?;

        let persisted: TemplateException = sqlx::query_as(
            "SELECT * FROM template_exceptions WHERE template_id = $1 AND occurs_at = $2",
        )
        .bind(row.template_id)
        .bind(row.occurs_at)
        .fetch_one(self.pool())
        .await?;

        Ok(persisted)
    }

    async fn list_exceptions(
        &self,
        template_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<TemplateException>, CoreError> {
        let exceptions = sqlx::query_as::<_, TemplateException>(
            "SELECT * FROM template_exceptions WHERE template_id = $1 AND occurs_at >= $2 AND occurs_at < $3 ORDER BY occurs_at",
        )
        .bind(template_id)
        .bind(from)
        .bind(until)
        .fetch_all(self.pool())
        .await?;
        Ok(exceptions)
    }

    async fn remove_exception(&self, template_id: Uuid, occurs_at: DateTime<Utc>) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM template_exceptions WHERE template_id = $1 AND occurs_at = $2")
            .bind(template_id)
            .bind(occurs_at)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!(
                "exception not found for template {template_id} at {occurs_at}"
            )));
        }
        Ok(())
    }
}

/// Insert tolerating a duplicate `(template_id, occurs_at)`: the row that
/// ends up persisted (new or pre-existing) is always returned, never an
/// error. Transaction-scoped twin of `ExceptionStore::add_exception`, used
/// by the atomic item update/delete scopes.
pub(crate) async fn add_exception_in_transaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    exception: NewTemplateException,
    now: DateTime<Utc>,
) -> Result<TemplateException, CoreError> {
    let row = TemplateException {
        id: Uuid::now_v7(),
        template_id: exception.template_id,
        occurs_at: exception.occurs_at,
        exception_type: exception.exception_type,
        item_id: exception.item_id,
        created_at: now,
    };

    sqlx::query(
        r#"INSERT INTO template_exceptions (id, template_id, occurs_at, exception_type, item_id, created_at)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (template_id, occurs_at) DO NOTHING"#,
    )
    .bind(row.id)
    .bind(row.template_id)
    .bind(row.occurs_at)
    .bind(row.exception_type)
    .bind(row.item_id)
    .bind(row.created_at)
    .execute(&mut **tx)
    .await?;

    let persisted: TemplateException = sqlx::query_as(
        "SELECT * FROM template_exceptions WHERE template_id = $1 AND occurs_at = $2",
    )
    .bind(row.template_id)
    .bind(row.occurs_at)
    .fetch_one(&mut **tx)
    .await?;

    Ok(persisted)
}
