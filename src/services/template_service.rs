//! Template Service: validation, materialization, and pattern-change
//! orchestration for recurring templates.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::generator;
use crate::models::{NewGenerationJob, NewTemplateData, RecurringTemplate, UpdateTemplateData};
use crate::pattern::PatternConfig;
use crate::storage::Storage;

use super::validate_title;

pub struct TemplateService {
    storage: Arc<dyn Storage>,
    clock: SharedClock,
    config: EngineConfig,
}

impl TemplateService {
    pub fn new(storage: Arc<dyn Storage>, clock: SharedClock, config: EngineConfig) -> Self {
        Self { storage, clock, config }
    }

    /// Persists the template and materializes `[now, now + sync_horizon_days)`
    /// in one transaction, enqueuing a remainder job if the generation
    /// horizon extends past the sync window.
    pub async fn create(&self, mut data: NewTemplateData) -> Result<RecurringTemplate, CoreError> {
        data.title = validate_title(&data.title)?;

        if data.sync_horizon_days == 0 {
            data.sync_horizon_days = self.config.default_sync_horizon_days;
        }
        if data.sync_horizon_days <= 0 {
            return Err(CoreError::invalid("sync_horizon_days must be positive"));
        }
        if data.generation_horizon_days == 0 {
            data.generation_horizon_days = self.config.default_generation_horizon_days;
        }
        if !(1..=365).contains(&data.generation_horizon_days) {
            return Err(CoreError::invalid(
                "generation_horizon_days must be between 1 and 365",
            ));
        }

        let now = self.clock.now();
        PatternConfig::parse(data.recurrence_pattern, &data.recurrence_config, now)?;

        let sync_end = now + Duration::days(data.sync_horizon_days);
        let generation_end = now + Duration::days(data.generation_horizon_days);

        let template = RecurringTemplate {
            id: Uuid::now_v7(),
            list_id: data.list_id,
            title: data.title,
            tags: data.tags,
            priority: data.priority,
            estimated_duration_minutes: data.estimated_duration_minutes,
            due_offset_minutes: data.due_offset_minutes,
            recurrence_pattern: data.recurrence_pattern,
            recurrence_config: data.recurrence_config,
            is_active: true,
            sync_horizon_days: data.sync_horizon_days,
            generation_horizon_days: data.generation_horizon_days,
            generated_through: sync_end,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let items = generator::generate(&template, now, sync_end, &[])?;

        let job = if sync_end < generation_end {
            Some(NewGenerationJob {
                template_id: template.id,
                generate_from: sync_end,
                generate_until: generation_end,
                scheduled_for: now,
            })
        } else {
            None
        };

        self.storage
            .create_template_with_materialization(template, items, job)
            .await
    }

    pub async fn get(&self, list_id: Uuid, id: Uuid) -> Result<RecurringTemplate, CoreError> {
        self.storage
            .get_template(list_id, id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("template {id} not found")))
    }

    pub async fn list(&self, list_id: Uuid, active_only: bool) -> Result<Vec<RecurringTemplate>, CoreError> {
        self.storage.list_templates(list_id, active_only).await
    }

    /// Content-only updates are a single versioned field write. A pattern
    /// change (mask intersects pattern/horizon fields) deletes and
    /// regenerates future occurrences atomically.
    pub async fn update(
        &self,
        list_id: Uuid,
        id: Uuid,
        data: UpdateTemplateData,
    ) -> Result<RecurringTemplate, CoreError> {
        let existing = self
            .storage
            .get_template(list_id, id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("template {id} not found")))?;

        if let Some(ref title) = data.title {
            validate_title(title)?;
        }
        if let Some(days) = data.sync_horizon_days {
            if days <= 0 {
                return Err(CoreError::invalid("sync_horizon_days must be positive"));
            }
        }
        if let Some(days) = data.generation_horizon_days {
            if !(1..=365).contains(&days) {
                return Err(CoreError::invalid(
                    "generation_horizon_days must be between 1 and 365",
                ));
            }
        }

        if !data.is_pattern_change() {
            let now = self.clock.now();
            return self.storage.update_template_fields(id, data, now).await;
        }

        let now = self.clock.now();
        let pattern = data.recurrence_pattern.unwrap_or(existing.recurrence_pattern);
        let config = data
            .recurrence_config
            .clone()
            .unwrap_or_else(|| existing.recurrence_config.clone());
        PatternConfig::parse(pattern, &config, existing.created_at)?;

        let sync_horizon_days = data.sync_horizon_days.unwrap_or(existing.sync_horizon_days);
        let generation_horizon_days = data
            .generation_horizon_days
            .unwrap_or(existing.generation_horizon_days);

        let sync_end = now + Duration::days(sync_horizon_days);
        let generation_end = now + Duration::days(generation_horizon_days);

        let mut preview = existing.clone();
        preview.recurrence_pattern = pattern;
        preview.recurrence_config = config;
        preview.sync_horizon_days = sync_horizon_days;
        preview.generation_horizon_days = generation_horizon_days;

        let exceptions = self.storage.list_exceptions(id, now, sync_end).await?;
        let new_items = generator::generate(&preview, now, sync_end, &exceptions)?;

        let job = if sync_end < generation_end {
            Some(NewGenerationJob {
                template_id: id,
                generate_from: sync_end,
                generate_until: generation_end,
                scheduled_for: now,
            })
        } else {
            None
        };

        self.storage
            .apply_template_pattern_change(id, data, now, new_items, sync_end, job)
            .await
    }

    /// Ownership-checked delete. Exceptions and jobs cascade (FK `ON DELETE
    /// CASCADE`); materialized items keep a dangling back-reference.
    pub async fn delete(&self, list_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        self.storage
            .get_template(list_id, id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("template {id} not found")))?;
        self.storage.delete_template(id).await
    }
}
