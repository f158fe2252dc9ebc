//! Item Service: validation and exception-protocol orchestration for
//! individual task items.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::models::{ExceptionType, ItemField, NewItemData, NewTemplateException, TaskItem, UpdateItemData};
use crate::query::{ListItemsPage, ListItemsParams};
use crate::reconciliation;
use crate::storage::Storage;

use super::validate_title;

pub struct ItemService {
    storage: Arc<dyn Storage>,
    clock: SharedClock,
    config: EngineConfig,
}

impl ItemService {
    pub fn new(storage: Arc<dyn Storage>, clock: SharedClock, config: EngineConfig) -> Self {
        Self { storage, clock, config }
    }

    pub async fn create(&self, mut data: NewItemData) -> Result<TaskItem, CoreError> {
        data.title = validate_title(&data.title)?;
        let now = self.clock.now();
        self.storage.insert_item(data, now).await
    }

    pub async fn get(&self, id: Uuid) -> Result<TaskItem, CoreError> {
        self.storage
            .get_item(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("item {id} not found")))
    }

    /// Ownership-checked fetch: a `list_id` that doesn't match the item's
    /// owning list surfaces as `NotFound`, same as a missing id, so callers
    /// can't tell the two apart.
    async fn get_owned(&self, list_id: Uuid, id: Uuid) -> Result<TaskItem, CoreError> {
        let item = self.get(id).await?;
        if item.list_id != list_id {
            return Err(CoreError::not_found(format!("item {id} not found")));
        }
        Ok(item)
    }

    /// A recurring item's edit that touches an exception-trigger field goes
    /// through the exception protocol; everything else is a plain update.
    pub async fn update(&self, list_id: Uuid, id: Uuid, data: UpdateItemData) -> Result<TaskItem, CoreError> {
        if let Some(ref title) = data.title {
            validate_title(title)?;
        }

        let existing = self.get_owned(list_id, id).await?;
        let now = self.clock.now();

        if existing.is_recurring() && data.triggers_exception() {
            // A shifted `occurs_at` is a distinct exception kind from a
            // plain content edit.
            let exception_type = if data.mask.contains(&ItemField::OccursAt) {
                ExceptionType::Rescheduled
            } else {
                ExceptionType::Edited
            };
            let exception = NewTemplateException {
                template_id: existing
                    .recurring_template_id
                    .expect("is_recurring guarantees this"),
                occurs_at: existing.occurs_at.expect("is_recurring guarantees this"),
                exception_type,
                item_id: Some(id),
            };
            self.storage
                .apply_item_update_with_exception(id, exception, data, now)
                .await
        } else {
            self.storage.update_item(id, data, now).await
        }
    }

    /// Ownership-checked delete. Recurring items are soft-deleted behind a
    /// `deleted` exception so the generator never re-materializes the
    /// occurrence; plain items are hard deleted.
    pub async fn delete(&self, list_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let existing = self.get_owned(list_id, id).await?;
        let now = self.clock.now();

        if existing.is_recurring() {
            let exception = NewTemplateException {
                template_id: existing
                    .recurring_template_id
                    .expect("is_recurring guarantees this"),
                occurs_at: existing.occurs_at.expect("is_recurring guarantees this"),
                exception_type: ExceptionType::Deleted,
                item_id: Some(id),
            };
            self.storage
                .apply_item_delete_with_exception(id, exception, now)
                .await?;
            Ok(())
        } else {
            self.storage.delete_item(id).await
        }
    }

    /// Applies pagination caps and the default status scope, then invokes
    /// best-effort on-demand top-up for the item's list before reading:
    /// generation errors are logged and never fail the read.
    pub async fn list(&self, params: ListItemsParams) -> Result<ListItemsPage, CoreError> {
        let params = params.normalize(self.config.default_page_size, self.config.max_page_size);

        reconciliation::top_up_list(self.storage.as_ref(), self.clock.as_ref(), params.list_id, &self.config)
            .await;

        let (items, total) = self.storage.list_items(&params).await?;
        let has_more = params.offset + (items.len() as i64) < total;
        Ok(ListItemsPage { items, total, has_more })
    }
}
