//! List-query parameters: pagination caps and the default
//! status scope. Building a filter-expression AST is explicitly out of
//! scope here — storage matches directly on these fields.

use crate::models::{ItemStatus, TaskItem};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ListItemsParams {
    pub list_id: Uuid,
    pub status: Option<ItemStatus>,
    pub offset: i64,
    pub limit: i64,
}

impl ListItemsParams {
    /// Clamp `offset`/`limit` to the configured bounds. Negative offsets
    /// clamp to zero; an unset or out-of-range limit falls back to
    /// `default_page_size`, capped at `max_page_size`.
    pub fn normalize(mut self, default_page_size: i64, max_page_size: i64) -> Self {
        if self.offset < 0 {
            self.offset = 0;
        }
        if self.limit <= 0 {
            self.limit = default_page_size;
        }
        if self.limit > max_page_size {
            self.limit = max_page_size;
        }
        self
    }

    /// When no explicit status filter was given, the default scope excludes
    /// `archived` and `cancelled` items.
    pub fn excluded_statuses(&self) -> Vec<ItemStatus> {
        if self.status.is_some() {
            Vec::new()
        } else {
            vec![ItemStatus::Archived, ItemStatus::Cancelled]
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListItemsPage {
    pub items: Vec<TaskItem>,
    pub total: i64,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(offset: i64, limit: i64) -> ListItemsParams {
        ListItemsParams {
            list_id: Uuid::now_v7(),
            status: None,
            offset,
            limit,
        }
    }

    #[test]
    fn negative_offset_clamps_to_zero() {
        let p = params(-5, 25).normalize(25, 100);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn zero_limit_falls_back_to_default() {
        let p = params(0, 0).normalize(25, 100);
        assert_eq!(p.limit, 25);
    }

    #[test]
    fn oversized_limit_caps_at_max() {
        let p = params(0, 1_000).normalize(25, 100);
        assert_eq!(p.limit, 100);
    }

    #[test]
    fn default_scope_excludes_archived_and_cancelled() {
        let p = params(0, 25);
        let excluded = p.excluded_statuses();
        assert!(excluded.contains(&ItemStatus::Archived));
        assert!(excluded.contains(&ItemStatus::Cancelled));
    }

    #[test]
    fn explicit_status_filter_disables_default_exclusion() {
        let mut p = params(0, 25);
        p.status = Some(ItemStatus::Done);
        assert!(p.excluded_statuses().is_empty());
    }
}
