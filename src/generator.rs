//! Task Generator: wraps the pattern calculator, filters
//! occurrences against an exception set, and builds concrete (but not yet
//! persisted) item records. Deterministic apart from identifier assignment.

use crate::error::CoreError;
use crate::models::{RecurringTemplate, TemplateException};
use crate::pattern::{occurrences_between, PatternConfig};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// A materialized occurrence, ready for batched insertion by the storage
/// layer. Storage assigns `created_at`/`updated_at`/the initial `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub tags: Option<serde_json::Value>,
    pub priority: Option<i32>,
    pub estimated_duration_minutes: Option<i64>,
    pub due_at: Option<DateTime<Utc>>,
    pub starts_at: Option<DateTime<Utc>>,
    pub occurs_at: DateTime<Utc>,
    pub timezone: Option<String>,
    pub recurring_template_id: Uuid,
    pub due_offset_minutes: Option<i64>,
}

/// Generate occurrences for `template` in `[start, end)`, skipping any
/// timestamp an exception already covers.
pub fn generate(
    template: &RecurringTemplate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exceptions: &[TemplateException],
) -> Result<Vec<GeneratedItem>, CoreError> {
    let config = PatternConfig::parse(
        template.recurrence_pattern,
        &template.recurrence_config,
        template.created_at,
    )?;
    let tz = crate::timezone::parse_timezone(config.timezone())?;
    let excluded: HashSet<DateTime<Utc>> = exceptions
        .iter()
        .filter(|e| e.template_id == template.id)
        .map(|e| e.occurs_at)
        .collect();

    let occurrences = occurrences_between(&config, template.created_at, start, end)?;
    let timezone = config.timezone().map(|s| s.to_string());

    Ok(occurrences
        .into_iter()
        .filter(|t| !excluded.contains(t))
        .map(|t| {
            let starts_at = crate::timezone::midnight_in(t, tz);
            let due_at = template
                .due_offset_minutes
                .map(|offset| t + chrono::Duration::minutes(offset));
            GeneratedItem {
                id: Uuid::now_v7(),
                list_id: template.list_id,
                title: template.title.clone(),
                tags: template.tags.clone(),
                priority: template.priority,
                estimated_duration_minutes: template.estimated_duration_minutes,
                due_at,
                starts_at: Some(starts_at),
                occurs_at: t,
                timezone: timezone.clone(),
                recurring_template_id: template.id,
                due_offset_minutes: template.due_offset_minutes,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExceptionType, RecurrencePattern};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn template(pattern: RecurrencePattern, config: serde_json::Value) -> RecurringTemplate {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        RecurringTemplate {
            id: Uuid::now_v7(),
            list_id: Uuid::now_v7(),
            title: "Water plants".into(),
            tags: None,
            priority: Some(2),
            estimated_duration_minutes: Some(10),
            due_offset_minutes: Some(60),
            recurrence_pattern: pattern,
            recurrence_config: config,
            is_active: true,
            sync_horizon_days: 14,
            generation_horizon_days: 365,
            generated_through: now,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn generates_one_item_per_occurrence() {
        let tmpl = template(RecurrencePattern::Daily, serde_json::json!({}));
        let items = generate(
            &tmpl,
            tmpl.created_at,
            tmpl.created_at + chrono::Duration::days(14),
            &[],
        )
        .unwrap();
        assert_eq!(items.len(), 14);
        assert!(items.iter().all(|i| i.recurring_template_id == tmpl.id));
        assert!(items.iter().all(|i| i.title == "Water plants"));
    }

    #[test]
    fn due_at_honors_offset() {
        let tmpl = template(RecurrencePattern::Daily, serde_json::json!({}));
        let items = generate(
            &tmpl,
            tmpl.created_at,
            tmpl.created_at + chrono::Duration::days(1),
            &[],
        )
        .unwrap();
        assert_eq!(items[0].due_at, Some(items[0].occurs_at + chrono::Duration::minutes(60)));
    }

    #[test]
    fn exception_suppresses_occurrence() {
        let tmpl = template(RecurrencePattern::Daily, serde_json::json!({}));
        let skip_at = tmpl.created_at + chrono::Duration::days(3);
        let exceptions = vec![TemplateException {
            id: Uuid::now_v7(),
            template_id: tmpl.id,
            occurs_at: skip_at,
            exception_type: ExceptionType::Deleted,
            item_id: None,
            created_at: tmpl.created_at,
        }];
        let items = generate(
            &tmpl,
            tmpl.created_at,
            tmpl.created_at + chrono::Duration::days(14),
            &exceptions,
        )
        .unwrap();
        assert_eq!(items.len(), 13);
        assert!(items.iter().all(|i| i.occurs_at != skip_at));
    }

    #[test]
    fn repeated_generation_over_union_range_is_idempotent_in_count() {
        let tmpl = template(RecurrencePattern::Daily, serde_json::json!({}));
        let first = generate(
            &tmpl,
            tmpl.created_at,
            tmpl.created_at + chrono::Duration::days(7),
            &[],
        )
        .unwrap();
        let second = generate(
            &tmpl,
            tmpl.created_at + chrono::Duration::days(7),
            tmpl.created_at + chrono::Duration::days(14),
            &[],
        )
        .unwrap();
        let union = generate(
            &tmpl,
            tmpl.created_at,
            tmpl.created_at + chrono::Duration::days(14),
            &[],
        )
        .unwrap();
        assert_eq!(first.len() + second.len(), union.len());
    }
}
