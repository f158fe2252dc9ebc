use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Recurring Template
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
    Weekdays,
}

#[derive(Error, Debug, PartialEq)]
#[error("invalid recurrence pattern: {0}")]
pub struct ParseRecurrencePatternError(pub String);

impl FromStr for RecurrencePattern {
    type Err = ParseRecurrencePatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "biweekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            "weekdays" => Ok(Self::Weekdays),
            _ => Err(ParseRecurrencePatternError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurringTemplate {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub tags: Option<serde_json::Value>,
    pub priority: Option<i32>,
    pub estimated_duration_minutes: Option<i64>,
    pub due_offset_minutes: Option<i64>,
    pub recurrence_pattern: RecurrencePattern,
    /// The neutral key/value payload; parsed into a typed `PatternConfig`
    /// on demand by the pattern calculator.
    pub recurrence_config: serde_json::Value,
    pub is_active: bool,
    pub sync_horizon_days: i64,
    pub generation_horizon_days: i64,
    pub generated_through: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Data required to create a new template. Horizons of zero mean "use the
/// configured default".
#[derive(Debug, Clone)]
pub struct NewTemplateData {
    pub list_id: Uuid,
    pub title: String,
    pub tags: Option<serde_json::Value>,
    pub priority: Option<i32>,
    pub estimated_duration_minutes: Option<i64>,
    pub due_offset_minutes: Option<i64>,
    pub recurrence_pattern: RecurrencePattern,
    pub recurrence_config: serde_json::Value,
    pub sync_horizon_days: i64,
    pub generation_horizon_days: i64,
}

/// Mask-based update for a template: a struct of optional fields plus an
/// explicit mask of which field names were actually set.
#[derive(Debug, Clone, Default)]
pub struct UpdateTemplateData {
    pub mask: Vec<TemplateField>,
    pub title: Option<String>,
    pub tags: Option<Option<serde_json::Value>>,
    pub priority: Option<Option<i32>>,
    pub estimated_duration_minutes: Option<Option<i64>>,
    pub due_offset_minutes: Option<Option<i64>>,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_config: Option<serde_json::Value>,
    pub sync_horizon_days: Option<i64>,
    pub generation_horizon_days: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateField {
    Title,
    Tags,
    Priority,
    EstimatedDuration,
    DueOffset,
    RecurrencePattern,
    RecurrenceConfig,
    SyncHorizonDays,
    GenerationHorizonDays,
    IsActive,
}

impl TemplateField {
    /// Fields whose presence in the mask makes this a "pattern change",
    /// requiring future-occurrence regeneration rather than a plain write.
    pub const PATTERN_FIELDS: [TemplateField; 4] = [
        TemplateField::RecurrencePattern,
        TemplateField::RecurrenceConfig,
        TemplateField::SyncHorizonDays,
        TemplateField::GenerationHorizonDays,
    ];
}

impl UpdateTemplateData {
    pub fn is_pattern_change(&self) -> bool {
        self.mask
            .iter()
            .any(|f| TemplateField::PATTERN_FIELDS.contains(f))
    }
}

// ============================================================================
// Task Item
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ItemStatus {
    Todo,
    Done,
    Archived,
    Cancelled,
}

#[derive(Error, Debug, PartialEq)]
#[error("invalid item status: {0}")]
pub struct ParseItemStatusError(pub String);

impl FromStr for ItemStatus {
    type Err = ParseItemStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "done" => Ok(Self::Done),
            "archived" => Ok(Self::Archived),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseItemStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub status: ItemStatus,
    pub priority: Option<i32>,
    pub tags: Option<serde_json::Value>,
    pub due_at: Option<DateTime<Utc>>,
    pub starts_at: Option<DateTime<Utc>>,
    pub occurs_at: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: Option<i64>,
    pub actual_duration_minutes: Option<i64>,
    pub timezone: Option<String>,
    pub recurring_template_id: Option<Uuid>,
    pub due_offset_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl TaskItem {
    /// An item is "recurring" iff both `recurring_template_id` and
    /// `occurs_at` are present.
    pub fn is_recurring(&self) -> bool {
        self.recurring_template_id.is_some() && self.occurs_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewItemData {
    pub list_id: Uuid,
    pub title: String,
    pub priority: Option<i32>,
    pub tags: Option<serde_json::Value>,
    pub due_at: Option<DateTime<Utc>>,
    pub starts_at: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: Option<i64>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateItemData {
    pub mask: Vec<ItemField>,
    pub title: Option<String>,
    pub status: Option<ItemStatus>,
    pub priority: Option<Option<i32>>,
    pub tags: Option<Option<serde_json::Value>>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub starts_at: Option<Option<DateTime<Utc>>>,
    pub occurs_at: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: Option<Option<i64>>,
    pub actual_duration_minutes: Option<Option<i64>>,
    pub timezone: Option<Option<String>>,
    /// Parsed, strictly-validated `version` the caller last observed.
    pub etag: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemField {
    Title,
    Status,
    Priority,
    Tags,
    DueAt,
    StartsAt,
    OccursAt,
    EstimatedDuration,
    ActualDuration,
    Timezone,
}

impl ItemField {
    /// Editing any of these on a recurring item triggers the exception
    /// protocol instead of a plain write.
    pub const EXCEPTION_TRIGGERS: [ItemField; 7] = [
        ItemField::Title,
        ItemField::Tags,
        ItemField::Priority,
        ItemField::EstimatedDuration,
        ItemField::DueAt,
        ItemField::StartsAt,
        ItemField::OccursAt,
    ];
}

impl UpdateItemData {
    pub fn triggers_exception(&self) -> bool {
        self.mask
            .iter()
            .any(|f| ItemField::EXCEPTION_TRIGGERS.contains(f))
    }
}

// ============================================================================
// Recurring Template Exception
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ExceptionType {
    Deleted,
    Edited,
    Rescheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateException {
    pub id: Uuid,
    pub template_id: Uuid,
    pub occurs_at: DateTime<Utc>,
    pub exception_type: ExceptionType,
    pub item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTemplateException {
    pub template_id: Uuid,
    pub occurs_at: DateTime<Utc>,
    pub exception_type: ExceptionType,
    pub item_id: Option<Uuid>,
}

// ============================================================================
// Generation Job
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Discarded,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationJob {
    pub id: Uuid,
    pub template_id: Uuid,
    pub generate_from: DateTime<Utc>,
    pub generate_until: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub retry_count: i32,
    pub claimed_by: Option<String>,
    pub available_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGenerationJob {
    pub template_id: Uuid,
    pub generate_from: DateTime<Utc>,
    pub generate_until: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
}

// ============================================================================
// Dead-Letter Job
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum JobErrorType {
    Permanent,
    Exhausted,
    Panic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DeadLetterResolution {
    Pending,
    Retried,
    Discarded,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeadLetterJob {
    pub id: Uuid,
    pub job_id: Uuid,
    pub template_id: Uuid,
    pub generate_from: DateTime<Utc>,
    pub generate_until: DateTime<Utc>,
    pub error_type: JobErrorType,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub resolution: DeadLetterResolution,
    pub reviewed_by: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Cron Lease
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CronLease {
    pub run_type: String,
    pub holder_id: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Etag parsing (strict parse, trailing garbage rejected)
// ============================================================================

#[derive(Error, Debug, PartialEq)]
#[error("invalid etag: {0}")]
pub struct ParseEtagError(pub String);

/// Parses an etag string into the positive integer version it must encode.
/// Rejects leading/trailing whitespace, signs, decimals, leading zeros
/// beyond a bare "0", and anything non-digit — a strict parse, not
/// `str::parse::<i64>()` with its permissive leading `+`/`-` handling.
pub fn parse_etag(raw: &str) -> Result<i64, ParseEtagError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseEtagError(raw.to_string()));
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(ParseEtagError(raw.to_string()));
    }
    let value: i64 = raw
        .parse()
        .map_err(|_| ParseEtagError(raw.to_string()))?;
    if value <= 0 {
        return Err(ParseEtagError(raw.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_etag_accepts_plain_positive_integers() {
        assert_eq!(parse_etag("1"), Ok(1));
        assert_eq!(parse_etag("42"), Ok(42));
    }

    #[test]
    fn parse_etag_rejects_trailing_garbage() {
        assert!(parse_etag("123abc").is_err());
    }

    #[test]
    fn parse_etag_rejects_leading_whitespace() {
        assert!(parse_etag(" 123").is_err());
    }

    #[test]
    fn parse_etag_rejects_decimals() {
        assert!(parse_etag("1.5").is_err());
    }

    #[test]
    fn parse_etag_rejects_negative() {
        assert!(parse_etag("-1").is_err());
    }

    #[test]
    fn parse_etag_rejects_zero() {
        assert!(parse_etag("0").is_err());
    }

    #[test]
    fn parse_etag_rejects_empty() {
        assert!(parse_etag("").is_err());
    }

    #[test]
    fn parse_etag_rejects_leading_zeros() {
        assert!(parse_etag("007").is_err());
    }

    #[test]
    fn template_field_pattern_change_detection() {
        let mut update = UpdateTemplateData::default();
        update.mask = vec![TemplateField::Title];
        assert!(!update.is_pattern_change());
        update.mask.push(TemplateField::RecurrencePattern);
        assert!(update.is_pattern_change());
    }

    #[test]
    fn item_field_exception_trigger_detection() {
        let mut update = UpdateItemData::default();
        update.mask = vec![ItemField::Status];
        assert!(!update.triggers_exception());
        update.mask.push(ItemField::Title);
        assert!(update.triggers_exception());
    }

    #[test]
    fn task_item_is_recurring_requires_both_fields() {
        let base = TaskItem {
            id: Uuid::now_v7(),
            list_id: Uuid::now_v7(),
            title: "x".into(),
            status: ItemStatus::Todo,
            priority: None,
            tags: None,
            due_at: None,
            starts_at: None,
            occurs_at: None,
            estimated_duration_minutes: None,
            actual_duration_minutes: None,
            timezone: None,
            recurring_template_id: None,
            due_offset_minutes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        };
        assert!(!base.is_recurring());

        let mut with_template = base.clone();
        with_template.recurring_template_id = Some(Uuid::now_v7());
        assert!(!with_template.is_recurring());

        let mut recurring = with_template.clone();
        recurring.occurs_at = Some(Utc::now());
        assert!(recurring.is_recurring());
    }
}
