//! Pattern Calculator: pure functions that, given a pattern kind, a typed
//! configuration, and a half-open time range `[start, end)`, enumerate
//! occurrence timestamps. No I/O, no identifiers, no exceptions — those
//! belong to the generator one layer up.

use crate::error::CoreError;
use crate::models::RecurrencePattern;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq)]
pub struct DailyConfig {
    pub interval: u32,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyConfig {
    pub interval: u32,
    pub weekdays: Vec<Weekday>,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyConfig {
    pub interval: u32,
    pub day_of_month: u32,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearlyConfig {
    pub interval: u32,
    pub month: u32,
    pub day_of_month: u32,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekdaysConfig {
    pub hour: u32,
    pub minute: u32,
    pub timezone: Option<String>,
}

/// A tagged sum type, one variant per pattern kind: the core operates on
/// this typed variant, never on the raw `serde_json::Value` the template
/// stores.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternConfig {
    Daily(DailyConfig),
    Weekly(WeeklyConfig),
    Biweekly(WeeklyConfig),
    Monthly(MonthlyConfig),
    Quarterly(MonthlyConfig),
    Yearly(YearlyConfig),
    Weekdays(WeekdaysConfig),
}

impl PatternConfig {
    pub fn timezone(&self) -> Option<&str> {
        match self {
            PatternConfig::Daily(c) => c.timezone.as_deref(),
            PatternConfig::Weekly(c) | PatternConfig::Biweekly(c) => c.timezone.as_deref(),
            PatternConfig::Monthly(c) | PatternConfig::Quarterly(c) => c.timezone.as_deref(),
            PatternConfig::Yearly(c) => c.timezone.as_deref(),
            PatternConfig::Weekdays(c) => c.timezone.as_deref(),
        }
    }

    pub fn hour_minute(&self) -> (u32, u32) {
        match self {
            PatternConfig::Daily(c) => (c.hour, c.minute),
            PatternConfig::Weekly(c) | PatternConfig::Biweekly(c) => (c.hour, c.minute),
            PatternConfig::Monthly(c) | PatternConfig::Quarterly(c) => (c.hour, c.minute),
            PatternConfig::Yearly(c) => (c.hour, c.minute),
            PatternConfig::Weekdays(c) => (c.hour, c.minute),
        }
    }
}

fn get_field<'a>(raw: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    raw.get(key)
}

fn get_u32(raw: &serde_json::Value, key: &str, default: u32) -> Result<u32, CoreError> {
    match get_field(raw, key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| CoreError::Validation(format!("invalid config field `{key}`: {v}"))),
    }
}

fn get_positive_interval(raw: &serde_json::Value, default: u32) -> Result<u32, CoreError> {
    let interval = get_u32(raw, "interval", default)?;
    if interval == 0 {
        return Err(CoreError::Validation(
            "interval must be a positive integer".to_string(),
        ));
    }
    Ok(interval)
}

fn get_timezone(raw: &serde_json::Value) -> Result<Option<String>, CoreError> {
    match get_field(raw, "timezone") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            crate::timezone::validate_timezone(s)?;
            Ok(Some(s.clone()))
        }
        Some(v) => Err(CoreError::Validation(format!("invalid timezone field: {v}"))),
    }
}

fn parse_weekday(s: &str) -> Result<Weekday, CoreError> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(CoreError::Validation(format!("invalid weekday: {other}"))),
    }
}

fn get_weekdays(raw: &serde_json::Value, default: Weekday) -> Result<Vec<Weekday>, CoreError> {
    match get_field(raw, "weekday").or_else(|| get_field(raw, "weekdays")) {
        None | Some(serde_json::Value::Null) => Ok(vec![default]),
        Some(serde_json::Value::String(s)) => Ok(vec![parse_weekday(s)?]),
        Some(serde_json::Value::Array(items)) => {
            if items.is_empty() {
                return Ok(vec![default]);
            }
            items
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => parse_weekday(s),
                    other => Err(CoreError::Validation(format!(
                        "invalid weekday entry: {other}"
                    ))),
                })
                .collect()
        }
        Some(v) => Err(CoreError::Validation(format!("invalid weekdays field: {v}"))),
    }
}

impl PatternConfig {
    /// Parse the neutral `recurrence_config` payload into the typed variant
    /// matching `pattern`. `anchor` supplies the default weekday/day-of-month
    /// when the config omits them (the template's `created_at`).
    pub fn parse(
        pattern: RecurrencePattern,
        raw: &serde_json::Value,
        anchor: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if !raw.is_object() && !raw.is_null() {
            return Err(CoreError::Validation(
                "recurrence_config must be an object".to_string(),
            ));
        }
        let empty = serde_json::json!({});
        let raw = if raw.is_null() { &empty } else { raw };

        let anchor_weekday = anchor.weekday();
        let anchor_day_of_month = anchor.day();
        let anchor_month = anchor.month();

        match pattern {
            RecurrencePattern::Daily => Ok(PatternConfig::Daily(DailyConfig {
                interval: get_positive_interval(raw, 1)?,
                hour: get_u32(raw, "hour", 0)?,
                minute: get_u32(raw, "minute", 0)?,
                timezone: get_timezone(raw)?,
            })),
            RecurrencePattern::Weekly => Ok(PatternConfig::Weekly(WeeklyConfig {
                interval: get_positive_interval(raw, 1)?,
                weekdays: get_weekdays(raw, anchor_weekday)?,
                hour: get_u32(raw, "hour", 0)?,
                minute: get_u32(raw, "minute", 0)?,
                timezone: get_timezone(raw)?,
            })),
            RecurrencePattern::Biweekly => Ok(PatternConfig::Biweekly(WeeklyConfig {
                interval: get_positive_interval(raw, 2).map(|i| if i == 1 { 2 } else { i })?,
                weekdays: get_weekdays(raw, anchor_weekday)?,
                hour: get_u32(raw, "hour", 0)?,
                minute: get_u32(raw, "minute", 0)?,
                timezone: get_timezone(raw)?,
            })),
            RecurrencePattern::Monthly => Ok(PatternConfig::Monthly(MonthlyConfig {
                interval: get_positive_interval(raw, 1)?,
                day_of_month: get_u32(raw, "day_of_month", anchor_day_of_month)?,
                hour: get_u32(raw, "hour", 0)?,
                minute: get_u32(raw, "minute", 0)?,
                timezone: get_timezone(raw)?,
            })),
            RecurrencePattern::Quarterly => Ok(PatternConfig::Quarterly(MonthlyConfig {
                interval: 3,
                day_of_month: get_u32(raw, "day_of_month", anchor_day_of_month)?,
                hour: get_u32(raw, "hour", 0)?,
                minute: get_u32(raw, "minute", 0)?,
                timezone: get_timezone(raw)?,
            })),
            RecurrencePattern::Yearly => Ok(PatternConfig::Yearly(YearlyConfig {
                interval: get_positive_interval(raw, 1)?,
                month: get_u32(raw, "month", anchor_month)?,
                day_of_month: get_u32(raw, "day_of_month", anchor_day_of_month)?,
                hour: get_u32(raw, "hour", 0)?,
                minute: get_u32(raw, "minute", 0)?,
                timezone: get_timezone(raw)?,
            })),
            RecurrencePattern::Weekdays => Ok(PatternConfig::Weekdays(WeekdaysConfig {
                hour: get_u32(raw, "hour", 0)?,
                minute: get_u32(raw, "minute", 0)?,
                timezone: get_timezone(raw)?,
            })),
        }
    }
}

fn div_floor(a: i64, b: i64) -> i64 {
    let d = a / b;
    let r = a % b;
    if (r != 0) && ((r < 0) != (b < 0)) {
        d - 1
    } else {
        d
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    -div_floor(-a, b)
}

/// Builds the UTC instant for local wall-clock `(date, hour, minute)` in
/// `tz`. Ambiguous/ skipped local times (DST transitions) resolve to the
/// earliest valid interpretation, falling back to `date` at midnight UTC in
/// the (rare, invalid-config) case no mapping exists at all.
fn local_instant(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => Some(dt.with_timezone(&Utc)),
        None => {
            // Spring-forward gap: nudge forward an hour and retry once.
            let bumped = naive + chrono::Duration::hours(1);
            tz.from_local_datetime(&bumped)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid calendar month");
    first_of_next.pred_opt().expect("valid day").day()
}

/// Enumerate occurrence timestamps in the half-open range `[start, end)`.
pub fn occurrences_between(
    config: &PatternConfig,
    anchor: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, CoreError> {
    if end <= start {
        return Ok(Vec::new());
    }
    let tz: Tz = crate::timezone::parse_timezone(config.timezone())?;
    let (hour, minute) = config.hour_minute();

    let mut out = match config {
        PatternConfig::Daily(c) => daily_occurrences(tz, anchor, start, end, c.interval, hour, minute),
        PatternConfig::Weekly(c) => {
            weekly_occurrences(tz, anchor, start, end, c.interval, &c.weekdays, hour, minute)
        }
        PatternConfig::Biweekly(c) => {
            weekly_occurrences(tz, anchor, start, end, c.interval, &c.weekdays, hour, minute)
        }
        PatternConfig::Monthly(c) => {
            monthly_occurrences(tz, anchor, start, end, c.interval, c.day_of_month, hour, minute)
        }
        PatternConfig::Quarterly(c) => {
            monthly_occurrences(tz, anchor, start, end, c.interval, c.day_of_month, hour, minute)
        }
        PatternConfig::Yearly(c) => yearly_occurrences(
            tz,
            anchor,
            start,
            end,
            c.interval,
            c.month,
            c.day_of_month,
            hour,
            minute,
        ),
        PatternConfig::Weekdays(_) => weekdays_occurrences(tz, start, end, hour, minute),
    };
    out.sort();
    out.dedup();
    Ok(out)
}

fn daily_occurrences(
    tz: Tz,
    anchor: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: u32,
    hour: u32,
    minute: u32,
) -> Vec<DateTime<Utc>> {
    let anchor_date = anchor.with_timezone(&tz).date_naive();
    // Expand by one day either side to absorb timezone-offset shifts at the
    // boundary, then filter precisely against the UTC instants below.
    let start_date = (start - chrono::Duration::days(1)).with_timezone(&tz).date_naive();
    let end_date = (end + chrono::Duration::days(1)).with_timezone(&tz).date_naive();

    let interval = interval as i64;
    let k_min = div_ceil((start_date - anchor_date).num_days(), interval);
    let k_max = div_floor((end_date - anchor_date).num_days(), interval);

    let mut out = Vec::new();
    for k in k_min..=k_max {
        let date = anchor_date + chrono::Duration::days(k * interval);
        if let Some(dt) = local_instant(tz, date, hour, minute) {
            if dt >= start && dt < end {
                out.push(dt);
            }
        }
    }
    out
}

fn monday_of_week(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn weekly_occurrences(
    tz: Tz,
    anchor: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: u32,
    weekdays: &[Weekday],
    hour: u32,
    minute: u32,
) -> Vec<DateTime<Utc>> {
    if weekdays.is_empty() || interval == 0 {
        return Vec::new();
    }
    let anchor_monday = monday_of_week(anchor.with_timezone(&tz).date_naive());
    let start_date = (start - chrono::Duration::days(1)).with_timezone(&tz).date_naive();
    let end_date = (end + chrono::Duration::days(1)).with_timezone(&tz).date_naive();

    let interval = interval as i64;
    let week_min = div_floor((monday_of_week(start_date) - anchor_monday).num_days(), 7 * interval);
    let week_max = div_ceil((monday_of_week(end_date) - anchor_monday).num_days(), 7 * interval);

    let mut out = Vec::new();
    for w in week_min..=week_max {
        let week_monday = anchor_monday + chrono::Duration::days(w * interval * 7);
        for wd in weekdays {
            let date = week_monday + chrono::Duration::days(wd.num_days_from_monday() as i64);
            if let Some(dt) = local_instant(tz, date, hour, minute) {
                if dt >= start && dt < end {
                    out.push(dt);
                }
            }
        }
    }
    out
}

fn monthly_occurrences(
    tz: Tz,
    anchor: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: u32,
    day_of_month: u32,
    hour: u32,
    minute: u32,
) -> Vec<DateTime<Utc>> {
    if interval == 0 {
        return Vec::new();
    }
    let anchor_local = anchor.with_timezone(&tz).date_naive();
    let anchor_index = anchor_local.year() as i64 * 12 + anchor_local.month() as i64 - 1;

    let start_local = (start - chrono::Duration::days(31)).with_timezone(&tz).date_naive();
    let end_local = (end + chrono::Duration::days(31)).with_timezone(&tz).date_naive();
    let start_index = start_local.year() as i64 * 12 + start_local.month() as i64 - 1;
    let end_index = end_local.year() as i64 * 12 + end_local.month() as i64 - 1;

    let interval = interval as i64;
    let k_min = div_ceil(start_index - anchor_index, interval);
    let k_max = div_floor(end_index - anchor_index, interval);

    let mut out = Vec::new();
    for k in k_min..=k_max {
        let month_index = anchor_index + k * interval;
        let year = (month_index.div_euclid(12)) as i32;
        let month = (month_index.rem_euclid(12) + 1) as u32;
        let last_day = last_day_of_month(year, month);
        let day = day_of_month.min(last_day).max(1);
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        if let Some(dt) = local_instant(tz, date, hour, minute) {
            if dt >= start && dt < end {
                out.push(dt);
            }
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn yearly_occurrences(
    tz: Tz,
    anchor: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: u32,
    month: u32,
    day_of_month: u32,
    hour: u32,
    minute: u32,
) -> Vec<DateTime<Utc>> {
    if interval == 0 || !(1..=12).contains(&month) {
        return Vec::new();
    }
    let anchor_year = anchor.with_timezone(&tz).date_naive().year() as i64;
    let start_year = (start - chrono::Duration::days(366)).with_timezone(&tz).date_naive().year() as i64;
    let end_year = (end + chrono::Duration::days(366)).with_timezone(&tz).date_naive().year() as i64;

    let interval = interval as i64;
    let k_min = div_ceil(start_year - anchor_year, interval);
    let k_max = div_floor(end_year - anchor_year, interval);

    let mut out = Vec::new();
    for k in k_min..=k_max {
        let year = (anchor_year + k * interval) as i32;
        let last_day = last_day_of_month(year, month);
        let day = day_of_month.min(last_day).max(1);
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        if let Some(dt) = local_instant(tz, date, hour, minute) {
            if dt >= start && dt < end {
                out.push(dt);
            }
        }
    }
    out
}

fn weekdays_occurrences(
    tz: Tz,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    hour: u32,
    minute: u32,
) -> Vec<DateTime<Utc>> {
    let start_date = (start - chrono::Duration::days(1)).with_timezone(&tz).date_naive();
    let end_date = (end + chrono::Duration::days(1)).with_timezone(&tz).date_naive();

    let mut out = Vec::new();
    let mut date = start_date;
    while date <= end_date {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            if let Some(dt) = local_instant(tz, date, hour, minute) {
                if dt >= start && dt < end {
                    out.push(dt);
                }
            }
        }
        date = date.succ_opt().expect("date does not overflow");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_interval_one() {
        let cfg = PatternConfig::Daily(DailyConfig {
            interval: 1,
            hour: 0,
            minute: 0,
            timezone: None,
        });
        let anchor = utc(2026, 1, 1, 0, 0);
        let occ = occurrences_between(&cfg, anchor, anchor, anchor + chrono::Duration::days(14)).unwrap();
        assert_eq!(occ.len(), 14);
        assert_eq!(occ[0], utc(2026, 1, 1, 0, 0));
        assert_eq!(occ[13], utc(2026, 1, 14, 0, 0));
    }

    #[test]
    fn daily_rejects_zero_interval_at_parse_time() {
        let raw = serde_json::json!({ "interval": 0 });
        let err = PatternConfig::parse(RecurrencePattern::Daily, &raw, utc(2026, 1, 1, 0, 0));
        assert!(err.is_err());
    }

    #[test]
    fn weekly_from_friday_lands_on_next_monday() {
        let cfg = PatternConfig::Weekly(WeeklyConfig {
            interval: 1,
            weekdays: vec![Weekday::Mon],
            hour: 0,
            minute: 0,
            timezone: None,
        });
        let friday = utc(2026, 1, 2, 0, 0); // 2026-01-02 is a Friday
        let occ = occurrences_between(
            &cfg,
            friday,
            friday,
            friday + chrono::Duration::days(7),
        )
        .unwrap();
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].weekday(), Weekday::Mon);
        assert_eq!(occ[0], utc(2026, 1, 5, 0, 0));
    }

    #[test]
    fn weekdays_between_two_mondays_yields_five() {
        let cfg = PatternConfig::Weekdays(WeekdaysConfig {
            hour: 0,
            minute: 0,
            timezone: None,
        });
        let monday1 = utc(2026, 1, 5, 0, 0);
        let monday2 = utc(2026, 1, 12, 0, 0);
        let occ = occurrences_between(&cfg, monday1, monday1, monday2).unwrap();
        assert_eq!(occ.len(), 5);
    }

    #[test]
    fn monthly_skips_to_last_valid_day_in_february() {
        let cfg = PatternConfig::Monthly(MonthlyConfig {
            interval: 1,
            day_of_month: 31,
            hour: 0,
            minute: 0,
            timezone: None,
        });
        let anchor = utc(2026, 1, 31, 0, 0);
        let occ = occurrences_between(
            &cfg,
            anchor,
            anchor,
            anchor + chrono::Duration::days(70),
        )
        .unwrap();
        // Jan 31, then Feb 28 (2026 is not a leap year), then Mar 31.
        assert_eq!(occ.len(), 3);
        assert_eq!(occ[1], utc(2026, 2, 28, 0, 0));
    }

    #[test]
    fn quarterly_ignores_supplied_interval() {
        let raw = serde_json::json!({ "interval": 1, "day_of_month": 1 });
        let cfg = PatternConfig::parse(RecurrencePattern::Quarterly, &raw, utc(2026, 1, 1, 0, 0)).unwrap();
        match cfg {
            PatternConfig::Quarterly(c) => assert_eq!(c.interval, 3),
            _ => panic!("expected quarterly config"),
        }
    }

    #[test]
    fn yearly_same_month_day_across_years() {
        let cfg = PatternConfig::Yearly(YearlyConfig {
            interval: 1,
            month: 3,
            day_of_month: 15,
            hour: 9,
            minute: 0,
            timezone: None,
        });
        let anchor = utc(2024, 3, 15, 9, 0);
        let occ = occurrences_between(
            &cfg,
            anchor,
            anchor,
            anchor + chrono::Duration::days(800),
        )
        .unwrap();
        assert_eq!(occ.len(), 2);
        assert_eq!(occ[1].year(), 2026);
    }

    #[test]
    fn half_open_range_excludes_end() {
        let cfg = PatternConfig::Daily(DailyConfig {
            interval: 1,
            hour: 0,
            minute: 0,
            timezone: None,
        });
        let anchor = utc(2026, 1, 1, 0, 0);
        let occ = occurrences_between(&cfg, anchor, anchor, anchor + chrono::Duration::days(1)).unwrap();
        assert_eq!(occ, vec![anchor]);
    }

    #[test]
    fn invalid_pattern_rejected_by_from_str() {
        assert!("not-a-pattern".parse::<RecurrencePattern>().is_err());
    }
}
