use crate::error::CoreError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Validate an IANA timezone name.
pub fn validate_timezone(timezone: &str) -> Result<(), CoreError> {
    Tz::from_str(timezone)
        .map(|_| ())
        .map_err(|_| CoreError::Validation(format!("invalid timezone: {timezone}")))
}

/// Parse an IANA timezone name, defaulting to UTC when unset.
pub fn parse_timezone(timezone: Option<&str>) -> Result<Tz, CoreError> {
    match timezone {
        None => Ok(Tz::UTC),
        Some(tz) => tz
            .parse()
            .map_err(|_| CoreError::Validation(format!("invalid timezone: {tz}"))),
    }
}

/// Convert a UTC instant to the given timezone's local wall-clock midnight,
/// returned back as a UTC instant. Used to compute `starts_at` for generated
/// occurrences.
pub fn midnight_in(at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    use chrono::TimeZone;
    let local = at.with_timezone(&tz);
    let midnight_naive = local.date_naive().and_hms_opt(0, 0, 0).expect("valid time");
    match tz.from_local_datetime(&midnight_naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_timezone_accepts_iana_names() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
    }

    #[test]
    fn validate_timezone_rejects_garbage() {
        assert!(validate_timezone("Not/AZone").is_err());
    }

    #[test]
    fn parse_timezone_defaults_to_utc() {
        assert_eq!(parse_timezone(None).unwrap(), Tz::UTC);
    }
}
