//! Lenient date parsing for collector sources (spec §4.3 step 3). Feed/JSON
//! timestamps are usually RFC3339 or RFC2822; HTML listings frequently carry
//! Swiss `DD.MM.YY` dates. Unparsable input returns `None`, never panics.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Pivot year 50: two-digit years below 50 are `20YY`, at or above are
/// `19YY`, matching the reference implementation's explicit branch.
fn expand_pivot_year(two_digit: u32) -> i32 {
    if two_digit < 50 {
        2000 + two_digit as i32
    } else {
        1900 + two_digit as i32
    }
}

/// Parse `DD.MM.YY` (e.g. `05.03.26`) at local midnight UTC. Returns `None`
/// for anything that isn't exactly that shape.
fn parse_dd_mm_yy(s: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = s.trim().split('.').collect();
    let [day, month, year] = parts[..] else { return None };
    if year.len() != 2 {
        return None;
    }
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year = expand_pivot_year(year.parse().ok()?);
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Try, in order: `DD.MM.YY`, RFC3339, RFC2822, and a handful of common feed
/// date formats. Returns `None` rather than erroring on total failure.
pub fn parse_lenient(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(dt) = parse_dd_mm_yy(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    const FORMATS: &[&str] =
        &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d %b %Y %H:%M:%S", "%Y-%m-%d"];
    for format in FORMATS {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dd_mm_yy_with_pivot_below_50_as_2000s() {
        let dt = parse_lenient("05.03.26").unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
    }

    #[test]
    fn parses_dd_mm_yy_with_pivot_at_or_above_50_as_1900s() {
        let dt = parse_lenient("05.03.75").unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(1975, 3, 5).unwrap());
    }

    #[test]
    fn parses_rfc3339() {
        assert!(parse_lenient("2026-01-01T12:00:00Z").is_some());
    }

    #[test]
    fn parses_rfc2822() {
        assert!(parse_lenient("Thu, 01 Jan 2026 12:00:00 GMT").is_some());
    }

    #[test]
    fn unparsable_input_returns_none_not_panic() {
        assert_eq!(parse_lenient("not a date"), None);
        assert_eq!(parse_lenient(""), None);
    }
}
