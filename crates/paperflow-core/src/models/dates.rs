use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::error::ConstructionError;

// (format, year must have four digits)
const DATE_PATTERNS: &[(&str, bool)] = &[
    ("%Y-%m-%d", true),
    ("%Y/%m/%d", true),
    ("%d/%m/%Y", true),
    ("%d/%m/%y", false),
    ("%d-%m-%Y", true),
    ("%d.%m.%Y", true),
    ("%d %b %Y", true),
    ("%b %d %Y", true),
    ("%d %b, %Y", true),
    ("%b %d, %Y", true),
    ("%B %d, %Y", true),
    ("%d %B %Y", true),
];

/// Coerces the date formats seen in feeds and scraped pages into a date.
///
/// Day-first wins for ambiguous numeric dates (`05/06/2024` is 5 June).
pub fn parse_date(raw: &str) -> Result<NaiveDate, ConstructionError> {
    let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let s = compact.as_str();
    if s.is_empty() {
        return Err(ConstructionError::InvalidDate(raw.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }
    if let Some(prefix) = s.get(..10)
        && s.len() > 10
        && let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        return Ok(date);
    }

    for (pattern, four_digit_year) in DATE_PATTERNS {
        if let Ok(date) = NaiveDate::parse_from_str(s, pattern) {
            if *four_digit_year && date.year() < 1000 {
                continue;
            }
            return Ok(date);
        }
    }

    Err(ConstructionError::InvalidDate(raw.to_string()))
}

/// `parse_date` rendered as `YYYY-MM-DD`.
pub fn to_iso_date(raw: &str) -> Result<String, ConstructionError> {
    parse_date(raw).map(|d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_passthrough() {
        assert_eq!(to_iso_date("2025-05-12").unwrap(), "2025-05-12");
    }

    #[test]
    fn timestamps_keep_the_date_part() {
        assert_eq!(to_iso_date("2017-06-12T17:57:40Z").unwrap(), "2017-06-12");
        assert_eq!(to_iso_date("2023-10-04T15:00:00").unwrap(), "2023-10-04");
        assert_eq!(to_iso_date("2023-10-04 15:00:00+02:00").unwrap(), "2023-10-04");
    }

    #[test]
    fn day_first_numeric_dates() {
        assert_eq!(to_iso_date("12/05/2025").unwrap(), "2025-05-12");
        assert_eq!(to_iso_date("12/05/25").unwrap(), "2025-05-12");
        assert_eq!(to_iso_date("12-05-2025").unwrap(), "2025-05-12");
    }

    #[test]
    fn month_names() {
        assert_eq!(to_iso_date("May 12 2025").unwrap(), "2025-05-12");
        assert_eq!(to_iso_date("12 May 2025").unwrap(), "2025-05-12");
        assert_eq!(to_iso_date("June 21, 2018").unwrap(), "2018-06-21");
        assert_eq!(to_iso_date("  Jan  3,   2024 ").unwrap(), "2024-01-03");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            to_iso_date("sometime last week"),
            Err(ConstructionError::InvalidDate(_))
        ));
        assert!(to_iso_date("").is_err());
    }
}
