use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

const COMMON_DATE_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S",    // Common format without timezone
  "%Y-%m-%dT%H:%M:%S",    // ISO 8601 without timezone
  "%Y-%m-%d %H:%M:%S %z", // Common format with timezone
];

/// Parse the loosely formatted dates found in frontmatter and page data.
/// Dates without an offset are taken as UTC.
pub fn parse_date(date_str: impl AsRef<str>) -> Option<DateTime<FixedOffset>> {
  let date_str = date_str.as_ref().trim();
  if date_str.is_empty() {
    return None;
  }

  if let Ok(parsed) = DateTime::parse_from_rfc3339(date_str) {
    return Some(parsed);
  }

  if let Ok(parsed) = DateTime::parse_from_rfc2822(date_str) {
    return Some(parsed);
  }

  for fmt in COMMON_DATE_FORMATS {
    if let Ok(parsed) = DateTime::parse_from_str(date_str, fmt) {
      return Some(parsed);
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(date_str, fmt) {
      return Some(parsed.and_utc().fixed_offset());
    }
  }

  NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|d| d.and_utc().fixed_offset())
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
  DateTime::from_timestamp_millis(millis)
}

/// RFC 2822 in the `GMT` spelling feed readers expect,
/// e.g. `Wed, 01 May 2024 00:00:00 GMT`.
pub fn rss_date(date: DateTime<Utc>) -> String {
  date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
