use crate::CoreError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Timestamp format used in sheet cells (`date_joined`, `date_claimed`).
pub const SHEET_TIMESTAMP: &str = "%m/%d/%Y %H:%M:%S";
/// Timestamp format produced by the national database export.
pub const WAREHOUSE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
pub const DAY: &str = "%Y-%m-%d";

const TIMESTAMP_WIDTH: usize = 19;

pub fn format_sheet_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(SHEET_TIMESTAMP).to_string()
}

pub fn format_warehouse_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(WAREHOUSE_TIMESTAMP).to_string()
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY).to_string()
}

/// Parses a joined/added timestamp as stored in a sheet. Only the first 19
/// characters are significant and the value is read as UTC; both the sheet
/// and the warehouse layouts are accepted since rows from either end up in
/// Hub HQ.
pub fn parse_joined(value: &str) -> Result<DateTime<Utc>, CoreError> {
    let trimmed = value.trim();
    let head = trimmed
        .char_indices()
        .nth(TIMESTAMP_WIDTH)
        .map(|(idx, _)| &trimmed[..idx])
        .unwrap_or(trimmed);

    let parsed = NaiveDateTime::parse_from_str(head, SHEET_TIMESTAMP)
        .or_else(|_| NaiveDateTime::parse_from_str(head, WAREHOUSE_TIMESTAMP))
        .map_err(|err| CoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: err.to_string(),
        })?;
    Ok(parsed.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_sheet_layout_and_ignores_trailing_text() {
        let parsed = parse_joined("03/14/2026 09:30:00 (form)").expect("sheet timestamp");
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0)
                .single()
                .expect("valid timestamp")
        );
    }

    #[test]
    fn parses_warehouse_layout() {
        let parsed = parse_joined("2026-03-14 09:30:00").expect("warehouse timestamp");
        assert_eq!(format_sheet_timestamp(parsed), "03/14/2026 09:30:00");
    }

    #[test]
    fn rejects_blank_and_garbage() {
        assert!(parse_joined("").is_err());
        assert!(parse_joined("last tuesday").is_err());
    }
}
