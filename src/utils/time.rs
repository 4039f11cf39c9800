use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Calendar date of a stored UTC timestamp in the server's local time zone.
pub fn local_date(dt: NaiveDateTime) -> NaiveDate {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
        .with_timezone(&Local)
        .date_naive()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `dd/mm/yyyy`, the way dates are printed on Brazilian paperwork.
pub fn format_br_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Accepts a plain `YYYY-MM-DD` date or a full RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_dates_day_first() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(format_br_date(date), "07/03/2024");
    }

    #[test]
    fn parses_plain_and_rfc3339_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(parse_date("2024-12-31"), Some(expected));
        assert_eq!(parse_date(" 2024-12-31 "), Some(expected));
        assert_eq!(parse_date("2024-12-31T10:00:00.000Z"), Some(expected));
        assert_eq!(parse_date("31/12/2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn iso_output_is_utc() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(to_iso(dt), "2024-01-02T03:04:05+00:00");
    }
}
