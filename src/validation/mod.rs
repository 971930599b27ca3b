use bigdecimal::BigDecimal;
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, Utc};
use std::fmt;

pub const MEMBER_ID_MAX_LEN: usize = 64;
pub const PARTNER_ID_MAX_LEN: usize = 64;
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MAX_QUERY_MONTHS: u32 = 3;
pub const DEFAULT_QUERY_MONTHS: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_member_id(member_id: &str) -> ValidationResult {
    validate_required("memberId", member_id)?;
    validate_max_len("memberId", member_id, MEMBER_ID_MAX_LEN)
}

pub fn validate_partner_id(partner_id: &str) -> ValidationResult {
    validate_required("partnerId", partner_id)?;
    validate_max_len("partnerId", partner_id, PARTNER_ID_MAX_LEN)
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Inclusive time range for a transaction history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::new(field, "must be a date in yyyy-MM-dd format"))
}

fn start_of_day(field: &'static str, date: NaiveDate) -> Result<DateTime<Utc>, ValidationError> {
    date.and_hms_opt(0, 0, 0)
        .map(|t: NaiveDateTime| t.and_utc())
        .ok_or_else(|| ValidationError::new(field, "is out of range"))
}

fn end_of_day(field: &'static str, date: NaiveDate) -> Result<DateTime<Utc>, ValidationError> {
    date.and_hms_nano_opt(23, 59, 59, 999_999_999)
        .map(|t: NaiveDateTime| t.and_utc())
        .ok_or_else(|| ValidationError::new(field, "is out of range"))
}

/// Resolves the optional `startDate`/`endDate` query parameters.
///
/// A missing start defaults to the start of the day one month before `now`; a
/// missing end defaults to `now`. An explicit end covers that whole day. The
/// range may not be reversed or span more than three months.
pub fn parse_date_window(
    start: Option<&str>,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateWindow, ValidationError> {
    let start = match start.filter(|s| !s.trim().is_empty()) {
        Some(raw) => start_of_day("startDate", parse_date("startDate", raw)?)?,
        None => {
            let date = now
                .date_naive()
                .checked_sub_months(Months::new(DEFAULT_QUERY_MONTHS))
                .ok_or_else(|| ValidationError::new("startDate", "is out of range"))?;
            start_of_day("startDate", date)?
        }
    };
    let end = match end.filter(|s| !s.trim().is_empty()) {
        Some(raw) => end_of_day("endDate", parse_date("endDate", raw)?)?,
        None => now,
    };

    if start > end {
        return Err(ValidationError::new("startDate", "must not be after endDate"));
    }
    let limit = start
        .checked_add_months(Months::new(MAX_QUERY_MONTHS))
        .ok_or_else(|| ValidationError::new("endDate", "is out of range"))?;
    if limit < end {
        return Err(ValidationError::new(
            "endDate",
            format!("query period cannot exceed {} months", MAX_QUERY_MONTHS),
        ));
    }

    Ok(DateWindow { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 13, 30, 0).unwrap()
    }

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn validates_member_and_partner_ids() {
        assert!(validate_member_id("M1").is_ok());
        assert_eq!(validate_member_id("").unwrap_err().field, "memberId");
        assert!(validate_partner_id(&"P".repeat(65)).is_err());
    }

    #[test]
    fn validates_positive_amount() {
        let positive = BigDecimal::from_str("1.23").expect("valid decimal");
        assert!(validate_positive_amount(&positive).is_ok());
        assert!(validate_positive_amount(&BigDecimal::from(0)).is_err());
        assert!(validate_positive_amount(&BigDecimal::from(-1)).is_err());
    }

    #[test]
    fn default_window_is_last_month() {
        let window = parse_date_window(None, None, now()).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 4, 15, 0, 0, 0).unwrap());
        assert_eq!(window.end, now());
    }

    #[test]
    fn explicit_end_covers_whole_day() {
        let window = parse_date_window(Some("2024-03-01"), Some("2024-03-31"), now()).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert!(window.end > Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap());
        assert!(window.end < Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_reversed_range() {
        let err = parse_date_window(Some("2024-05-02"), Some("2024-05-01"), now()).unwrap_err();
        assert_eq!(err.field, "startDate");
    }

    #[test]
    fn rejects_range_over_three_months() {
        assert!(parse_date_window(Some("2024-01-01"), Some("2024-03-31"), now()).is_ok());
        assert!(parse_date_window(Some("2024-01-01"), Some("2024-04-01"), now()).is_err());
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_date_window(Some("15/05/2024"), None, now()).is_err());
        assert!(parse_date_window(None, Some("2024-13-01"), now()).is_err());
    }
}
