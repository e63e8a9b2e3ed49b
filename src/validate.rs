use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date, OffsetDateTime};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref HANDLE_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9][0-9 \-]{5,17}$").unwrap();
    static ref DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Handles may only contain alphanumeric characters, dash, and underscore.
pub fn is_valid_handle(handle: &str) -> bool {
    HANDLE_RE.is_match(handle)
}

pub fn is_valid_phone_number(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Parses a `YYYY-MM-DD` event date, rejecting anything malformed or
/// non-existent (e.g. 2024-02-30).
pub fn parse_event_date(date: &str) -> Option<Date> {
    if !DATE_RE.is_match(date) {
        return None;
    }
    Date::parse(date, format_description!("[year]-[month]-[day]")).ok()
}

/// Event dates must not lie in the future relative to now.
pub fn is_future_date(date: Date) -> bool {
    date > OffsetDateTime::now_utc().date()
}
