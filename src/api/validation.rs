//! Input validation for API requests.
//!
//! Field checks return `Result<(), String>` so handlers can feed them into
//! the `ValidationErrorBuilder` from the `error` module. Visit registration
//! fields are validated by the lifecycle module instead.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::db::UserRole;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

lazy_static! {
    /// Loose `local@domain.tld` shape
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Email is invalid".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }

    Ok(())
}

pub fn validate_user_name(name: &str) -> Result<(), String> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err("Name is required".to_string());
    }

    if len < 2 {
        return Err("Name must be at least 2 characters".to_string());
    }

    Ok(())
}

/// Parse an optional role, defaulting to RECEPCAO
pub fn parse_role(role: Option<&str>) -> Result<UserRole, String> {
    match role.map(str::trim) {
        None | Some("") => Ok(UserRole::default()),
        Some(value) => value.parse(),
    }
}

/// Parse a visit id path segment; ids are positive integers
pub fn parse_visit_id(raw: &str) -> Result<i64, String> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err("Invalid visit id".to_string()),
    }
}

/// Parse a report date: a bare `YYYY-MM-DD` (UTC midnight) or RFC 3339
pub fn parse_report_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD or RFC 3339", raw))
}

/// Resolve paging query values: page defaults to 1, limit to 10 and is
/// clamped to 1..=100
pub fn page_params(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(DEFAULT_PAGE).max(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    (page, limit)
}
