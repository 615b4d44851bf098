//! Shared input validation helpers.
//!
//! These helpers append to a caller-owned violation list instead of failing
//! on the first problem, so command handlers can report every invalid field
//! in a single `CoreError::Validation`. They are pure: anything
//! clock-dependent takes `today` as a parameter and the services supply
//! `Utc::now()` at the edge.

use chrono::NaiveDate;

use crate::constants::{MAX_ENCOUNTER_DURATION_MINUTES, MIN_ENCOUNTER_DURATION_MINUTES};
use crate::error::Violation;

/// Requires a non-empty, non-whitespace value.
pub(crate) fn check_required_text(field: &str, value: &str, violations: &mut Vec<Violation>) {
    if value.trim().is_empty() {
        violations.push(Violation::new(field, format!("{field} is required")));
    }
}

/// Requires the trimmed length of `value` to fall within `min..=max`.
pub(crate) fn check_text_bounds(
    field: &str,
    value: &str,
    min: usize,
    max: usize,
    violations: &mut Vec<Violation>,
) {
    let len = value.trim().chars().count();
    if len < min || len > max {
        violations.push(Violation::new(
            field,
            format!("{field} must be between {min} and {max} characters (got {len})"),
        ));
    }
}

/// Requires a scheduling date of `today` or later.
pub(crate) fn check_date_not_past(
    field: &str,
    date: NaiveDate,
    today: NaiveDate,
    violations: &mut Vec<Violation>,
) {
    if date < today {
        violations.push(Violation::new(
            field,
            format!("{field} cannot be in the past"),
        ));
    }
}

/// Requires an encounter duration within the bookable range.
pub(crate) fn check_duration(field: &str, minutes: u32, violations: &mut Vec<Violation>) {
    if !(MIN_ENCOUNTER_DURATION_MINUTES..=MAX_ENCOUNTER_DURATION_MINUTES).contains(&minutes) {
        violations.push(Violation::new(
            field,
            format!(
                "{field} must be between {MIN_ENCOUNTER_DURATION_MINUTES} and {MAX_ENCOUNTER_DURATION_MINUTES} minutes"
            ),
        ));
    }
}
