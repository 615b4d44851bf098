//! Numeric bounds used throughout the praxis core crate.
//!
//! Keeping every bound here ensures validation and tests agree on the same
//! numbers and makes product-driven changes a one-line edit.

/// Shortest encounter a physician can be booked for, in minutes.
pub const MIN_ENCOUNTER_DURATION_MINUTES: u32 = 15;

/// Longest encounter a physician can be booked for, in minutes.
pub const MAX_ENCOUNTER_DURATION_MINUTES: u32 = 120;

/// Minimum length for a report title.
pub const MIN_REPORT_TITLE_LEN: usize = 5;

/// Maximum length for a report title.
pub const MAX_REPORT_TITLE_LEN: usize = 200;

/// Minimum length for report content.
pub const MIN_REPORT_CONTENT_LEN: usize = 50;

/// Maximum length for report content.
pub const MAX_REPORT_CONTENT_LEN: usize = 10_000;

/// Maximum length for a report-number prefix in `CoreConfig`.
pub const MAX_REPORT_NUMBER_PREFIX_LEN: usize = 12;
