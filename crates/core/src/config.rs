//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into
//! services as `Arc<CoreConfig>`. Nothing in this crate reads environment
//! variables during command handling; that keeps behaviour consistent across
//! multi-threaded runtimes and test harnesses.

use crate::constants::MAX_REPORT_NUMBER_PREFIX_LEN;
use crate::{CoreError, CoreResult};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    report_number_prefix: String,
    report_sequence_start: u64,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// The report-number prefix is embedded into every allocated report
    /// number (`{prefix}-{year}-{seq:05}`), so it is restricted to a short
    /// uppercase alphanumeric token.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the prefix is empty, too long, or
    /// contains characters outside `A-Z`, `0-9`.
    pub fn new(
        report_number_prefix: impl Into<String>,
        report_sequence_start: u64,
    ) -> CoreResult<Self> {
        let report_number_prefix = report_number_prefix.into();
        let prefix = report_number_prefix.trim();

        if prefix.is_empty() {
            return Err(CoreError::validation(
                "report_number_prefix",
                "prefix cannot be empty",
            ));
        }
        if prefix.len() > MAX_REPORT_NUMBER_PREFIX_LEN {
            return Err(CoreError::validation(
                "report_number_prefix",
                format!(
                    "prefix exceeds maximum length of {} characters",
                    MAX_REPORT_NUMBER_PREFIX_LEN
                ),
            ));
        }
        if !prefix
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'Z'))
        {
            return Err(CoreError::validation(
                "report_number_prefix",
                "prefix must contain only uppercase letters and digits",
            ));
        }
        if report_sequence_start == 0 {
            return Err(CoreError::validation(
                "report_sequence_start",
                "sequence numbering starts at 1",
            ));
        }

        Ok(Self {
            report_number_prefix: prefix.to_owned(),
            report_sequence_start,
        })
    }

    pub fn report_number_prefix(&self) -> &str {
        &self.report_number_prefix
    }

    pub fn report_sequence_start(&self) -> u64 {
        self.report_sequence_start
    }
}
