//! Billing finalization and the currency ledger.
//!
//! The finalizer is a pure function over a request-scoped selection: it
//! validates every candidate line against the catalog and prices the
//! selection, returning per-currency totals. Amounts in different currencies
//! are never converted or combined; a total exists per currency code and
//! only ever sums amounts carrying that code.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::Violation;
use crate::{CoreError, CoreResult};

/// An ISO-style three-letter currency code, uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Creates a currency code, normalising to uppercase.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` unless the trimmed input is exactly
    /// three ASCII letters.
    pub fn new(code: impl AsRef<str>) -> CoreResult<Self> {
        let trimmed = code.as_ref().trim();
        if trimmed.len() != 3 || !trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(CoreError::validation(
                "currency",
                format!("'{trimmed}' is not a three-letter currency code"),
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CurrencyCode::new(&s).map_err(serde::de::Error::custom)
    }
}

/// One caller-selected service line, before validation.
///
/// `paid_amount` and `currency` default to the catalog values when omitted;
/// a caller overrides `paid_amount` to record a discount or surcharge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub service_id: Uuid,
    pub paid_amount: Option<f64>,
    pub currency: Option<CurrencyCode>,
    pub notes: Option<String>,
}

/// A billed service committed as a child record of a completed encounter.
/// Append-only: committed lines are never edited or independently deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BilledService {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub service_id: Uuid,
    pub base_amount: f64,
    pub paid_amount: f64,
    pub currency: CurrencyCode,
    pub notes: Option<String>,
    pub committed_at: DateTime<Utc>,
}

/// Per-currency sums of paid amounts. Deterministic iteration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrencyTotals(BTreeMap<CurrencyCode, f64>);

impl CurrencyTotals {
    fn add(&mut self, currency: CurrencyCode, amount: f64) {
        *self.0.entry(currency).or_insert(0.0) += amount;
    }

    /// The total for one currency, if any line used it.
    pub fn amount(&self, currency: &CurrencyCode) -> Option<f64> {
        self.0.get(currency).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, f64)> {
        self.0.iter().map(|(code, amount)| (code, *amount))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A validated, priced line ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub service_id: Uuid,
    pub base_amount: f64,
    pub paid_amount: f64,
    pub currency: CurrencyCode,
    pub notes: Option<String>,
}

/// The finalizer's successful output: priced lines plus currency totals.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    pub lines: Vec<PricedLine>,
    pub totals: CurrencyTotals,
}

/// Validates and prices a billed-service selection.
///
/// Every problem in the selection is reported, not just the first: a
/// rejection enumerates each unknown, inactive, or specialty-mismatched
/// service and every non-positive or non-finite amount, so the caller can
/// surface all of them at once.
///
/// # Errors
///
/// Returns `CoreError::Validation` carrying one `Violation` per invalid
/// line (and one for an empty selection).
pub fn finalize_selection(
    specialty_id: Uuid,
    lines: &[ServiceLine],
    directory: &dyn Directory,
) -> CoreResult<SelectionOutcome> {
    let mut violations = Vec::new();
    let mut priced = Vec::with_capacity(lines.len());

    if lines.is_empty() {
        violations.push(Violation::new(
            "services",
            "at least one billed service is required",
        ));
    }

    for (index, line) in lines.iter().enumerate() {
        let field = |name: &str| format!("services[{index}].{name}");

        let record = match directory.service(line.service_id) {
            Some(record) => record,
            None => {
                violations.push(Violation::new(
                    field("service_id"),
                    format!("service {} does not exist", line.service_id),
                ));
                continue;
            }
        };

        if !record.active {
            violations.push(Violation::new(
                field("service_id"),
                format!("service {} is inactive", line.service_id),
            ));
            continue;
        }
        if record.specialty_id != specialty_id {
            violations.push(Violation::new(
                field("service_id"),
                format!(
                    "service {} does not belong to the encounter's specialty",
                    line.service_id
                ),
            ));
            continue;
        }

        let paid_amount = line.paid_amount.unwrap_or(record.base_amount);
        if !paid_amount.is_finite() || paid_amount <= 0.0 {
            violations.push(Violation::new(
                field("paid_amount"),
                format!("paid amount must be a positive finite number (got {paid_amount})"),
            ));
            continue;
        }

        let currency = line.currency.clone().unwrap_or_else(|| record.currency.clone());

        priced.push(PricedLine {
            service_id: record.id,
            base_amount: record.base_amount,
            paid_amount,
            currency,
            notes: line.notes.clone(),
        });
    }

    if !violations.is_empty() {
        return Err(CoreError::Validation(violations));
    }

    let mut totals = CurrencyTotals::default();
    for line in &priced {
        totals.add(line.currency.clone(), line.paid_amount);
    }

    Ok(SelectionOutcome {
        lines: priced,
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{ServiceRecord, StaticDirectory};

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").expect("valid code")
    }

    fn ves() -> CurrencyCode {
        CurrencyCode::new("VES").expect("valid code")
    }

    fn catalog(specialty_id: Uuid) -> (StaticDirectory, Uuid, Uuid) {
        let consult_id = Uuid::new_v4();
        let ultrasound_id = Uuid::new_v4();
        let directory = StaticDirectory::new()
            .with_service(ServiceRecord {
                id: consult_id,
                specialty_id,
                base_amount: 50.0,
                currency: usd(),
                active: true,
            })
            .with_service(ServiceRecord {
                id: ultrasound_id,
                specialty_id,
                base_amount: 1200.0,
                currency: ves(),
                active: true,
            });
        (directory, consult_id, ultrasound_id)
    }

    fn line(service_id: Uuid, paid_amount: Option<f64>) -> ServiceLine {
        ServiceLine {
            service_id,
            paid_amount,
            currency: None,
            notes: None,
        }
    }

    #[test]
    fn currency_code_normalises_and_rejects() {
        assert_eq!(CurrencyCode::new(" usd ").expect("valid").as_str(), "USD");
        assert!(CurrencyCode::new("US").is_err());
        assert!(CurrencyCode::new("USD1").is_err());
        assert!(CurrencyCode::new("U$D").is_err());
    }

    #[test]
    fn totals_never_merge_across_currencies() {
        let specialty = Uuid::new_v4();
        let (directory, consult, ultrasound) = catalog(specialty);

        let outcome = finalize_selection(
            specialty,
            &[line(consult, Some(50.0)), line(ultrasound, Some(1200.0))],
            &directory,
        )
        .expect("selection should validate");

        assert_eq!(outcome.totals.len(), 2);
        assert_eq!(outcome.totals.amount(&usd()), Some(50.0));
        assert_eq!(outcome.totals.amount(&ves()), Some(1200.0));
    }

    #[test]
    fn totals_sum_within_a_currency() {
        let specialty = Uuid::new_v4();
        let (directory, consult, _) = catalog(specialty);

        let outcome = finalize_selection(
            specialty,
            &[line(consult, Some(50.0)), line(consult, Some(25.5))],
            &directory,
        )
        .expect("selection should validate");

        assert_eq!(outcome.totals.amount(&usd()), Some(75.5));
    }

    #[test]
    fn paid_amount_defaults_to_catalog_base() {
        let specialty = Uuid::new_v4();
        let (directory, consult, _) = catalog(specialty);

        let outcome = finalize_selection(specialty, &[line(consult, None)], &directory)
            .expect("selection should validate");

        assert_eq!(outcome.lines[0].paid_amount, 50.0);
        assert_eq!(outcome.lines[0].base_amount, 50.0);
    }

    #[test]
    fn empty_selection_is_rejected() {
        let specialty = Uuid::new_v4();
        let (directory, _, _) = catalog(specialty);

        let err = finalize_selection(specialty, &[], &directory).expect_err("empty selection");
        assert_eq!(err.violations().len(), 1);
        assert_eq!(err.violations()[0].field, "services");
    }

    #[test]
    fn every_invalid_line_is_enumerated() {
        let specialty = Uuid::new_v4();
        let (directory, consult, ultrasound) = catalog(specialty);
        let unknown = Uuid::new_v4();

        let err = finalize_selection(
            specialty,
            &[
                line(consult, Some(-5.0)),
                line(unknown, Some(10.0)),
                line(ultrasound, Some(f64::NAN)),
                line(consult, Some(0.0)),
            ],
            &directory,
        )
        .expect_err("all four lines are invalid");

        let violations = err.violations();
        assert_eq!(violations.len(), 4);
        assert_eq!(violations[0].field, "services[0].paid_amount");
        assert_eq!(violations[1].field, "services[1].service_id");
        assert_eq!(violations[2].field, "services[2].paid_amount");
        assert_eq!(violations[3].field, "services[3].paid_amount");
    }

    #[test]
    fn inactive_and_foreign_specialty_services_are_rejected() {
        let specialty = Uuid::new_v4();
        let other_specialty = Uuid::new_v4();
        let inactive_id = Uuid::new_v4();
        let foreign_id = Uuid::new_v4();
        let directory = StaticDirectory::new()
            .with_service(ServiceRecord {
                id: inactive_id,
                specialty_id: specialty,
                base_amount: 10.0,
                currency: usd(),
                active: false,
            })
            .with_service(ServiceRecord {
                id: foreign_id,
                specialty_id: other_specialty,
                base_amount: 10.0,
                currency: usd(),
                active: true,
            });

        let err = finalize_selection(
            specialty,
            &[line(inactive_id, None), line(foreign_id, None)],
            &directory,
        )
        .expect_err("both lines are invalid");

        assert_eq!(err.violations().len(), 2);
        assert!(err.violations()[0].message.contains("inactive"));
        assert!(err.violations()[1].message.contains("specialty"));
    }

    #[test]
    fn caller_may_override_the_currency() {
        let specialty = Uuid::new_v4();
        let (directory, consult, _) = catalog(specialty);

        let outcome = finalize_selection(
            specialty,
            &[ServiceLine {
                service_id: consult,
                paid_amount: Some(900.0),
                currency: Some(ves()),
                notes: Some("paid in bolivars".into()),
            }],
            &directory,
        )
        .expect("selection should validate");

        assert_eq!(outcome.totals.amount(&ves()), Some(900.0));
        assert_eq!(outcome.totals.amount(&usd()), None);
    }
}
