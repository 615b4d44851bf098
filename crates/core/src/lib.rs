//! # Praxis Core
//!
//! Business logic for the clinical-encounter subsystem of the praxis
//! practice-management system:
//! - Encounter lifecycle (schedule, reschedule, cancel, no-show, finalize)
//! - Billing finalization with per-currency totals (never cross-converted)
//! - Doctor-to-doctor referral workflow
//! - Medical-report lifecycle with digital signing and dispatch
//!
//! Each entity is driven through explicit commands validated against its
//! current state before anything is committed; every error is a typed
//! [`CoreError`]. The crate is transport-agnostic: directory lookups,
//! certificate trust, and delivery mechanics are consumed through the narrow
//! interfaces in [`directory`] and [`dispatch`].

pub mod billing;
pub mod config;
pub mod constants;
pub mod directory;
pub mod dispatch;
pub mod encounter;
pub mod error;
pub mod referral;
pub mod report;
pub mod store;

mod validation;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult, Violation};
pub use store::CoreStores;
