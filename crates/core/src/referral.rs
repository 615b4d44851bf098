//! Doctor-to-doctor referral workflow.
//!
//! A referral asks another physician to take over part of a patient's care.
//! The workflow is independent of the encounter lifecycle; by convention the
//! caller schedules a new encounter after a referral is accepted (see
//! `NewEncounter::follow_up_from`).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use praxis_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::Violation;
use crate::store::CoreStores;
use crate::validation::check_required_text;
use crate::{CoreError, CoreResult};

const ENTITY: &str = "referral";

/// Lifecycle states of a referral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl ReferralStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }

    fn allows(self, command: ReferralCommand) -> bool {
        match command {
            ReferralCommand::Respond => self == Self::Pending,
            ReferralCommand::Complete => self == Self::Accepted,
        }
    }
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferralCommand {
    Respond,
    Complete,
}

impl ReferralCommand {
    fn name(self) -> &'static str {
        match self {
            Self::Respond => "respond",
            Self::Complete => "complete",
        }
    }
}

/// The receiving physician's answer to a pending referral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralDecision {
    Accept,
    Reject,
}

/// A request to transfer a patient's care to another physician.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub version: u64,
    pub patient_id: Uuid,
    pub referring_physician_id: Uuid,
    pub referred_to_physician_id: Uuid,
    pub reason: NonEmptyText,
    pub notes: Option<String>,
    pub response_notes: Option<String>,
    pub status: ReferralStatus,
    pub referral_date: DateTime<Utc>,
    pub response_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Referral {
    fn ensure_allows(&self, command: ReferralCommand) -> CoreResult<()> {
        if self.status.allows(command) {
            return Ok(());
        }
        tracing::warn!(
            referral = %self.id,
            status = self.status.as_str(),
            command = command.name(),
            "rejected referral command"
        );
        Err(CoreError::InvalidStateTransition {
            entity: ENTITY,
            id: self.id,
            from: self.status.as_str(),
            command: command.name(),
        })
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

/// Input for creating a referral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReferral {
    pub patient_id: Uuid,
    pub referring_physician_id: Uuid,
    pub referred_to_physician_id: Uuid,
    pub reason: String,
    pub notes: Option<String>,
}

/// Command surface for the referral workflow.
#[derive(Clone)]
pub struct ReferralService {
    stores: Arc<CoreStores>,
    directory: Arc<dyn Directory>,
}

impl ReferralService {
    pub fn new(stores: Arc<CoreStores>, directory: Arc<dyn Directory>) -> Self {
        Self { stores, directory }
    }

    /// Creates a pending referral.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when the reason is blank or the two
    /// physicians are the same, `CoreError::NotFound` when a participant
    /// does not resolve.
    pub fn create(&self, input: NewReferral) -> CoreResult<Referral> {
        let now = Utc::now();

        let mut violations = Vec::new();
        check_required_text("reason", &input.reason, &mut violations);
        if input.referring_physician_id == input.referred_to_physician_id {
            violations.push(Violation::new(
                "referred_to_physician_id",
                "a physician cannot refer a patient to themselves",
            ));
        }
        if !violations.is_empty() {
            return Err(CoreError::Validation(violations));
        }

        self.directory
            .patient(input.patient_id)
            .ok_or(CoreError::NotFound {
                entity: "patient",
                id: input.patient_id,
            })?;
        self.directory
            .physician(input.referring_physician_id)
            .ok_or(CoreError::NotFound {
                entity: "physician",
                id: input.referring_physician_id,
            })?;
        let referred = self
            .directory
            .physician(input.referred_to_physician_id)
            .ok_or(CoreError::NotFound {
                entity: "physician",
                id: input.referred_to_physician_id,
            })?;
        if !referred.active {
            return Err(CoreError::validation(
                "referred_to_physician_id",
                "the referred-to physician is not active",
            ));
        }

        let reason = NonEmptyText::new(&input.reason)
            .map_err(|e| CoreError::validation("reason", e.to_string()))?;

        let referral = Referral {
            id: Uuid::new_v4(),
            version: 1,
            patient_id: input.patient_id,
            referring_physician_id: input.referring_physician_id,
            referred_to_physician_id: input.referred_to_physician_id,
            reason,
            notes: input.notes,
            response_notes: None,
            status: ReferralStatus::Pending,
            referral_date: now,
            response_date: None,
            created_at: now,
            updated_at: now,
        };

        self.stores.referrals.insert(referral.id, referral.clone())?;
        tracing::debug!(referral = %referral.id, "referral created");
        Ok(referral)
    }

    /// Accepts or rejects a pending referral.
    pub fn respond(
        &self,
        id: Uuid,
        decision: ReferralDecision,
        notes: Option<String>,
    ) -> CoreResult<Referral> {
        let now = Utc::now();

        self.stores.referrals.update(id, |referral| {
            referral.ensure_allows(ReferralCommand::Respond)?;
            referral.status = match decision {
                ReferralDecision::Accept => ReferralStatus::Accepted,
                ReferralDecision::Reject => ReferralStatus::Rejected,
            };
            referral.response_date = Some(now);
            referral.response_notes = notes;
            referral.touch(now);
            Ok(referral.clone())
        })
    }

    /// Marks an accepted referral as completed. Terminal.
    pub fn complete(&self, id: Uuid) -> CoreResult<Referral> {
        let now = Utc::now();

        self.stores.referrals.update(id, |referral| {
            referral.ensure_allows(ReferralCommand::Complete)?;
            referral.status = ReferralStatus::Completed;
            referral.touch(now);
            Ok(referral.clone())
        })
    }

    /// A read snapshot of the referral.
    pub fn get(&self, id: Uuid) -> CoreResult<Referral> {
        self.stores.referrals.snapshot(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::directory::{PatientRecord, PhysicianRecord, StaticDirectory};
    use crate::encounter::{EncounterService, EncounterStatus, NewEncounter};
    use chrono::{Days, NaiveTime};

    struct Fixture {
        service: ReferralService,
        stores: Arc<CoreStores>,
        directory: Arc<StaticDirectory>,
        patient_id: Uuid,
        referring_id: Uuid,
        referred_id: Uuid,
    }

    fn fixture() -> Fixture {
        let patient_id = Uuid::new_v4();
        let referring_id = Uuid::new_v4();
        let referred_id = Uuid::new_v4();

        let directory = Arc::new(
            StaticDirectory::new()
                .with_patient(PatientRecord { id: patient_id })
                .with_physician(PhysicianRecord {
                    id: referring_id,
                    specialty_id: Uuid::new_v4(),
                    active: true,
                })
                .with_physician(PhysicianRecord {
                    id: referred_id,
                    specialty_id: Uuid::new_v4(),
                    active: true,
                }),
        );

        let cfg = CoreConfig::new("INF", 1).expect("valid config");
        let stores = Arc::new(CoreStores::new(&cfg));
        let service = ReferralService::new(Arc::clone(&stores), directory.clone());

        Fixture {
            service,
            stores,
            directory,
            patient_id,
            referring_id,
            referred_id,
        }
    }

    fn new_referral(fx: &Fixture) -> NewReferral {
        NewReferral {
            patient_id: fx.patient_id,
            referring_physician_id: fx.referring_id,
            referred_to_physician_id: fx.referred_id,
            reason: "requires cardiology assessment".into(),
            notes: Some("echo recommended".into()),
        }
    }

    #[test]
    fn create_produces_a_pending_referral() {
        let fx = fixture();
        let referral = fx.service.create(new_referral(&fx)).expect("create");

        assert_eq!(referral.status, ReferralStatus::Pending);
        assert!(referral.response_date.is_none());
        assert_eq!(referral.reason.as_str(), "requires cardiology assessment");
    }

    #[test]
    fn self_referral_is_rejected() {
        let fx = fixture();
        let mut input = new_referral(&fx);
        input.referred_to_physician_id = fx.referring_id;

        let err = fx.service.create(input).expect_err("self referral");
        assert_eq!(err.violations()[0].field, "referred_to_physician_id");
    }

    #[test]
    fn create_requires_resolvable_active_participants() {
        let fx = fixture();

        let mut input = new_referral(&fx);
        input.referred_to_physician_id = Uuid::new_v4();
        assert!(matches!(
            fx.service.create(input).expect_err("unknown physician"),
            CoreError::NotFound { entity: "physician", .. }
        ));

        let inactive_id = Uuid::new_v4();
        let directory = StaticDirectory::new()
            .with_patient(PatientRecord { id: fx.patient_id })
            .with_physician(PhysicianRecord {
                id: fx.referring_id,
                specialty_id: Uuid::new_v4(),
                active: true,
            })
            .with_physician(PhysicianRecord {
                id: inactive_id,
                specialty_id: Uuid::new_v4(),
                active: false,
            });
        let cfg = CoreConfig::new("INF", 1).expect("valid config");
        let service = ReferralService::new(
            Arc::new(CoreStores::new(&cfg)),
            Arc::new(directory),
        );
        let mut input = new_referral(&fx);
        input.referred_to_physician_id = inactive_id;
        assert!(matches!(
            service.create(input).expect_err("inactive physician"),
            CoreError::Validation(_)
        ));
    }

    #[test]
    fn respond_is_legal_from_pending_only() {
        let fx = fixture();
        let referral = fx.service.create(new_referral(&fx)).expect("create");

        let accepted = fx
            .service
            .respond(
                referral.id,
                ReferralDecision::Accept,
                Some("happy to take over".into()),
            )
            .expect("respond");
        assert_eq!(accepted.status, ReferralStatus::Accepted);
        assert!(accepted.response_date.is_some());
        assert_eq!(accepted.response_notes.as_deref(), Some("happy to take over"));

        let err = fx
            .service
            .respond(referral.id, ReferralDecision::Reject, None)
            .expect_err("second response");
        assert!(matches!(
            err,
            CoreError::InvalidStateTransition {
                entity: "referral",
                from: "accepted",
                command: "respond",
                ..
            }
        ));
    }

    #[test]
    fn rejected_referrals_are_terminal() {
        let fx = fixture();
        let referral = fx.service.create(new_referral(&fx)).expect("create");
        fx.service
            .respond(referral.id, ReferralDecision::Reject, None)
            .expect("reject");

        assert!(matches!(
            fx.service
                .complete(referral.id)
                .expect_err("complete after reject"),
            CoreError::InvalidStateTransition { .. }
        ));
    }

    #[test]
    fn complete_requires_acceptance_first() {
        let fx = fixture();
        let referral = fx.service.create(new_referral(&fx)).expect("create");

        assert!(matches!(
            fx.service
                .complete(referral.id)
                .expect_err("complete while pending"),
            CoreError::InvalidStateTransition { .. }
        ));

        fx.service
            .respond(referral.id, ReferralDecision::Accept, None)
            .expect("accept");
        let completed = fx.service.complete(referral.id).expect("complete");
        assert_eq!(completed.status, ReferralStatus::Completed);

        assert!(matches!(
            fx.service.complete(referral.id).expect_err("already done"),
            CoreError::InvalidStateTransition { .. }
        ));
    }

    #[test]
    fn accepted_referral_seeds_a_follow_up_encounter() {
        let fx = fixture();
        let referral = fx.service.create(new_referral(&fx)).expect("create");
        let referral = fx
            .service
            .respond(referral.id, ReferralDecision::Accept, None)
            .expect("accept");

        let tomorrow = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(1))
            .expect("tomorrow exists");
        let input = NewEncounter::follow_up_from(
            &referral,
            tomorrow,
            NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            30,
            "reception",
        );

        let encounters = EncounterService::new(Arc::clone(&fx.stores), fx.directory.clone());
        let encounter = encounters.schedule(input).expect("schedule follow-up");

        assert_eq!(encounter.status, EncounterStatus::Scheduled);
        assert_eq!(encounter.patient_id, fx.patient_id);
        assert_eq!(encounter.physician_id, fx.referred_id);
        assert_eq!(encounter.referring_physician_id, Some(fx.referring_id));
    }
}
