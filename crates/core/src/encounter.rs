//! Encounter lifecycle management.
//!
//! An encounter is one scheduled clinical visit. Its status moves through a
//! small state machine; transition legality is decided in exactly one place
//! (`EncounterStatus::allows`) so call sites never re-derive it. Every
//! command validates fully before mutating, and mutations commit whole.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use praxis_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::{self, BilledService, CurrencyTotals, ServiceLine};
use crate::directory::Directory;
use crate::referral::Referral;
use crate::store::CoreStores;
use crate::validation::{check_date_not_past, check_duration, check_required_text};
use crate::{CoreError, CoreResult};

const ENTITY: &str = "encounter";

/// Clinical classification of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterType {
    FirstVisit,
    FollowUp,
    Control,
    Urgent,
}

/// Scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// How a reminder reached the patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMethod {
    Email,
    Sms,
    Call,
    Whatsapp,
}

/// Lifecycle states of an encounter.
///
/// `ToBeScheduled` is part of the persisted vocabulary (imported rows may
/// carry it) but no command in this core produces it; lifecycle commands
/// require a concretely scheduled visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    Scheduled,
    ToBeScheduled,
    Rescheduled,
    Cancelled,
    Completed,
    NoShow,
}

impl EncounterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::ToBeScheduled => "to_be_scheduled",
            Self::Rescheduled => "rescheduled",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
        }
    }

    /// Terminal states accept no further lifecycle commands.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::NoShow)
    }

    /// The transition table. Legality is decided here and nowhere else.
    fn allows(self, command: EncounterCommand) -> bool {
        use EncounterCommand::*;
        match command {
            Reschedule | Cancel | MarkNoShow | Finalize | RecordReminder => {
                matches!(self, Self::Scheduled | Self::Rescheduled)
            }
            UpdateNotes => !self.is_terminal(),
        }
    }
}

impl std::fmt::Display for EncounterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncounterCommand {
    Reschedule,
    Cancel,
    MarkNoShow,
    Finalize,
    RecordReminder,
    UpdateNotes,
}

impl EncounterCommand {
    fn name(self) -> &'static str {
        match self {
            Self::Reschedule => "reschedule",
            Self::Cancel => "cancel",
            Self::MarkNoShow => "mark_no_show",
            Self::Finalize => "finalize",
            Self::RecordReminder => "record_reminder",
            Self::UpdateNotes => "update_notes",
        }
    }
}

/// Audit trail of a cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub reason: NonEmptyText,
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: NonEmptyText,
}

/// Record of the reminder sent for this encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub method: ReminderMethod,
    pub sent_at: DateTime<Utc>,
}

/// One scheduled clinical visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    pub version: u64,
    pub patient_id: Uuid,
    pub physician_id: Uuid,
    /// The physician's specialty captured at scheduling time; billing
    /// validates service lines against it at finalization.
    pub specialty_id: Uuid,
    pub referring_physician_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_minutes: u32,
    pub encounter_type: EncounterType,
    pub priority: Priority,
    pub status: EncounterStatus,
    pub reason: NonEmptyText,
    pub preliminary_diagnosis: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub cancellation: Option<CancellationRecord>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub reminder: Option<ReminderRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: NonEmptyText,
    pub updated_by: NonEmptyText,
}

impl Encounter {
    fn ensure_allows(&self, command: EncounterCommand) -> CoreResult<()> {
        if self.status.allows(command) {
            return Ok(());
        }
        tracing::warn!(
            encounter = %self.id,
            status = self.status.as_str(),
            command = command.name(),
            "rejected encounter command"
        );
        Err(CoreError::InvalidStateTransition {
            entity: ENTITY,
            id: self.id,
            from: self.status.as_str(),
            command: command.name(),
        })
    }

    fn touch(&mut self, actor: &NonEmptyText, now: DateTime<Utc>) {
        self.updated_at = now;
        self.updated_by = actor.clone();
        self.version += 1;
    }
}

/// Input for scheduling a new encounter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEncounter {
    pub patient_id: Uuid,
    pub physician_id: Uuid,
    pub referring_physician_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_minutes: u32,
    pub encounter_type: EncounterType,
    pub priority: Priority,
    pub reason: String,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub created_by: String,
}

impl NewEncounter {
    /// Builds the scheduling input for the visit that conventionally follows
    /// an accepted referral: same patient, the referred-to physician as the
    /// treating physician, and the referring physician wired into the
    /// referral chain.
    pub fn follow_up_from(
        referral: &Referral,
        scheduled_date: NaiveDate,
        scheduled_time: NaiveTime,
        duration_minutes: u32,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: referral.patient_id,
            physician_id: referral.referred_to_physician_id,
            referring_physician_id: Some(referral.referring_physician_id),
            scheduled_date,
            scheduled_time,
            duration_minutes,
            encounter_type: EncounterType::FirstVisit,
            priority: Priority::Normal,
            reason: referral.reason.as_str().to_owned(),
            notes: referral.notes.clone(),
            internal_notes: None,
            created_by: created_by.into(),
        }
    }
}

/// Input for moving an encounter to a new slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleEncounter {
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub updated_by: String,
}

/// Input for cancelling an encounter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelEncounter {
    pub reason: String,
    pub cancelled_by: String,
}

/// Input for closing an encounter with a diagnosis and billed services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeEncounter {
    pub preliminary_diagnosis: String,
    pub services: Vec<ServiceLine>,
    pub finalized_by: String,
}

/// Input for updating clinical text on a live encounter. Optimistic: the
/// caller supplies the version it read, and a mismatch means someone else
/// committed in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEncounterNotes {
    pub expected_version: u64,
    pub preliminary_diagnosis: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub updated_by: String,
}

/// The result of a successful finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedEncounter {
    pub encounter: Encounter,
    pub billed_services: Vec<BilledService>,
    pub totals: CurrencyTotals,
}

/// Command surface for the encounter state machine.
#[derive(Clone)]
pub struct EncounterService {
    stores: Arc<CoreStores>,
    directory: Arc<dyn Directory>,
}

impl EncounterService {
    pub fn new(stores: Arc<CoreStores>, directory: Arc<dyn Directory>) -> Self {
        Self { stores, directory }
    }

    /// Schedules a new encounter.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` enumerating every bad field,
    /// `CoreError::NotFound` for unresolvable participants.
    pub fn schedule(&self, input: NewEncounter) -> CoreResult<Encounter> {
        let now = Utc::now();

        let mut violations = Vec::new();
        check_required_text("reason", &input.reason, &mut violations);
        check_required_text("created_by", &input.created_by, &mut violations);
        check_date_not_past(
            "scheduled_date",
            input.scheduled_date,
            now.date_naive(),
            &mut violations,
        );
        check_duration("duration_minutes", input.duration_minutes, &mut violations);
        if !violations.is_empty() {
            return Err(CoreError::Validation(violations));
        }

        self.directory
            .patient(input.patient_id)
            .ok_or(CoreError::NotFound {
                entity: "patient",
                id: input.patient_id,
            })?;
        let physician = self
            .directory
            .physician(input.physician_id)
            .ok_or(CoreError::NotFound {
                entity: "physician",
                id: input.physician_id,
            })?;
        if !physician.active {
            return Err(CoreError::validation(
                "physician_id",
                "physician is not active",
            ));
        }
        if let Some(referrer_id) = input.referring_physician_id {
            self.directory
                .physician(referrer_id)
                .ok_or(CoreError::NotFound {
                    entity: "physician",
                    id: referrer_id,
                })?;
        }

        let reason = NonEmptyText::new(&input.reason)
            .map_err(|e| CoreError::validation("reason", e.to_string()))?;
        let actor = NonEmptyText::new(&input.created_by)
            .map_err(|e| CoreError::validation("created_by", e.to_string()))?;

        let encounter = Encounter {
            id: Uuid::new_v4(),
            version: 1,
            patient_id: input.patient_id,
            physician_id: input.physician_id,
            specialty_id: physician.specialty_id,
            referring_physician_id: input.referring_physician_id,
            scheduled_date: input.scheduled_date,
            scheduled_time: input.scheduled_time,
            duration_minutes: input.duration_minutes,
            encounter_type: input.encounter_type,
            priority: input.priority,
            status: EncounterStatus::Scheduled,
            reason,
            preliminary_diagnosis: None,
            notes: input.notes,
            internal_notes: input.internal_notes,
            cancellation: None,
            finalized_at: None,
            reminder: None,
            created_at: now,
            updated_at: now,
            created_by: actor.clone(),
            updated_by: actor,
        };

        self.stores.encounters.insert(encounter.id, encounter.clone())?;
        tracing::debug!(encounter = %encounter.id, "encounter scheduled");
        Ok(encounter)
    }

    /// Moves a live encounter to a new slot. Participants are unchanged.
    pub fn reschedule(&self, id: Uuid, input: RescheduleEncounter) -> CoreResult<Encounter> {
        let now = Utc::now();

        let mut violations = Vec::new();
        check_required_text("updated_by", &input.updated_by, &mut violations);
        check_date_not_past(
            "scheduled_date",
            input.scheduled_date,
            now.date_naive(),
            &mut violations,
        );
        if !violations.is_empty() {
            return Err(CoreError::Validation(violations));
        }
        let actor = NonEmptyText::new(&input.updated_by)
            .map_err(|e| CoreError::validation("updated_by", e.to_string()))?;

        self.stores.encounters.update(id, |encounter| {
            encounter.ensure_allows(EncounterCommand::Reschedule)?;
            encounter.scheduled_date = input.scheduled_date;
            encounter.scheduled_time = input.scheduled_time;
            encounter.status = EncounterStatus::Rescheduled;
            encounter.touch(&actor, now);
            Ok(encounter.clone())
        })
    }

    /// Cancels a live encounter. Terminal.
    pub fn cancel(&self, id: Uuid, input: CancelEncounter) -> CoreResult<Encounter> {
        let now = Utc::now();

        let mut violations = Vec::new();
        check_required_text("reason", &input.reason, &mut violations);
        check_required_text("cancelled_by", &input.cancelled_by, &mut violations);
        if !violations.is_empty() {
            return Err(CoreError::Validation(violations));
        }
        let reason = NonEmptyText::new(&input.reason)
            .map_err(|e| CoreError::validation("reason", e.to_string()))?;
        let actor = NonEmptyText::new(&input.cancelled_by)
            .map_err(|e| CoreError::validation("cancelled_by", e.to_string()))?;

        self.stores.encounters.update(id, |encounter| {
            encounter.ensure_allows(EncounterCommand::Cancel)?;
            encounter.status = EncounterStatus::Cancelled;
            encounter.cancellation = Some(CancellationRecord {
                reason: reason.clone(),
                cancelled_at: now,
                cancelled_by: actor.clone(),
            });
            encounter.touch(&actor, now);
            Ok(encounter.clone())
        })
    }

    /// Records that the patient did not show up. Terminal.
    pub fn mark_no_show(&self, id: Uuid, updated_by: &str) -> CoreResult<Encounter> {
        let now = Utc::now();
        let actor = NonEmptyText::new(updated_by)
            .map_err(|e| CoreError::validation("updated_by", e.to_string()))?;

        self.stores.encounters.update(id, |encounter| {
            encounter.ensure_allows(EncounterCommand::MarkNoShow)?;
            encounter.status = EncounterStatus::NoShow;
            encounter.touch(&actor, now);
            Ok(encounter.clone())
        })
    }

    /// Closes the encounter with a diagnosis and a validated billing
    /// selection.
    ///
    /// Atomic: if the selection fails validation, neither the encounter nor
    /// the billed-services table changes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` enumerating every invalid service
    /// line, `CoreError::InvalidStateTransition` when the encounter is not
    /// live (e.g. it was cancelled first).
    pub fn finalize(&self, id: Uuid, input: FinalizeEncounter) -> CoreResult<FinalizedEncounter> {
        let now = Utc::now();

        let mut violations = Vec::new();
        check_required_text(
            "preliminary_diagnosis",
            &input.preliminary_diagnosis,
            &mut violations,
        );
        check_required_text("finalized_by", &input.finalized_by, &mut violations);
        if !violations.is_empty() {
            return Err(CoreError::Validation(violations));
        }
        let actor = NonEmptyText::new(&input.finalized_by)
            .map_err(|e| CoreError::validation("finalized_by", e.to_string()))?;

        let directory = Arc::clone(&self.directory);
        let stores = Arc::clone(&self.stores);

        let (encounter, committed, totals) = self.stores.encounters.update(id, move |encounter| {
            encounter.ensure_allows(EncounterCommand::Finalize)?;

            let outcome =
                billing::finalize_selection(encounter.specialty_id, &input.services, directory.as_ref())?;

            let committed: Vec<BilledService> = outcome
                .lines
                .into_iter()
                .map(|line| BilledService {
                    id: Uuid::new_v4(),
                    encounter_id: encounter.id,
                    service_id: line.service_id,
                    base_amount: line.base_amount,
                    paid_amount: line.paid_amount,
                    currency: line.currency,
                    notes: line.notes,
                    committed_at: now,
                })
                .collect();
            for record in &committed {
                stores.billed_services.insert(record.id, record.clone())?;
            }

            encounter.status = EncounterStatus::Completed;
            encounter.preliminary_diagnosis = Some(input.preliminary_diagnosis.trim().to_owned());
            encounter.finalized_at = Some(now);
            encounter.touch(&actor, now);
            Ok((encounter.clone(), committed, outcome.totals))
        })?;

        tracing::debug!(
            encounter = %encounter.id,
            currencies = totals.len(),
            "encounter finalized"
        );
        Ok(FinalizedEncounter {
            encounter,
            billed_services: committed,
            totals,
        })
    }

    /// Stamps the reminder record. Repeating the same method is a no-op.
    pub fn record_reminder(
        &self,
        id: Uuid,
        method: ReminderMethod,
        updated_by: &str,
    ) -> CoreResult<Encounter> {
        let now = Utc::now();
        let actor = NonEmptyText::new(updated_by)
            .map_err(|e| CoreError::validation("updated_by", e.to_string()))?;

        self.stores.encounters.update(id, |encounter| {
            if encounter.reminder.as_ref().map(|r| r.method) == Some(method) {
                return Ok(encounter.clone());
            }
            encounter.ensure_allows(EncounterCommand::RecordReminder)?;
            encounter.reminder = Some(ReminderRecord {
                method,
                sent_at: now,
            });
            encounter.touch(&actor, now);
            Ok(encounter.clone())
        })
    }

    /// Updates clinical text on a non-terminal encounter.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConcurrentModification` when `expected_version`
    /// is stale.
    pub fn update_notes(&self, id: Uuid, input: UpdateEncounterNotes) -> CoreResult<Encounter> {
        let now = Utc::now();
        let actor = NonEmptyText::new(&input.updated_by)
            .map_err(|e| CoreError::validation("updated_by", e.to_string()))?;

        self.stores.encounters.update(id, |encounter| {
            if encounter.version != input.expected_version {
                return Err(CoreError::ConcurrentModification {
                    entity: ENTITY,
                    id: encounter.id,
                });
            }
            encounter.ensure_allows(EncounterCommand::UpdateNotes)?;

            if let Some(diagnosis) = input.preliminary_diagnosis {
                encounter.preliminary_diagnosis = Some(diagnosis);
            }
            if let Some(notes) = input.notes {
                encounter.notes = Some(notes);
            }
            if let Some(internal) = input.internal_notes {
                encounter.internal_notes = Some(internal);
            }
            encounter.touch(&actor, now);
            Ok(encounter.clone())
        })
    }

    /// A read snapshot of the encounter.
    pub fn get(&self, id: Uuid) -> CoreResult<Encounter> {
        self.stores.encounters.snapshot(id)
    }

    /// The billed services committed against an encounter.
    pub fn billed_services(&self, id: Uuid) -> CoreResult<Vec<BilledService>> {
        self.stores.encounters.snapshot(id)?;
        Ok(self
            .stores
            .billed_services
            .filtered(|record| record.encounter_id == id))
    }
}
