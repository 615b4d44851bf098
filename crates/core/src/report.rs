//! Medical report lifecycle and signing workflow.
//!
//! A report moves strictly forward: draft, finalized, signed, sent. Content
//! is editable until the report is signed; the signature hash is computed
//! over the frozen content, and because no command can modify content past
//! that point the hash stays binding. Sending hands a dispatch record to
//! the delivery gateway and returns as soon as the record exists; delivery
//! progress arrives later through the idempotent status callback.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use praxis_signing::{CertificateEnvelope, ContentHash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::constants::{
    MAX_REPORT_CONTENT_LEN, MAX_REPORT_TITLE_LEN, MIN_REPORT_CONTENT_LEN, MIN_REPORT_TITLE_LEN,
};
use crate::directory::Directory;
use crate::dispatch::{
    validate_recipient, DeliveryGateway, DeliveryStatus, DispatchPayload, ReportDispatch,
};
use crate::encounter::EncounterStatus;
use crate::error::Violation;
use crate::store::{CoreStores, EntityStore};
use crate::validation::{check_required_text, check_text_bounds};
use crate::{CoreError, CoreResult};

pub use crate::dispatch::DeliveryMethod;

const ENTITY: &str = "report";

/// Lifecycle states of a medical report. Strictly forward, no skipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Finalized,
    Signed,
    Sent,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Finalized => "finalized",
            Self::Signed => "signed",
            Self::Sent => "sent",
        }
    }

    /// The transition table for the report state machine.
    ///
    /// Send stays legal once the report is `Sent`: each send appends another
    /// dispatch attempt, and only the first acceptance moves the status.
    fn allows(self, command: ReportCommand) -> bool {
        use ReportCommand::*;
        match command {
            Edit => matches!(self, Self::Draft | Self::Finalized),
            Finalize => self == Self::Draft,
            Sign => self == Self::Finalized,
            Send => matches!(self, Self::Signed | Self::Sent),
            Delete => self == Self::Draft,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportCommand {
    Edit,
    Finalize,
    Sign,
    Send,
    Delete,
}

impl ReportCommand {
    fn name(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Finalize => "finalize",
            Self::Sign => "sign",
            Self::Send => "send",
            Self::Delete => "delete",
        }
    }
}

/// The signature attached to a signed report. Never reassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalSignature {
    pub valid: bool,
    pub signature_hash: String,
    pub signature_date: DateTime<Utc>,
    pub certificate: Vec<u8>,
    pub certificate_subject: Option<String>,
    pub physician_id: Uuid,
}

/// A clinical report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalReport {
    pub id: Uuid,
    pub version: u64,
    pub report_number: String,
    pub sequence_number: u64,
    pub title: String,
    pub report_type: String,
    pub content: String,
    pub observations: Option<String>,
    pub anamnesis: Option<String>,
    pub status: ReportStatus,
    pub patient_id: Uuid,
    pub physician_id: Uuid,
    pub encounter_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub signature: Option<DigitalSignature>,
    pub issue_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalReport {
    fn ensure_allows(&self, command: ReportCommand) -> CoreResult<()> {
        if self.status.allows(command) {
            return Ok(());
        }
        tracing::warn!(
            report = %self.id,
            status = self.status.as_str(),
            command = command.name(),
            "rejected report command"
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

/// Input for creating a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub title: String,
    pub report_type: String,
    pub content: String,
    pub observations: Option<String>,
    pub anamnesis: Option<String>,
    pub patient_id: Uuid,
    pub physician_id: Uuid,
    pub encounter_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
}

/// Input for editing a draft or finalized report. Optimistic: the caller
/// supplies the version it read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditReport {
    pub expected_version: u64,
    pub title: String,
    pub report_type: String,
    pub content: String,
    pub observations: Option<String>,
    pub anamnesis: Option<String>,
}

/// Input for signing a finalized report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignReport {
    pub certificate: Vec<u8>,
    pub physician_id: Uuid,
}

/// Input for dispatching a signed report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    pub delivery_method: DeliveryMethod,
    pub recipient: String,
}

/// The same field constraints apply at creation and on every edit.
fn validate_report_fields(title: &str, report_type: &str, content: &str) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_text_bounds(
        "title",
        title,
        MIN_REPORT_TITLE_LEN,
        MAX_REPORT_TITLE_LEN,
        &mut violations,
    );
    check_required_text("report_type", report_type, &mut violations);
    check_text_bounds(
        "content",
        content,
        MIN_REPORT_CONTENT_LEN,
        MAX_REPORT_CONTENT_LEN,
        &mut violations,
    );
    violations
}

/// Allocates a report number, guarding against the allocator ever handing
/// out a number that already exists. A collision is a defect in sequence
/// generation and is surfaced as fatal rather than retried.
fn allocate_report_number(
    reports: &EntityStore<MedicalReport>,
    prefix: &str,
    year: i32,
    mut sequence_source: impl FnMut() -> u64,
) -> CoreResult<(String, u64)> {
    let sequence_number = sequence_source();
    let report_number = format!("{prefix}-{year}-{sequence_number:05}");

    if !reports
        .filtered(|report| report.report_number == report_number)
        .is_empty()
    {
        return Err(CoreError::SequenceIntegrity(format!(
            "report number {report_number} already allocated"
        )));
    }

    Ok((report_number, sequence_number))
}

/// Command surface for the report lifecycle.
#[derive(Clone)]
pub struct ReportService {
    stores: Arc<CoreStores>,
    directory: Arc<dyn Directory>,
    gateway: Arc<dyn DeliveryGateway>,
    cfg: Arc<CoreConfig>,
}

impl ReportService {
    pub fn new(
        stores: Arc<CoreStores>,
        directory: Arc<dyn Directory>,
        gateway: Arc<dyn DeliveryGateway>,
        cfg: Arc<CoreConfig>,
    ) -> Self {
        Self {
            stores,
            directory,
            gateway,
            cfg,
        }
    }

    /// Creates a report in draft, allocating its number and sequence.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` enumerating every bad field,
    /// `CoreError::NotFound` for unresolvable references, and
    /// `CoreError::SequenceIntegrity` if number allocation collides.
    pub fn create(&self, input: NewReport) -> CoreResult<MedicalReport> {
        let now = Utc::now();

        let violations =
            validate_report_fields(&input.title, &input.report_type, &input.content);
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
            .physician(input.physician_id)
            .ok_or(CoreError::NotFound {
                entity: "physician",
                id: input.physician_id,
            })?;
        if let Some(encounter_id) = input.encounter_id {
            self.stores.encounters.snapshot(encounter_id)?;
        }

        let (report_number, sequence_number) = allocate_report_number(
            &self.stores.reports,
            self.cfg.report_number_prefix(),
            now.year(),
            || self.stores.next_report_sequence(),
        )?;

        let report = MedicalReport {
            id: Uuid::new_v4(),
            version: 1,
            report_number,
            sequence_number,
            title: input.title.trim().to_owned(),
            report_type: input.report_type.trim().to_owned(),
            content: input.content,
            observations: input.observations,
            anamnesis: input.anamnesis,
            status: ReportStatus::Draft,
            patient_id: input.patient_id,
            physician_id: input.physician_id,
            encounter_id: input.encounter_id,
            template_id: input.template_id,
            signature: None,
            issue_date: now.date_naive(),
            created_at: now,
            updated_at: now,
        };

        self.stores.reports.insert(report.id, report.clone())?;
        tracing::debug!(report = %report.id, number = %report.report_number, "report created");
        Ok(report)
    }

    /// Replaces the editable fields of a draft or finalized report. The
    /// status does not change.
    pub fn edit(&self, id: Uuid, input: EditReport) -> CoreResult<MedicalReport> {
        let now = Utc::now();

        self.stores.reports.update(id, |report| {
            if report.version != input.expected_version {
                return Err(CoreError::ConcurrentModification {
                    entity: ENTITY,
                    id: report.id,
                });
            }
            report.ensure_allows(ReportCommand::Edit)?;

            let violations =
                validate_report_fields(&input.title, &input.report_type, &input.content);
            if !violations.is_empty() {
                return Err(CoreError::Validation(violations));
            }

            report.title = input.title.trim().to_owned();
            report.report_type = input.report_type.trim().to_owned();
            report.content = input.content;
            report.observations = input.observations;
            report.anamnesis = input.anamnesis;
            report.touch(now);
            Ok(report.clone())
        })
    }

    /// Moves a draft report to finalized.
    pub fn finalize(&self, id: Uuid) -> CoreResult<MedicalReport> {
        let now = Utc::now();

        self.stores.reports.update(id, |report| {
            report.ensure_allows(ReportCommand::Finalize)?;
            report.status = ReportStatus::Finalized;
            report.touch(now);
            Ok(report.clone())
        })
    }

    /// Signs a finalized report with the supplied certificate.
    ///
    /// The certificate must be a well-formed envelope; the content hash is
    /// computed over the report's current content, which is frozen from this
    /// point because no command can edit a signed report.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCertificate` for malformed envelopes and
    /// `CoreError::Validation` when the report's encounter is not completed
    /// yet.
    pub fn sign(&self, id: Uuid, input: SignReport) -> CoreResult<MedicalReport> {
        let now = Utc::now();

        self.directory
            .physician(input.physician_id)
            .ok_or(CoreError::NotFound {
                entity: "physician",
                id: input.physician_id,
            })?;

        let stores = Arc::clone(&self.stores);
        self.stores.reports.update(id, move |report| {
            report.ensure_allows(ReportCommand::Sign)?;

            if let Some(encounter_id) = report.encounter_id {
                let encounter = stores.encounters.snapshot(encounter_id)?;
                if encounter.status != EncounterStatus::Completed {
                    return Err(CoreError::validation(
                        "encounter_id",
                        "the encounter must be completed before its report can be signed",
                    ));
                }
            }

            let envelope = CertificateEnvelope::parse(&input.certificate)?;
            let hash = ContentHash::compute(&report.content);

            report.signature = Some(DigitalSignature {
                valid: true,
                signature_hash: hash.as_str().to_owned(),
                signature_date: now,
                certificate: input.certificate.clone(),
                certificate_subject: envelope.subject().map(str::to_owned),
                physician_id: input.physician_id,
            });
            report.status = ReportStatus::Signed;
            report.touch(now);
            Ok(report.clone())
        })
    }

    /// Dispatches a signed report to a recipient.
    ///
    /// A `Pending` dispatch record is created first; gateway acceptance
    /// moves the report to `Sent` (first acceptance only). Gateway refusal
    /// leaves the report in its prior state and the dispatch record behind,
    /// marked `Failed`.
    pub fn send(
        &self,
        id: Uuid,
        input: SendReport,
    ) -> CoreResult<(MedicalReport, ReportDispatch)> {
        let now = Utc::now();
        let recipient = validate_recipient(input.delivery_method, &input.recipient)?;

        let stores = Arc::clone(&self.stores);
        let gateway = Arc::clone(&self.gateway);

        self.stores.reports.update(id, move |report| {
            report.ensure_allows(ReportCommand::Send)?;

            let dispatch = ReportDispatch {
                id: Uuid::new_v4(),
                report_id: report.id,
                patient_id: report.patient_id,
                delivery_method: input.delivery_method,
                delivery_status: DeliveryStatus::Pending,
                recipient: recipient.clone(),
                requested_at: now,
                status_updated_at: None,
            };
            stores.dispatches.insert(dispatch.id, dispatch.clone())?;

            let payload = DispatchPayload {
                report_id: report.id,
                report_number: report.report_number.clone(),
                title: report.title.clone(),
                content: report.content.clone(),
                patient_id: report.patient_id,
            };

            if let Err(refusal) = gateway.deliver(input.delivery_method, &recipient, &payload) {
                // The attempt is still part of the record; only the report's
                // own status stays untouched.
                stores.dispatches.update(dispatch.id, |d| {
                    d.delivery_status = DeliveryStatus::Failed;
                    d.status_updated_at = Some(now);
                    Ok(())
                })?;
                tracing::warn!(
                    report = %report.id,
                    method = input.delivery_method.as_str(),
                    "delivery gateway refused dispatch"
                );
                return Err(CoreError::DeliveryRejected(refusal.to_string()));
            }

            if report.status == ReportStatus::Signed {
                report.status = ReportStatus::Sent;
                report.touch(now);
            }
            Ok((report.clone(), dispatch))
        })
    }

    /// Records the delivery collaborator's progress for one dispatch.
    /// Idempotent: repeating the current status is a no-op.
    pub fn record_delivery_status(
        &self,
        dispatch_id: Uuid,
        status: DeliveryStatus,
    ) -> CoreResult<ReportDispatch> {
        let now = Utc::now();

        self.stores.dispatches.update(dispatch_id, |dispatch| {
            if dispatch.delivery_status == status {
                return Ok(dispatch.clone());
            }
            if !dispatch.delivery_status.can_progress_to(status) {
                return Err(CoreError::InvalidStateTransition {
                    entity: "dispatch",
                    id: dispatch.id,
                    from: dispatch.delivery_status.as_str(),
                    command: "record_delivery_status",
                });
            }
            dispatch.delivery_status = status;
            dispatch.status_updated_at = Some(now);
            Ok(dispatch.clone())
        })
    }

    /// Deletes a draft report. Any other state is rejected.
    pub fn delete(&self, id: Uuid) -> CoreResult<MedicalReport> {
        self.stores
            .reports
            .remove_where(id, |report| report.ensure_allows(ReportCommand::Delete))
    }

    /// Copies a report into a fresh draft with its own identity and number,
    /// regardless of the source's state. The signature never travels.
    pub fn duplicate(&self, id: Uuid) -> CoreResult<MedicalReport> {
        let now = Utc::now();
        let source = self.stores.reports.snapshot(id)?;

        let (report_number, sequence_number) = allocate_report_number(
            &self.stores.reports,
            self.cfg.report_number_prefix(),
            now.year(),
            || self.stores.next_report_sequence(),
        )?;

        let copy = MedicalReport {
            id: Uuid::new_v4(),
            version: 1,
            report_number,
            sequence_number,
            title: source.title,
            report_type: source.report_type,
            content: source.content,
            observations: source.observations,
            anamnesis: source.anamnesis,
            status: ReportStatus::Draft,
            patient_id: source.patient_id,
            physician_id: source.physician_id,
            encounter_id: source.encounter_id,
            template_id: source.template_id,
            signature: None,
            issue_date: now.date_naive(),
            created_at: now,
            updated_at: now,
        };

        self.stores.reports.insert(copy.id, copy.clone())?;
        tracing::debug!(source = %id, copy = %copy.id, "report duplicated");
        Ok(copy)
    }

    /// Recomputes the content hash and compares it with the stored
    /// signature. Unsigned reports verify as `false`.
    pub fn verify_signature(&self, id: Uuid) -> CoreResult<bool> {
        let report = self.stores.reports.snapshot(id)?;
        Ok(match report.signature {
            Some(signature) => {
                ContentHash::from_encoded(signature.signature_hash).matches(&report.content)
            }
            None => false,
        })
    }

    /// Every dispatch attempt recorded for a report, oldest first.
    pub fn dispatches(&self, report_id: Uuid) -> CoreResult<Vec<ReportDispatch>> {
        self.stores.reports.snapshot(report_id)?;
        let mut attempts = self
            .stores
            .dispatches
            .filtered(|dispatch| dispatch.report_id == report_id);
        attempts.sort_by_key(|dispatch| dispatch.requested_at);
        Ok(attempts)
    }

    /// A read snapshot of the report.
    pub fn get(&self, id: Uuid) -> CoreResult<MedicalReport> {
        self.stores.reports.snapshot(id)
    }
}
