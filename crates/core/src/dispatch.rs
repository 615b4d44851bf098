//! Report dispatch records and the delivery gateway seam.
//!
//! Sending a signed report creates one `ReportDispatch` per attempt; the
//! records are append-only and survive regardless of what the delivery
//! collaborator later reports. Delivery itself (SMTP, SMS providers,
//! messaging APIs) lives entirely behind `DeliveryGateway`; the collaborator
//! reports progress back through the idempotent status callback keyed by the
//! dispatch id.

use chrono::{DateTime, Utc};
use praxis_types::{EmailAddress, PhoneNumber};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// The channel a dispatch goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Email,
    Sms,
    Whatsapp,
    InPerson,
}

impl DeliveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::InPerson => "in_person",
        }
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one dispatch attempt, as reported by the delivery
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Delivered => "delivered",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Delivered)
    }

    /// Legal forward moves for the status callback. Identical updates are
    /// handled as no-ops by the caller, so they never reach this check.
    pub(crate) fn can_progress_to(self, next: DeliveryStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Sent | Self::Failed | Self::Delivered),
            Self::Sent => matches!(next, Self::Failed | Self::Delivered),
            Self::Failed | Self::Delivered => false,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivery attempt of a signed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDispatch {
    pub id: Uuid,
    pub report_id: Uuid,
    pub patient_id: Uuid,
    pub delivery_method: DeliveryMethod,
    pub delivery_status: DeliveryStatus,
    pub recipient: String,
    pub requested_at: DateTime<Utc>,
    pub status_updated_at: Option<DateTime<Utc>>,
}

/// What the delivery collaborator receives alongside method and recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub report_id: Uuid,
    pub report_number: String,
    pub title: String,
    pub content: String,
    pub patient_id: Uuid,
}

/// The delivery collaborator's refusal to accept a dispatch.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct GatewayRefusal(pub String);

/// External delivery collaborator.
///
/// `deliver` returning `Ok` means the attempt was *accepted*, not that it
/// was delivered; the collaborator reports eventual progress through
/// `ReportService::record_delivery_status`.
pub trait DeliveryGateway: Send + Sync {
    fn deliver(
        &self,
        method: DeliveryMethod,
        recipient: &str,
        payload: &DispatchPayload,
    ) -> Result<(), GatewayRefusal>;
}

/// Checks that the recipient value is shaped for the chosen channel and
/// returns the normalised form to store on the dispatch record.
pub(crate) fn validate_recipient(method: DeliveryMethod, recipient: &str) -> CoreResult<String> {
    match method {
        DeliveryMethod::Email => EmailAddress::parse(recipient)
            .map(|email| email.as_str().to_owned())
            .map_err(|e| CoreError::validation("recipient", e.to_string())),
        DeliveryMethod::Sms | DeliveryMethod::Whatsapp => PhoneNumber::parse(recipient)
            .map(|phone| phone.as_str().to_owned())
            .map_err(|e| CoreError::validation("recipient", e.to_string())),
        DeliveryMethod::InPerson => {
            let trimmed = recipient.trim();
            if trimmed.is_empty() {
                return Err(CoreError::validation("recipient", "recipient is required"));
            }
            Ok(trimmed.to_owned())
        }
    }
}
