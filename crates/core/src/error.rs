use uuid::Uuid;

/// A single validation problem, tied to the input field that caused it.
///
/// Commands that validate structured input collect every violation they find
/// before failing, so a caller can surface all problems at once instead of
/// fixing them one round-trip at a time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {}", render_violations(.0))]
    Validation(Vec<Violation>),

    #[error("{command} is not legal for {entity} {id} in state {from}")]
    InvalidStateTransition {
        entity: &'static str,
        id: Uuid,
        from: &'static str,
        command: &'static str,
    },

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{entity} {id} was modified by a concurrent command")]
    ConcurrentModification { entity: &'static str, id: Uuid },

    #[error("delivery gateway rejected the dispatch: {0}")]
    DeliveryRejected(String),

    /// A report number or sequence collision. This indicates a defect in the
    /// sequence allocator, not a user error, and must not be retried.
    #[error("sequence integrity failure: {0}")]
    SequenceIntegrity(String),
}

impl CoreError {
    /// Convenience constructor for a single-violation validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![Violation::new(field, message)])
    }

    /// The violations carried by a `Validation` error, empty otherwise.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Validation(violations) => violations,
            _ => &[],
        }
    }
}

impl From<praxis_signing::SigningError> for CoreError {
    fn from(err: praxis_signing::SigningError) -> Self {
        Self::InvalidCertificate(err.to_string())
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_renders_every_violation() {
        let err = CoreError::Validation(vec![
            Violation::new("reason", "reason is required"),
            Violation::new("duration_minutes", "must be between 15 and 120"),
        ]);

        let rendered = err.to_string();
        assert!(rendered.contains("reason is required"));
        assert!(rendered.contains("between 15 and 120"));
    }

    #[test]
    fn signing_error_maps_to_invalid_certificate() {
        let err: CoreError = praxis_signing::SigningError::MalformedEnvelope.into();
        assert!(matches!(err, CoreError::InvalidCertificate(_)));
    }
}
