//! Error taxonomy shared by the pipeline, the plan service and the progress
//! tracker.

use thiserror::Error;
use uuid::Uuid;

/// Anything that can go wrong between a learning goal and a stored plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A generation stage failed, timed out or produced nothing. The caller
    /// may retry the whole request.
    #[error("stage {stage} failed: {reason}")]
    TransientUpstream { stage: String, reason: String },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The requested content collides with another plan of the same owner.
    #[error("an equivalent plan already exists ({existing_id})")]
    Conflict { existing_id: Uuid },

    #[error("{what} not found")]
    NotFound { what: String },

    /// The store failed; the enclosing transaction was rolled back.
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

impl PlanError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn upstream(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientUpstream {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientUpstream { .. } => "transient_upstream",
            Self::Extraction(_) => "extraction",
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "persistence",
        }
    }
}

/// No well-formed JSON object could be isolated from generated text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no JSON object found in generated text")]
    NoObject,

    #[error("JSON object starting at byte {start} is never closed")]
    Unbalanced { start: usize },

    #[error("no balanced candidate parsed as JSON: {reason}")]
    Malformed { reason: String },
}

/// A decoded plan broke a structural rule. `field` is a path such as
/// `milestones[2].week`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Wrap a store error as [`PlanError::Persistence`].
pub(crate) fn persistence(err: anyhow::Error) -> PlanError {
    PlanError::Persistence(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_field() {
        let err = PlanError::from(ValidationError::new("milestones[2].week", "out of range"));
        assert_eq!(err.to_string(), "invalid milestones[2].week: out of range");
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn persistence_shows_context_chain() {
        let inner = anyhow::anyhow!("connection reset").context("failed to insert plan");
        let err = persistence(inner);
        assert_eq!(
            err.to_string(),
            "persistence failure: failed to insert plan: connection reset"
        );
    }

    #[test]
    fn extraction_wraps_transparently() {
        let err = PlanError::from(ExtractionError::Unbalanced { start: 12 });
        assert_eq!(err.to_string(), "JSON object starting at byte 12 is never closed");
        assert_eq!(err.kind(), "extraction");
    }
}
