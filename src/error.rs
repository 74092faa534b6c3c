use crate::criterion_key::CriterionKey;
use crate::evaluator::EvaluatorRole;
use thiserror::Error;

/// Failures reported by a `DocumentStore`.
///
/// Only collaborator failures travel through this type. Malformed document content is
/// defaulted while deserializing and never surfaces here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Failures of the evaluation workflow.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("caller {uid} is not allowed to write the {role} evaluation")]
    Unauthorized { uid: String, role: EvaluatorRole },
    #[error("caller {0} is not an administrator")]
    AdminOnly(String),
    #[error("the {0} evaluation is already completed")]
    RecordFinalized(EvaluatorRole),
    #[error("rating {rating} for criterion {key} is outside 0..={max_rating}")]
    RatingOutOfRange {
        key: CriterionKey,
        rating: f64,
        max_rating: f64,
    },
    #[error("role {0} has no bound evaluator")]
    UnboundRole(EvaluatorRole),
    #[error("results not available yet: {completed} of {required} evaluations completed")]
    QuorumNotMet { completed: usize, required: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of the evaluation workflow.
pub type Result<T> = std::result::Result<T, EvaluationError>;
