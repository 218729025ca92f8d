use thiserror::Error;

use super::entity_ids::FormationId;

/// Errors returned by consumer operations and the Status API.
///
/// Notification failures are not errors at this level: they are recorded on
/// the assignment or formation and reported through status queries.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} with ID {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("formation {0} is not in READY state")]
    FormationNotReady(FormationId),

    #[error("formation {0} still has assignments and cannot be deleted")]
    FormationNotEmpty(FormationId),

    #[error("formation template of formation {0} does not support reset")]
    ResetNotSupported(FormationId),

    #[error("invalid status transition: {0}")]
    InvalidStatusTransition(String),

    #[error("constraint {constraint} rejected the operation: {reason}")]
    ConstraintViolation { constraint: String, reason: String },

    #[error("caller is not authorized for this resource")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidStatusTransition(message.into())
    }
}

/// Raised when a template cannot be rendered against its context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{artifact} template: {message}")]
pub struct TemplateError {
    pub artifact: &'static str,
    pub message: String,
}

impl TemplateError {
    pub fn new(artifact: &'static str, message: impl Into<String>) -> Self {
        Self {
            artifact,
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
