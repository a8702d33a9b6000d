use thiserror::Error;

use crate::db::StoreError;

/// Failure kinds surfaced by the TRV and schedule services.
///
/// This is a closed set: the HTTP layer maps each variant to exactly one
/// status code in `api::errors`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed, missing or structurally invalid input.
    #[error("{message}")]
    BadRequest {
        message: String,
        violations: Vec<String>,
    },

    #[error("{0}")]
    NotFound(String),

    /// The request is well-formed but irreconcilable with stored state.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    /// A validation failure carrying every violation that was found.
    pub fn invalid(message: impl Into<String>, violations: Vec<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            violations,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(format!("no record found with id {id}")),
            StoreError::AlreadyExists(id) => {
                Self::Conflict(format!("a record with id {id} already exists"))
            }
            other => Self::Unexpected(other.into()),
        }
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
