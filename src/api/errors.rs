use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::error::ServiceError;

#[derive(Debug)]
pub enum AppError {
    Service(ServiceError),
    Unauthorized(&'static str),
}

/// Body of every error response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub name: String,
    pub message: String,
    /// Individual violations; only present for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(ServiceError::BadRequest { .. }) => StatusCode::BAD_REQUEST,
            Self::Service(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Service(ServiceError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Service(ServiceError::Unexpected(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Service(ServiceError::BadRequest { .. }) => "BadRequest",
            Self::Service(ServiceError::NotFound(_)) => "NotFound",
            Self::Service(ServiceError::Conflict(_)) => "Conflict",
            Self::Service(ServiceError::Unexpected(_)) => "InternalServerError",
            Self::Unauthorized(_) => "Unauthorized",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let name = self.name();

        let (message, errors) = match self {
            Self::Service(ServiceError::BadRequest { message, violations }) => {
                (message, (!violations.is_empty()).then_some(violations))
            }
            Self::Service(ServiceError::Unexpected(e)) => {
                let detail = format!("{e:#}");
                error!(error = %detail, "Request failed unexpectedly");
                (e.to_string(), None)
            }
            Self::Service(e) => (e.to_string(), None),
            Self::Unauthorized(reason) => {
                warn!(reason, "Rejected unauthenticated request");
                ("unauthorized".to_owned(), None)
            }
        };

        let body = Json(ErrorBody {
            status_code: status.as_u16(),
            name: name.to_owned(),
            message,
            errors,
        });

        if status == StatusCode::UNAUTHORIZED {
            let challenge = [(header::WWW_AUTHENTICATE, r#"Basic realm="trv""#)];
            return (status, challenge, body).into_response();
        }
        (status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}
