use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use rocket::response::Responder;
use thiserror::Error;
use tracing::{Span, error, warn};

use crate::validation::ToValidationResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    Fields(#[from] validator::ValidationErrors),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::InsufficientData(_) => "insufficient_data",
            AppError::InvalidState(_) => "invalid_state",
            AppError::NotFound(_) => "not_found_error",
            AppError::ConstraintViolation(_) => "constraint_violation",
            AppError::Validation(_) | AppError::Fields(_) => "validation_error",
            AppError::Authentication(_) => "authentication_error",
            AppError::Authorization(_) => "authorization_error",
            AppError::Timeout(_) => "timeout_error",
            AppError::Configuration(_) => "configuration_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
            }
            AppError::ConstraintViolation(msg) => {
                error!(message = %msg, context = %ctx, "Persistence constraint tripped");
            }
            AppError::Timeout(msg) => {
                error!(message = %msg, context = %ctx, "Operation timed out");
            }
            AppError::Configuration(msg) | AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
            }
            AppError::Fields(errors) => {
                warn!(errors = ?errors, context = %ctx, "Validation error");
            }
            AppError::InsufficientData(msg)
            | AppError::InvalidState(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Authentication(msg)
            | AppError::Authorization(msg) => {
                warn!(message = %msg, context = %ctx, kind = self.kind(), "Request rejected");
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(self.kind()));
            current_span.record("error.message", tracing::field::display(&message));

            if self.status_code().code >= 500 {
                current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => Status::InternalServerError,
            AppError::InsufficientData(_) => Status::UnprocessableEntity,
            AppError::InvalidState(_) => Status::Conflict,
            AppError::NotFound(_) => Status::NotFound,
            AppError::ConstraintViolation(_) => Status::InternalServerError,
            AppError::Validation(_) => Status::BadRequest,
            AppError::Fields(_) => Status::UnprocessableEntity,
            AppError::Authentication(_) => Status::Unauthorized,
            AppError::Authorization(_) => Status::Forbidden,
            AppError::Timeout(_) => Status::GatewayTimeout,
            AppError::Configuration(_) => Status::InternalServerError,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.log_and_record(&format!("Request to {} {}", req.method(), req.uri()));
        self.to_validation_response().respond_to(req)
    }
}

impl From<rocket::tokio::task::JoinError> for AppError {
    fn from(error: rocket::tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", error))
    }
}
