use crate::error::AppError;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub trait ToValidationResponse {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>>;
}

impl ToValidationResponse for AppError {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        let status = self.status_code();

        let (field, message) = match &self {
            AppError::Fields(errors) => {
                return Custom(status, Json(ValidationResponse::new(field_messages(errors))));
            }
            AppError::Database(_) => ("database", "Database error".to_string()),
            AppError::InsufficientData(msg) => ("input", msg.clone()),
            AppError::InvalidState(msg) => ("state", msg.clone()),
            AppError::NotFound(msg) => ("resource", format!("Not found: {}", msg)),
            AppError::ConstraintViolation(_) => {
                ("schedule", "Schedule failed an integrity check".to_string())
            }
            AppError::Validation(msg) => ("request", msg.clone()),
            AppError::Authentication(msg) => {
                ("authentication", format!("Authentication error: {}", msg))
            }
            AppError::Authorization(msg) => {
                ("authorization", format!("Permission denied: {}", msg))
            }
            AppError::Timeout(msg) => ("service", msg.clone()),
            AppError::Configuration(_) | AppError::Internal(_) => {
                ("server", "Internal server error".to_string())
            }
        };

        Custom(status, Json(ValidationResponse::with_error(field, &message)))
    }
}

impl ToValidationResponse for Status {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        let (field, message) = match self {
            Status::Forbidden => (
                "permission",
                "You don't have permission to perform this action",
            ),
            Status::Unauthorized => ("authentication", "Authentication required"),
            Status::NotFound => ("resource", "Resource not found"),
            Status::Conflict => ("resource", "Resource already exists"),
            Status::BadRequest => ("request", "Bad request"),
            Status::UnprocessableEntity => ("validation", "Validation failed"),
            Status::InternalServerError => ("server", "Internal server error"),
            Status::ServiceUnavailable => ("service", "Service unavailable"),
            _ => ("error", "An error occurred"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

fn field_messages(errors: &ValidationErrors) -> HashMap<String, Vec<String>> {
    let mut error_map = HashMap::new();

    for (field, field_errors) in errors.field_errors() {
        let error_messages: Vec<String> = field_errors
            .iter()
            .map(|error| {
                error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Invalid value".into())
                    .to_string()
            })
            .collect();

        error_map.insert(field.to_string(), error_messages);
    }

    error_map
}

/// Runs `validator` checks on a deserialized request body.
pub trait JsonValidateExt<T> {
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

/// Accumulates domain-level field errors in the same shape `validator` produces.
#[derive(Default)]
pub struct FieldErrors(ValidationErrors);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, code: &'static str, message: String) {
        self.0
            .add(field, ValidationError::new(code).with_message(Cow::Owned(message)));
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Fields(self.0))
        }
    }
}

pub fn validate_semester(semester: &str) -> Result<String, AppError> {
    let trimmed = semester.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Semester must not be empty".to_string()));
    }
    if trimmed.chars().count() > 50 {
        return Err(AppError::Validation(
            "Semester must be at most 50 characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
