use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use journeylink_core::validation::ValidationErrors;
use journeylink_core::LifecycleError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("{0}")]
    Unauthenticated(String),
    /// Malformed request that never reached a manager.
    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Lifecycle(err) => match err {
                LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
                LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
                LifecycleError::Authorization(_) => StatusCode::FORBIDDEN,
                LifecycleError::InvalidState(_)
                | LifecycleError::Capacity(_)
                | LifecycleError::DuplicateBooking(_) => StatusCode::CONFLICT,
                LifecycleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Lifecycle(err) => err.code(),
            AppError::Unauthenticated(_) => "UNAUTHORIZED",
            AppError::BadRequest(_) => "VALIDATION_FAILED",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details) = match &self {
            AppError::Lifecycle(LifecycleError::Validation(errors)) => {
                (self.to_string(), serde_json::to_value(errors).unwrap_or_default())
            }
            AppError::Lifecycle(LifecycleError::Storage(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                ("Internal Server Error".to_string(), json!([]))
            }
            _ => (self.to_string(), json!([])),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "details": details,
            }
        }));

        (status, body).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Lifecycle(LifecycleError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (LifecycleError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LifecycleError::Authorization("x".into()), StatusCode::FORBIDDEN),
            (LifecycleError::InvalidState("x".into()), StatusCode::CONFLICT),
            (LifecycleError::Capacity("x".into()), StatusCode::CONFLICT),
            (LifecycleError::DuplicateBooking("x".into()), StatusCode::CONFLICT),
            (LifecycleError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
        assert_eq!(AppError::Unauthenticated("no token".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Unauthenticated("no token".into()).code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_validation_keeps_field_details() {
        let err = AppError::from(ValidationErrors::single("price", "out_of_range", "too expensive"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }
}
