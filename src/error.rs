use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Every failure the engine reports to the caller. All variants are local
/// validation failures except `Db`, which wraps store errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("student is not enrolled or has not completed the course")]
    NotEligible,
    #[error("attempt does not belong to this student")]
    Forbidden,
    #[error("previous lessons must be completed first")]
    SequenceViolation,
    #[error("this exam was already passed")]
    AlreadyPassed,
    #[error("this attempt was already finalized")]
    AlreadyFinalized,
    #[error("attempt limit reached ({0})")]
    AttemptLimitReached(i64),
    #[error("every question must have exactly one answer")]
    IncompleteSubmission,
    #[error("a submitted option does not belong to its question")]
    InvalidOption,
    #[error("this exam is deactivated")]
    ExamInactive,
    #[error("this exam has no questions")]
    EmptyExam,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotEligible | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::SequenceViolation
            | ApiError::AlreadyPassed
            | ApiError::AlreadyFinalized
            | ApiError::AttemptLimitReached(_)
            | ApiError::ExamInactive
            | ApiError::EmptyExam => StatusCode::CONFLICT,
            ApiError::IncompleteSubmission | ApiError::InvalidOption => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::NotEligible => "not_eligible",
            ApiError::Forbidden => "forbidden",
            ApiError::SequenceViolation => "sequence_violation",
            ApiError::AlreadyPassed => "already_passed",
            ApiError::AlreadyFinalized => "already_finalized",
            ApiError::AttemptLimitReached(_) => "attempt_limit_reached",
            ApiError::IncompleteSubmission => "incomplete_submission",
            ApiError::InvalidOption => "invalid_option",
            ApiError::ExamInactive => "exam_inactive",
            ApiError::EmptyExam => "empty_exam",
            ApiError::Db(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Store errors stay opaque to the client.
            ApiError::Db(e) => {
                tracing::error!(error=%e, "database error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}
