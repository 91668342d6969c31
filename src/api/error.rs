use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::api::validation::ErrorResponse;
use crate::engine::{CancelReason, EngineError, JobFailure};
use crate::pipeline::ValidationError;

/// Errors surfaced by the transcoding endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no video uploaded")]
    MissingUpload,

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("media engine unavailable")]
    EngineUnavailable,

    #[error("media engine failed (exit code {:?})", .0.exit_code)]
    EngineFailed(JobFailure),

    #[error("job cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        ApiError::Internal(format!("{}: {}", context, err))
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound | EngineError::Unavailable => ApiError::EngineUnavailable,
            other => ApiError::internal("engine launch failed", other),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingUpload | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, fields) = match self {
            ApiError::MissingUpload => {
                warn!("Rejected request without an upload");
                ("No video uploaded", serde_json::json!({"video": {"errors": ["a video file is required"]}}))
            }
            ApiError::Validation(e) => {
                warn!("Validation error: {}", e);
                ("Validation failed", serde_json::json!({"message": e.to_string()}))
            }
            ApiError::EngineUnavailable => {
                error!("Job rejected: media engine unavailable");
                ("media engine unavailable", serde_json::json!({}))
            }
            ApiError::EngineFailed(failure) => {
                error!(exit_code = ?failure.exit_code, "Video processing failed: {}", failure.diagnostic);
                (
                    "Video processing failed",
                    serde_json::json!({"message": failure.diagnostic}),
                )
            }
            ApiError::Cancelled(CancelReason::Timeout) => {
                error!("Job exceeded its time limit");
                ("processing timed out", serde_json::json!({}))
            }
            ApiError::Cancelled(CancelReason::ClientAbort) => {
                info!("Job cancelled by client");
                ("processing cancelled", serde_json::json!({}))
            }
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                ("Internal error", serde_json::json!({}))
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error.to_string(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_faults_are_bad_request() {
        assert_eq!(ApiError::MissingUpload.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Validation(ValidationError::UnsafeOverlayText).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn server_faults_are_internal() {
        for err in [
            ApiError::EngineUnavailable,
            ApiError::Cancelled(CancelReason::Timeout),
            ApiError::internal("io", "disk full"),
            ApiError::EngineFailed(JobFailure {
                exit_code: Some(1),
                diagnostic: "boom".to_string(),
            }),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn engine_errors_map_to_unavailable() {
        assert!(matches!(ApiError::from(EngineError::NotFound), ApiError::EngineUnavailable));
        assert!(matches!(
            ApiError::from(EngineError::MissingInput),
            ApiError::Internal(_)
        ));
    }

    #[actix_web::test]
    async fn internal_details_are_not_leaked() {
        let response = ApiError::internal("workspace allocation failed", "/tmp/secret").error_response();
        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Internal error");
        assert!(!body.to_string().contains("/tmp/secret"));
    }
}
