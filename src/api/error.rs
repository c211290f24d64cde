use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::extractor::ExtractionError;
use crate::pipeline::PipelineError;
use crate::retrieval::RetrievalError;
use crate::storage::ServeError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Serve(#[from] ServeError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(err) => match err {
                PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                PipelineError::Workspace(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::Retrieval(err) => match err {
                    RetrievalError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                    RetrievalError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                    RetrievalError::Forbidden(_) => StatusCode::FORBIDDEN,
                    RetrievalError::NotFound(_) => StatusCode::NOT_FOUND,
                    RetrievalError::Provider(_) => StatusCode::BAD_GATEWAY,
                },
                PipelineError::Extraction(err) => match err {
                    ExtractionError::ToolMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    ExtractionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    ExtractionError::ExtractionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                },
            },
            ApiError::Serve(err) => match err {
                ServeError::InvalidName(_) | ServeError::NotFound(_) => StatusCode::NOT_FOUND,
                ServeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Pipeline(err) => match err {
                PipelineError::InvalidInput(_) => "INVALID_INPUT",
                PipelineError::Workspace(_) => "INTERNAL_ERROR",
                PipelineError::Retrieval(err) => match err {
                    RetrievalError::RateLimited { .. } => "RATE_LIMITED",
                    RetrievalError::Unauthorized(_) => "UNAUTHORIZED",
                    RetrievalError::Forbidden(_) => "FORBIDDEN",
                    RetrievalError::NotFound(_) => "NOT_FOUND",
                    RetrievalError::Provider(_) => "PROVIDER_ERROR",
                },
                PipelineError::Extraction(err) => match err {
                    ExtractionError::ToolMissing(_) => "TOOL_MISSING",
                    ExtractionError::Timeout(_) => "EXTRACTION_TIMEOUT",
                    ExtractionError::ExtractionFailed(_) => "EXTRACTION_FAILED",
                },
            },
            ApiError::Serve(err) => match err {
                ServeError::InvalidName(_) | ServeError::NotFound(_) => "FILE_NOT_FOUND",
                ServeError::Io(_) => "INTERNAL_ERROR",
            },
        }
    }

    /// Text safe to show to end users; internal details stay in the logs
    pub fn message(&self) -> String {
        match self {
            ApiError::Pipeline(err) => match err {
                PipelineError::InvalidInput(e) => format!("Invalid URL: {}", e),
                PipelineError::Workspace(_) => {
                    "An unexpected server error occurred. Please try again later.".to_string()
                }
                PipelineError::Retrieval(err) => match err {
                    RetrievalError::RateLimited { retry_after } => format!(
                        "Too many requests. Please try again in {} seconds.",
                        retry_after.as_secs().max(1)
                    ),
                    RetrievalError::Unauthorized(_) => {
                        "Cannot download from private profiles or content requiring login."
                            .to_string()
                    }
                    RetrievalError::Forbidden(_) => "Access to this content is forbidden.".to_string(),
                    RetrievalError::NotFound(_) => "The requested content was not found.".to_string(),
                    RetrievalError::Provider(detail) => {
                        format!("Error retrieving content: {}", detail)
                    }
                },
                PipelineError::Extraction(err) => match err {
                    ExtractionError::ToolMissing(_) => {
                        "Server configuration error: transcoder not found.".to_string()
                    }
                    ExtractionError::Timeout(_) => "Audio extraction took too long.".to_string(),
                    ExtractionError::ExtractionFailed(reason) => reason.user_message().to_string(),
                },
            },
            ApiError::Serve(_) => "File not found.".to_string(),
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::Pipeline(PipelineError::Retrieval(RetrievalError::RateLimited {
                retry_after,
            })) => Some(retry_after.as_secs().max(1)),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }

        let body = ErrorResponse {
            code: self.code(),
            message: self.message(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = self.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::FailureReason;
    use crate::naming::LocatorError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                PipelineError::InvalidInput(LocatorError::Empty).into(),
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
            ),
            (
                PipelineError::from(RetrievalError::Unauthorized("x".into())).into(),
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
            ),
            (
                PipelineError::from(RetrievalError::Provider("x".into())).into(),
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
            ),
            (
                PipelineError::from(ExtractionError::ToolMissing("ffmpeg".into())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOOL_MISSING",
            ),
            (
                PipelineError::from(ExtractionError::Timeout(Duration::from_secs(120))).into(),
                StatusCode::GATEWAY_TIMEOUT,
                "EXTRACTION_TIMEOUT",
            ),
            (
                ServeError::InvalidName("../x".into()).into(),
                StatusCode::NOT_FOUND,
                "FILE_NOT_FOUND",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_code(), status);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let error: ApiError = PipelineError::from(RetrievalError::RateLimited {
            retry_after: Duration::from_secs(42),
        })
        .into();
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_extraction_reason_message() {
        let error: ApiError = PipelineError::from(ExtractionError::ExtractionFailed(
            FailureReason::InputMissing,
        ))
        .into();
        assert_eq!(
            error.message(),
            "Input video file not found for audio extraction."
        );
    }
}
