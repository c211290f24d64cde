use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
};
use tracing::info;

use super::{
    error::ApiError,
    models::{
        DownloadRequest, DownloadResponse, HealthResponse, RateLimitStatus, StatsResponse,
    },
    state::AppState,
};
use crate::pipeline::PipelineOutcome;

/// POST /download - fetch a reel or post and transcode it to mp3
pub async fn download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(url = %request.url, "Download requested");

    let response = match state.pipeline.run(&request.url).await? {
        PipelineOutcome::Served(audio) => DownloadResponse::Ready {
            download_url: format!("/serve/{}", audio.filename),
            filename: audio.filename,
            size: audio.size,
        },
        PipelineOutcome::NotAVideo => DownloadResponse::NotAVideo {
            message: "This post does not contain a video.".to_string(),
        },
    };

    Ok((StatusCode::OK, Json(response)))
}

/// GET /serve/{filename} - one-time download of a finished file
pub async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let data = state.pipeline.output().take(&filename).await?;

    let mut response = Response::new(Body::from(data));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    if let Ok(value) = content_disposition(&filename) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `attachment` disposition with the name as a quoted string; quotes and
/// backslashes are escaped and anything outside printable ASCII becomes `_`
fn content_disposition(filename: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut quoted = String::with_capacity(filename.len());
    for c in filename.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            ' '..='~' => quoted.push(c),
            _ => quoted.push('_'),
        }
    }
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", quoted))
}

/// GET /stats - download counter and limiter status
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline = &state.pipeline;
    let snapshot = pipeline.stats().snapshot();
    let limiter = pipeline.limiter();

    let response = StatsResponse {
        downloads: snapshot.downloads,
        updated_at: snapshot.updated_at,
        rate_limit: RateLimitStatus {
            used: limiter.in_window(),
            capacity: limiter.capacity(),
            retry_after_secs: limiter.time_until_next_slot().as_secs(),
        },
        runs: pipeline.metrics().snapshot().into(),
    };

    (StatusCode::OK, Json(response))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let transcoder = state.pipeline.extractor().locate_tool().is_some();
    let (status, label) = if transcoder {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            transcoder,
        }),
    )
}
