//! Rate-budgeted, retrying retrieval of one media item into a workspace

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::RetrievalConfig;
use crate::limiter::RateLimiter;
use crate::naming::Locator;
use crate::provider::{ContentProvider, ProviderFailure, ProviderStatus};
use crate::session::{SessionBlob, SessionStore};
use crate::workspace::Workspace;

const MEDIA_EXTENSIONS: &[&str] = &["mp4"];

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("rate limit reached, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("content requires login: {0}")]
    Unauthorized(String),

    #[error("access to content is forbidden: {0}")]
    Forbidden(String),

    #[error("content not found: {0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// A downloaded video inside the request's workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub path: PathBuf,
    pub title: Option<String>,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(MediaArtifact),
    /// Valid locator that does not point at a video
    NotAVideo,
}

/// How a provider failure is treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Unauthorized,
    Forbidden,
    NotFound,
    /// The provider throttled us; worth another attempt after backoff
    Throttled,
    Transient,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Throttled | FailureClass::Transient)
    }
}

/// Maps a provider failure onto the retry taxonomy.
///
/// An explicit status always wins. Without one, the message text is scanned
/// for known phrases and standalone status codes; this is a heuristic and
/// anything unrecognized is treated as transient.
pub fn classify(failure: &ProviderFailure) -> FailureClass {
    match failure.status {
        Some(status) => class_of_status(status),
        None => classify_message(&failure.message),
    }
}

/// Like [`classify`], but ignores the locator token wherever the message
/// echoes it, so a token such as `C404xYz` or `private9` names no status.
pub fn classify_for(failure: &ProviderFailure, locator: &Locator) -> FailureClass {
    match failure.status {
        Some(status) => class_of_status(status),
        None => classify_message(&failure.message.replace(&locator.token, " ")),
    }
}

fn class_of_status(status: ProviderStatus) -> FailureClass {
    match status {
        ProviderStatus::LoginRequired => FailureClass::Unauthorized,
        ProviderStatus::Forbidden => FailureClass::Forbidden,
        ProviderStatus::NotFound => FailureClass::NotFound,
        ProviderStatus::RateLimited => FailureClass::Throttled,
        ProviderStatus::Unavailable => FailureClass::Transient,
    }
}

fn classify_message(message: &str) -> FailureClass {
    const UNAUTHORIZED: &[&str] = &[
        "login required",
        "login_required",
        "requires login",
        "unauthorized",
        "private",
    ];
    const FORBIDDEN: &[&str] = &["forbidden"];
    const NOT_FOUND: &[&str] = &["not found", "does not exist"];
    const THROTTLED: &[&str] = &["rate limit", "rate-limit", "too many requests"];

    let text = message.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    // Status codes count only as whole words; `-` and `_` belong to the word
    // so tokens like `ab-404` stay opaque
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .collect();
    let has_code = |code: &str| words.contains(&code);

    if mentions(UNAUTHORIZED) || has_code("401") {
        FailureClass::Unauthorized
    } else if mentions(FORBIDDEN) || has_code("403") {
        FailureClass::Forbidden
    } else if mentions(NOT_FOUND) || has_code("404") {
        FailureClass::NotFound
    } else if mentions(THROTTLED) || has_code("429") {
        FailureClass::Throttled
    } else {
        FailureClass::Transient
    }
}

fn surface(class: FailureClass, failure: ProviderFailure) -> RetrievalError {
    match class {
        FailureClass::Unauthorized => RetrievalError::Unauthorized(failure.message),
        FailureClass::Forbidden => RetrievalError::Forbidden(failure.message),
        FailureClass::NotFound => RetrievalError::NotFound(failure.message),
        FailureClass::Throttled | FailureClass::Transient => {
            RetrievalError::Provider(failure.message)
        }
    }
}

/// Retry schedule for delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff.as_duration(),
        }
    }

    /// Delay after the given failed attempt (1-indexed): initial * 2^(attempt-1)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

pub struct RetrievalOrchestrator {
    provider: Arc<dyn ContentProvider>,
    limiter: Arc<RateLimiter>,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl RetrievalOrchestrator {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        limiter: Arc<RateLimiter>,
        sessions: SessionStore,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            limiter,
            sessions,
            clock,
            policy,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn fetch(
        &self,
        locator: &Locator,
        workspace: &Workspace,
    ) -> Result<FetchOutcome, RetrievalError> {
        let session = self.sessions.load();

        let handle = self
            .provider
            .resolve(locator, session.as_ref())
            .await
            .map_err(|failure| {
                let class = classify_for(&failure, locator);
                warn!(%locator, ?class, error = %failure, "Failed to resolve locator");
                surface(class, failure)
            })?;

        if !handle.is_video {
            info!(%locator, "Locator does not point at a video");
            return Ok(FetchOutcome::NotAVideo);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            if !self.limiter.allow() {
                let retry_after = self.limiter.time_until_next_slot();
                warn!(%locator, retry_after_secs = retry_after.as_secs(), "Local rate limit reached");
                return Err(RetrievalError::RateLimited { retry_after });
            }

            debug!(%locator, attempt, workspace = %workspace.id(), "Delivery attempt");
            let failure = match self.attempt(locator, session.as_ref(), workspace).await {
                Ok(path) => {
                    if attempt > 1 {
                        info!(%locator, attempt, "Delivery succeeded after retry");
                    }
                    return Ok(FetchOutcome::Fetched(MediaArtifact {
                        path,
                        title: handle.title.clone(),
                    }));
                }
                Err(failure) => failure,
            };

            let class = classify_for(&failure, locator);
            if !class.is_retryable() {
                warn!(%locator, attempt, ?class, error = %failure, "Delivery failed permanently");
                return Err(surface(class, failure));
            }

            if attempt >= self.policy.max_attempts {
                warn!(%locator, attempt, error = %failure, "Delivery failed after retries");
                return Err(RetrievalError::Provider(failure.message));
            }

            let backoff = self.policy.backoff_after(attempt);
            warn!(
                %locator,
                attempt,
                ?class,
                backoff_secs = backoff.as_secs_f64(),
                error = %failure,
                "Delivery failed, retrying"
            );
            self.clock.sleep(backoff).await;
        }
    }

    /// One delivery; a successful call that leaves no video behind counts as a failure
    async fn attempt(
        &self,
        locator: &Locator,
        session: Option<&SessionBlob>,
        workspace: &Workspace,
    ) -> Result<PathBuf, ProviderFailure> {
        let refreshed = self
            .provider
            .deliver(locator, session, workspace.path())
            .await?;

        let media = workspace
            .find_file(MEDIA_EXTENSIONS)
            .map_err(|e| ProviderFailure::message(format!("failed to inspect workspace: {}", e)))?
            .ok_or_else(|| ProviderFailure::message("delivery produced no video file"))?;

        if let Some(blob) = refreshed {
            self.sessions.save(&blob);
        }

        debug!(%locator, path = %media.display(), "Located delivered media");
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_status_wins_over_text() {
        let failure = ProviderFailure::with_status(ProviderStatus::NotFound, "login required");
        assert_eq!(classify(&failure), FailureClass::NotFound);

        let failure = ProviderFailure::with_status(ProviderStatus::RateLimited, "whatever");
        assert_eq!(classify(&failure), FailureClass::Throttled);
    }

    #[test]
    fn test_text_fallback() {
        let cases = [
            ("ERROR: abc: Requested content is not available, rate-limit reached or login required", FailureClass::Unauthorized),
            ("Private Profile", FailureClass::Unauthorized),
            ("HTTP Error 403: Forbidden", FailureClass::Forbidden),
            ("Post does not exist", FailureClass::NotFound),
            ("HTTP Error 404", FailureClass::NotFound),
            ("429 Too Many Requests", FailureClass::Throttled),
            ("connection reset by peer", FailureClass::Transient),
            ("", FailureClass::Transient),
        ];
        for (message, expected) in cases {
            assert_eq!(classify(&ProviderFailure::message(message)), expected, "{}", message);
        }
    }

    #[test]
    fn test_status_codes_must_stand_alone() {
        let cases = [
            ("HTTP Error 404: Not Found", FailureClass::NotFound),
            ("HTTP Error 403", FailureClass::Forbidden),
            ("status=401", FailureClass::Unauthorized),
            ("got 429 from upstream", FailureClass::Throttled),
            ("ERROR: [Instagram] C404xYz: read timed out", FailureClass::Transient),
            ("ERROR: [Instagram] ab-403: connection reset", FailureClass::Transient),
            ("fragment 14290 failed", FailureClass::Transient),
        ];
        for (message, expected) in cases {
            assert_eq!(classify(&ProviderFailure::message(message)), expected, "{}", message);
        }
    }

    #[test]
    fn test_locator_token_is_ignored() {
        let locator = Locator::parse("https://www.instagram.com/reel/private404/").unwrap();
        let failure = ProviderFailure::message(
            "ERROR: [Instagram] private404: Unable to download webpage: The read operation timed out",
        );
        assert_eq!(classify(&failure), FailureClass::Unauthorized);
        assert_eq!(classify_for(&failure, &locator), FailureClass::Transient);

        let failure = ProviderFailure::message("ERROR: [Instagram] private404: HTTP Error 404");
        assert_eq!(classify_for(&failure, &locator), FailureClass::NotFound);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff_after(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(10));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(20));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_secs(5));
    }
}
