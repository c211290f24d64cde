//! Remote content provider capability.
//!
//! The provider's wire protocol is opaque to the rest of the crate: the
//! retrieval layer only resolves a [`Locator`] into a [`MediaHandle`], asks
//! for delivery into a directory, and round-trips an opaque
//! [`SessionBlob`].

mod command;

pub use command::CommandProvider;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::naming::Locator;
use crate::session::SessionBlob;

/// Status category reported by a provider that knows why it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    RateLimited,
    LoginRequired,
    Forbidden,
    NotFound,
    Unavailable,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderStatus::RateLimited => "rate limited",
            ProviderStatus::LoginRequired => "login required",
            ProviderStatus::Forbidden => "forbidden",
            ProviderStatus::NotFound => "not found",
            ProviderStatus::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

/// Provider-level failure with a human-readable message
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderFailure {
    pub status: Option<ProviderStatus>,
    pub message: String,
}

impl ProviderFailure {
    /// Failure whose cause is only known from its text
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: ProviderStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// What the provider knows about a locator before downloading anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub is_video: bool,
    /// Caption or title preferred for naming the output
    pub title: Option<String>,
}

#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn resolve(
        &self,
        locator: &Locator,
        session: Option<&SessionBlob>,
    ) -> Result<MediaHandle, ProviderFailure>;

    /// Writes the media payload into `target_dir`.
    ///
    /// Returns the refreshed session when the provider has one worth keeping.
    async fn deliver(
        &self,
        locator: &Locator,
        session: Option<&SessionBlob>,
        target_dir: &Path,
    ) -> Result<Option<SessionBlob>, ProviderFailure>;
}
