//! Locator parsing and file naming rules

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

static LOCATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(reel|p)/([A-Za-z0-9_-]+)").expect("locator pattern is valid")
});

const MAX_TITLE_CHARS: usize = 60;
const FALLBACK_TITLE: &str = "audio";
pub const AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("no URL provided")]
    Empty,
    #[error("unrecognized URL format: {0}")]
    Unrecognized(String),
}

/// Which public path the token was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    Reel,
    Post,
}

impl LocatorKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            LocatorKind::Reel => "reel",
            LocatorKind::Post => "p",
        }
    }
}

/// Short public identifier of one remote media item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub kind: LocatorKind,
    pub token: String,
}

impl Locator {
    /// Extracts the locator from a `.../reel/<token>` or `.../p/<token>` URL
    pub fn parse(url: &str) -> Result<Self, LocatorError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(LocatorError::Empty);
        }

        let captures = LOCATOR_RE
            .captures(url)
            .ok_or_else(|| LocatorError::Unrecognized(url.to_string()))?;

        let kind = match &captures[1] {
            "reel" => LocatorKind::Reel,
            _ => LocatorKind::Post,
        };

        Ok(Self {
            kind,
            token: captures[2].to_string(),
        })
    }

    /// Canonical public URL under `base_url`
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}/",
            base_url.trim_end_matches('/'),
            self.kind.path_segment(),
            self.token
        )
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.path_segment(), self.token)
    }
}

/// Reduces a caption to a filesystem-safe stem.
///
/// Whitespace becomes `_`, anything outside `[A-Za-z0-9_-]` is dropped,
/// `_` runs collapse, and the result is capped at 60 characters.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(MAX_TITLE_CHARS));
    for c in title.chars() {
        let mapped = if c.is_whitespace() {
            '_'
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            continue;
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
        if out.len() >= MAX_TITLE_CHARS {
            break;
        }
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '-');
    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<sanitized title>_<request id>.mp3`; the id keeps concurrent runs apart
pub fn output_filename(title: &str, request_id: Uuid) -> String {
    format!("{}_{}.{}", sanitize_title(title), request_id, AUDIO_EXTENSION)
}

/// Rejects names that could escape the output directory or reach anything
/// other than a top-level file in it. Hidden names are reserved for files
/// being handed out.
pub fn is_safe_served_name(filename: &str) -> bool {
    !filename.is_empty() && !filename.starts_with('.') && !filename.contains(['/', '\\'])
}
