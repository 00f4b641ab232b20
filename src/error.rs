//! Error types for image animation.

use std::time::Duration;

/// Body text Google returns when the key's project cannot see the resource.
pub(crate) const ENTITY_NOT_FOUND: &str = "Requested entity was not found.";

/// Maximum length of an upstream error body kept in an error message.
const MAX_ERROR_BODY_LEN: usize = 500;

/// Errors that can occur while animating an image.
#[derive(Debug, thiserror::Error)]
pub enum FrameflowError {
    /// Local input rejected before any network activity.
    #[error("{0}")]
    Validation(String),

    /// The key provider capability is missing from the environment.
    #[error("key selection environment not available: {0}")]
    EnvironmentUnavailable(String),

    /// No usable API key after the key check.
    #[error("API key not configured: {0}")]
    KeyNotConfigured(String),

    /// The video host rejected the key (entity not found).
    #[error("invalid API key: {0}")]
    InvalidKey(String),

    /// The key selection flow failed.
    #[error("key selection failed: {0}")]
    KeySelection(String),

    /// The operation finished without a video URI.
    #[error("video generation completed but no download link was returned")]
    NoDownloadLink,

    /// Downloading the generated video failed.
    #[error("failed to fetch video: {status} - {body}")]
    Fetch { status: u16, body: String },

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// API key rejected by the generation endpoint.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The remote operation reported a failure.
    #[error("video generation failed: {0}")]
    VideoGeneration(String),

    /// Polling exceeded its configured bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Generation was cancelled by the caller.
    #[error("generation cancelled")]
    Cancelled,

    /// Another generation is already in flight.
    #[error("a generation is already in progress")]
    Busy,

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error (e.g., reading an image or saving a video).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error classification used by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad local input; nothing was sent.
    Validation,
    /// The key provider is missing.
    Environment,
    /// Missing or rejected credential; triggers key re-selection.
    Credential,
    /// The remote workflow failed.
    Remote,
    /// The caller cancelled the attempt.
    Cancelled,
    /// Rejected because another attempt is running.
    Busy,
}

impl FrameflowError {
    /// Returns the coarse class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::Busy => ErrorClass::Busy,
            Self::Cancelled => ErrorClass::Cancelled,
            Self::EnvironmentUnavailable(_) => ErrorClass::Environment,
            Self::KeyNotConfigured(_) | Self::InvalidKey(_) | Self::Auth(_) => {
                ErrorClass::Credential
            }
            _ if self.mentions_key_problem() => ErrorClass::Credential,
            _ => ErrorClass::Remote,
        }
    }

    /// Returns true if this error means the selected key should be replaced.
    pub fn is_key_error(&self) -> bool {
        self.class() == ErrorClass::Credential
    }

    fn mentions_key_problem(&self) -> bool {
        let text = self.to_string();
        text.contains(ENTITY_NOT_FOUND.trim_end_matches('.')) || text.contains("API key")
    }

    /// Text shown in the error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::InvalidKey(_) => {
                "Your API key is invalid or lacks access to video generation. \
                 Please select a key from a project with billing enabled."
                    .to_string()
            }
            Self::KeyNotConfigured(_) => "Please select an API key to continue.".to_string(),
            other => format!("Video generation failed: {other}"),
        }
    }
}

/// Result type alias for animation operations.
pub type Result<T> = std::result::Result<T, FrameflowError>;

/// Truncates an upstream error body so it is safe to put in a message.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_LEN {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{cut}...")
}

/// Reads a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
