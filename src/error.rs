//! Error taxonomy for page assembly.
//!
//! Every failure surfaced by the crate is an [`ApiError`]. The variants map
//! onto handling decisions rather than onto underlying libraries:
//!
//! | Variant | Meaning | Retryable |
//! |-----------------|--------------------------------------------|-----------|
//! | Transport | Connectivity, timeout, 5xx | Yes |
//! | Client | 4xx-equivalent request error | No |
//! | Decode | Malformed payload | No |
//! | StructuralParse | Markup missing the expected anchors | No |
//! | Auth | Login or action rejected | No |
//!
//! `StructuralParse` is special: the assembler recovers from it locally by
//! switching comment-reconstruction mode, and it only reaches the caller when
//! the alternate mode is also impossible.

use std::collections::HashSet;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Coarse classification of an [`ApiError`], used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Client,
    Decode,
    StructuralParse,
    Auth,
}

/// Unified error type for all fetch, parse and assembly failures.
///
/// The type is `Clone` so a coalesced fetch can deliver the same failure to
/// every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Connectivity-level failure: timeout, connection refused, DNS, 5xx.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request itself was wrong (4xx-equivalent). Never retried.
    #[error("client error (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    /// A payload arrived but could not be decoded into the expected shape.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// The rendered markup did not contain the anchors we navigate by.
    #[error("markup missing expected structure: {0}")]
    StructuralParse(String),

    /// Login or an authenticated action was rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Client { .. } => ErrorKind::Client,
            ApiError::Decode(_) => ErrorKind::Decode,
            ApiError::StructuralParse(_) => ErrorKind::StructuralParse,
            ApiError::Auth(_) => ErrorKind::Auth,
        }
    }

    /// Whether this error is transient enough that retrying can help.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// The default set of kinds a retry policy should consider transient.
    pub fn default_retryable_kinds() -> HashSet<ErrorKind> {
        HashSet::from([ErrorKind::Transport])
    }
}

/// Classify a reqwest error into the crate taxonomy.
///
/// Connectivity problems and server errors are transport failures; 4xx maps
/// to `Client` (401/403 to `Auth`), body-decoding problems to `Decode`.
pub fn classify_reqwest_error(err: &reqwest::Error, url: &str) -> ApiError {
    if err.is_timeout() {
        return ApiError::Transport(format!("request to '{url}' timed out"));
    }
    if err.is_connect() {
        return ApiError::Transport(format!("connection to '{url}' failed: {err}"));
    }
    if err.is_decode() {
        return ApiError::Decode(format!("failed to decode response from '{url}': {err}"));
    }
    if let Some(status) = err.status() {
        return classify_status(status.as_u16(), &err.to_string());
    }
    ApiError::Transport(format!("request to '{url}' failed: {err}"))
}

/// Map an HTTP status code onto the taxonomy.
pub fn classify_status(status: u16, message: &str) -> ApiError {
    match status {
        401 | 403 => ApiError::Auth(format!("HTTP {status}: {message}")),
        400..=499 => ApiError::Client {
            status,
            message: message.to_string(),
        },
        _ => ApiError::Transport(format!("HTTP {status}: {message}")),
    }
}
