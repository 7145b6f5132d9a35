//! Closed-set tool error taxonomy and message classification
//!
//! Handlers surface failures by returning `ToolError`; the middleware maps
//! each error to one of six wire codes. Classification of wrapped driver
//! errors is data-driven: an ordered substring ruleset matched against the
//! lower-cased message, never a branch ladder.

use serde::Serialize;
use thiserror::Error;

/// Wire-level error code attached to `error.code` in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "PERMISSION")]
    Permission,
    #[serde(rename = "STALE_REF")]
    StaleRef,
    #[serde(rename = "NAVIGATION")]
    Navigation,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::Permission => "PERMISSION",
            Self::StaleRef => "STALE_REF",
            Self::Navigation => "NAVIGATION",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Error type returned by every tool handler.
///
/// The first five variants carry an explicit code chosen at the failure
/// site. `Internal` wraps driver/glue errors whose code is recovered by
/// [`classify_message`] in the middleware.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    StaleRef(String),
    #[error("{0}")]
    Navigation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn stale_ref(msg: impl Into<String>) -> Self {
        Self::StaleRef(msg.into())
    }

    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Resolve the wire code. Explicit variants map directly; wrapped
    /// internal errors go through the message ruleset.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Permission(_) => ErrorCode::Permission,
            Self::StaleRef(_) => ErrorCode::StaleRef,
            Self::Navigation(_) => ErrorCode::Navigation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Internal(err) => classify_message(&err.to_string()),
        }
    }
}

/// Ordered classification ruleset: first lower-cased substring match wins.
///
/// Order matters. Timeout phrasing is checked before the generic
/// "not found" family because driver timeout messages often embed a
/// selector that was "not found within 30s".
const CLASSIFY_RULES: &[(&str, ErrorCode)] = &[
    ("timed out", ErrorCode::Timeout),
    ("timeout", ErrorCode::Timeout),
    ("deadline has elapsed", ErrorCode::Timeout),
    ("deadline exceeded", ErrorCode::Timeout),
    ("permission denied", ErrorCode::Permission),
    ("access is denied", ErrorCode::Permission),
    ("not permitted", ErrorCode::Permission),
    ("outside the allowed", ErrorCode::Permission),
    ("origin is not allowed", ErrorCode::Permission),
    ("blocked by", ErrorCode::Permission),
    ("stale", ErrorCode::StaleRef),
    ("no longer valid", ErrorCode::StaleRef),
    ("was invalidated", ErrorCode::StaleRef),
    ("frame was detached", ErrorCode::Navigation),
    ("detached", ErrorCode::Navigation),
    ("target closed", ErrorCode::Navigation),
    ("session closed", ErrorCode::Navigation),
    ("browser closed", ErrorCode::Navigation),
    ("connection closed", ErrorCode::Navigation),
    ("execution context was destroyed", ErrorCode::Navigation),
    ("cannot find context", ErrorCode::Navigation),
    ("navigation failed", ErrorCode::Navigation),
    ("net::err_aborted", ErrorCode::Navigation),
    ("not found", ErrorCode::NotFound),
    ("no node found", ErrorCode::NotFound),
    ("could not find node", ErrorCode::NotFound),
    ("no element found", ErrorCode::NotFound),
    ("does not exist", ErrorCode::NotFound),
    ("no such", ErrorCode::NotFound),
];

/// Classify an arbitrary error message into a wire code.
///
/// Falls back to `INTERNAL` when no rule matches.
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    for (needle, code) in CLASSIFY_RULES {
        if lower.contains(needle) {
            return *code;
        }
    }
    ErrorCode::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_variants_keep_their_code() {
        assert_eq!(ToolError::timeout("slow").code(), ErrorCode::Timeout);
        assert_eq!(ToolError::stale_ref("old").code(), ErrorCode::StaleRef);
        assert_eq!(ToolError::not_found("gone").code(), ErrorCode::NotFound);
    }

    #[test]
    fn timeout_wins_over_not_found_in_combined_messages() {
        // Driver messages like "waiting for selector `#x` timed out, element
        // not found" must classify as TIMEOUT, not NOT_FOUND.
        assert_eq!(
            classify_message("waiting for selector timed out, element not found"),
            ErrorCode::Timeout
        );
    }

    #[test]
    fn navigation_phrases() {
        assert_eq!(
            classify_message("Execution context was destroyed"),
            ErrorCode::Navigation
        );
        assert_eq!(classify_message("Target closed"), ErrorCode::Navigation);
        assert_eq!(
            classify_message("frame was detached during call"),
            ErrorCode::Navigation
        );
    }

    #[test]
    fn unmatched_messages_fall_back_to_internal() {
        assert_eq!(classify_message("boom"), ErrorCode::Internal);
        assert_eq!(classify_message(""), ErrorCode::Internal);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_message("TIMED OUT after 30s"), ErrorCode::Timeout);
        assert_eq!(classify_message("Permission Denied"), ErrorCode::Permission);
    }
}
