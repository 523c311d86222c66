use std::fmt;

/// Error kinds an upstream provider can report.
///
/// These are passed through the emulator unchanged; adapters map their
/// vendor-specific error vocabulary onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamErrorKind {
    Unknown,
    NoResponse,
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    Overloaded,
    InternalServer,
}

impl UpstreamErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamErrorKind::Unknown => "unknown error",
            UpstreamErrorKind::NoResponse => "no response",
            UpstreamErrorKind::InvalidRequest => "invalid request",
            UpstreamErrorKind::Authentication => "authentication error",
            UpstreamErrorKind::Permission => "permission error",
            UpstreamErrorKind::NotFound => "not found",
            UpstreamErrorKind::RateLimit => "rate limit error",
            UpstreamErrorKind::Overloaded => "overloaded",
            UpstreamErrorKind::InternalServer => "internal server error",
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical error type used across all modules.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanonicalError {
    /// A vendor/upstream protocol invariant was violated.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The caller aborted the generation.
    #[error("Generation cancelled")]
    Cancelled,
    /// A structured payload from the upstream could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Upstream error ({kind}): {message}")]
    Upstream {
        kind: UpstreamErrorKind,
        message: String,
    },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("No such provider: {0}")]
    NoSuchProvider(String),
    #[error("Config error: {0}")]
    Config(String),
    /// Tool-call body could not be parsed. The emulator never surfaces this
    /// variant to callers; it degrades the span to literal text instead.
    #[error("FC parse error: {0}")]
    FcParse(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category, used by callers to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    Cancelled,
    ServerError,
    Unknown,
}

impl CanonicalError {
    #[must_use]
    pub fn upstream(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        CanonicalError::Upstream {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            CanonicalError::InvalidRequest(_) | CanonicalError::NoSuchProvider(_) => {
                ErrorCategory::InvalidRequest
            }
            CanonicalError::Cancelled => ErrorCategory::Cancelled,
            CanonicalError::InvalidResponse(_)
            | CanonicalError::Decode(_)
            | CanonicalError::Config(_)
            | CanonicalError::FcParse(_)
            | CanonicalError::Internal(_) => ErrorCategory::ServerError,
            CanonicalError::Upstream { kind, .. } => category_from_upstream_kind(*kind),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CanonicalError::Cancelled)
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CanonicalError::Upstream {
                kind: UpstreamErrorKind::RateLimit
                    | UpstreamErrorKind::Overloaded
                    | UpstreamErrorKind::InternalServer
                    | UpstreamErrorKind::NoResponse,
                ..
            }
        )
    }
}

impl From<serde_json::Error> for CanonicalError {
    fn from(err: serde_json::Error) -> Self {
        CanonicalError::Decode(err.to_string())
    }
}

#[must_use]
pub fn category_from_upstream_kind(kind: UpstreamErrorKind) -> ErrorCategory {
    match kind {
        UpstreamErrorKind::InvalidRequest => ErrorCategory::InvalidRequest,
        UpstreamErrorKind::Authentication => ErrorCategory::Authentication,
        UpstreamErrorKind::Permission => ErrorCategory::Permission,
        UpstreamErrorKind::NotFound => ErrorCategory::NotFound,
        UpstreamErrorKind::RateLimit => ErrorCategory::RateLimit,
        UpstreamErrorKind::Overloaded
        | UpstreamErrorKind::InternalServer
        | UpstreamErrorKind::NoResponse => ErrorCategory::ServerError,
        UpstreamErrorKind::Unknown => ErrorCategory::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Vendor error vocabularies
// ---------------------------------------------------------------------------

/// Map an upstream HTTP status code to an upstream error kind.
#[must_use]
pub fn upstream_kind_from_status(status: u16) -> UpstreamErrorKind {
    match status {
        400 => UpstreamErrorKind::InvalidRequest,
        401 => UpstreamErrorKind::Authentication,
        403 => UpstreamErrorKind::Permission,
        404 => UpstreamErrorKind::NotFound,
        429 => UpstreamErrorKind::RateLimit,
        529 => UpstreamErrorKind::Overloaded,
        500..=599 => UpstreamErrorKind::InternalServer,
        _ => UpstreamErrorKind::Unknown,
    }
}

/// Map an Anthropic `error.type` string to an upstream error kind.
#[must_use]
pub fn upstream_kind_from_anthropic_type(error_type: &str) -> UpstreamErrorKind {
    match error_type {
        "invalid_request_error" => UpstreamErrorKind::InvalidRequest,
        "authentication_error" => UpstreamErrorKind::Authentication,
        "permission_error" => UpstreamErrorKind::Permission,
        "not_found_error" => UpstreamErrorKind::NotFound,
        "rate_limit_error" => UpstreamErrorKind::RateLimit,
        "api_error" => UpstreamErrorKind::InternalServer,
        "overloaded_error" => UpstreamErrorKind::Overloaded,
        _ => UpstreamErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(
            upstream_kind_from_status(401),
            UpstreamErrorKind::Authentication
        );
        assert_eq!(upstream_kind_from_status(404), UpstreamErrorKind::NotFound);
        assert_eq!(upstream_kind_from_status(529), UpstreamErrorKind::Overloaded);
        assert_eq!(
            upstream_kind_from_status(503),
            UpstreamErrorKind::InternalServer
        );
        assert_eq!(upstream_kind_from_status(418), UpstreamErrorKind::Unknown);
    }

    #[test]
    fn anthropic_error_types_map_to_kinds() {
        assert_eq!(
            upstream_kind_from_anthropic_type("overloaded_error"),
            UpstreamErrorKind::Overloaded
        );
        assert_eq!(
            upstream_kind_from_anthropic_type("rate_limit_error"),
            UpstreamErrorKind::RateLimit
        );
        assert_eq!(
            upstream_kind_from_anthropic_type("something_new"),
            UpstreamErrorKind::Unknown
        );
    }

    #[test]
    fn categories_and_retryability() {
        let err = CanonicalError::upstream(UpstreamErrorKind::RateLimit, "slow down");
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Upstream error (rate limit error): slow down");

        assert_eq!(CanonicalError::Cancelled.category(), ErrorCategory::Cancelled);
        assert!(!CanonicalError::Cancelled.is_retryable());
        assert_eq!(
            CanonicalError::InvalidResponse("gap".into()).category(),
            ErrorCategory::ServerError
        );
    }
}
