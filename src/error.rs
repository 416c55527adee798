//! Error types for image generation and dispatch.

use crate::image::Provider;
use std::time::Duration;

/// Maximum length of a remote error body kept in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while listing models or generating images.
#[derive(Debug, thiserror::Error)]
pub enum SmartImageError {
    /// A setting is missing or invalid. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider is enabled but its client could not be constructed.
    #[error("{provider} provider unavailable: {message}")]
    ProviderUnavailable {
        /// Provider whose client failed.
        provider: Provider,
        /// Cause.
        message: String,
    },

    /// The model id is not in the catalog of any enabled provider.
    #[error("unknown model: {0}. Use list_models to see available models")]
    UnknownModel(String),

    /// The model or provider does not support a requested parameter.
    #[error("unsupported parameter: {message}")]
    UnsupportedParameter {
        /// Provider the parameter was checked against, if known.
        provider: Option<Provider>,
        /// What was unsupported.
        message: String,
    },

    /// Bad path, unreadable or undecodable image, empty prompt, or rejected content.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Provider that rejected the input, if the check was remote.
        provider: Option<Provider>,
        /// What was invalid.
        message: String,
    },

    /// Credentials missing, invalid or lacking permission.
    #[error("{provider} authentication failed: {message}")]
    Auth {
        /// Provider that rejected the credentials.
        provider: Provider,
        /// Cause.
        message: String,
    },

    /// Quota or rate limit exceeded.
    #[error("{provider} rate limited, retry after {retry_after:?}: {message}")]
    RateLimited {
        /// Provider that throttled the call.
        provider: Provider,
        /// Suggested delay, if the provider sent one.
        retry_after: Option<Duration>,
        /// Cause.
        message: String,
    },

    /// Any other provider failure, including network errors and timeouts.
    #[error("{provider} request failed: {message}")]
    Remote {
        /// Provider that failed.
        provider: Provider,
        /// HTTP status, when there was one.
        status: Option<u16>,
        /// Cause.
        message: String,
    },

    /// Every enabled provider failed.
    #[error("no providers available: {0}")]
    NoProvidersAvailable(String),
}

/// Stable, transport-friendly error category names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`SmartImageError::Configuration`].
    ConfigurationError,
    /// See [`SmartImageError::ProviderUnavailable`].
    ProviderUnavailableError,
    /// See [`SmartImageError::UnknownModel`].
    UnknownModelError,
    /// See [`SmartImageError::UnsupportedParameter`].
    UnsupportedParameterError,
    /// See [`SmartImageError::InvalidInput`].
    InvalidInputError,
    /// See [`SmartImageError::Auth`].
    AuthError,
    /// See [`SmartImageError::RateLimited`].
    RateLimitError,
    /// See [`SmartImageError::Remote`].
    RemoteError,
    /// See [`SmartImageError::NoProvidersAvailable`].
    NoProvidersAvailableError,
}

impl ErrorKind {
    /// Returns the snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::ProviderUnavailableError => "provider_unavailable_error",
            Self::UnknownModelError => "unknown_model_error",
            Self::UnsupportedParameterError => "unsupported_parameter_error",
            Self::InvalidInputError => "invalid_input_error",
            Self::AuthError => "auth_error",
            Self::RateLimitError => "rate_limit_error",
            Self::RemoteError => "remote_error",
            Self::NoProvidersAvailableError => "no_providers_available_error",
        }
    }
}

impl SmartImageError {
    /// Creates an unsupported-parameter error detected before any remote call.
    pub fn unsupported(provider: Provider, message: impl Into<String>) -> Self {
        Self::UnsupportedParameter {
            provider: Some(provider),
            message: message.into(),
        }
    }

    /// Creates a locally detected invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            provider: None,
            message: message.into(),
        }
    }

    /// Creates a remote error without an HTTP status.
    pub fn remote(provider: Provider, message: impl Into<String>) -> Self {
        Self::Remote {
            provider,
            status: None,
            message: message.into(),
        }
    }

    /// Maps a transport-level HTTP client error into a remote error.
    pub fn from_reqwest(provider: Provider, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else if err.is_decode() {
            format!("malformed response: {err}")
        } else {
            err.to_string()
        };
        Self::Remote {
            provider,
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailableError,
            Self::UnknownModel(_) => ErrorKind::UnknownModelError,
            Self::UnsupportedParameter { .. } => ErrorKind::UnsupportedParameterError,
            Self::InvalidInput { .. } => ErrorKind::InvalidInputError,
            Self::Auth { .. } => ErrorKind::AuthError,
            Self::RateLimited { .. } => ErrorKind::RateLimitError,
            Self::Remote { .. } => ErrorKind::RemoteError,
            Self::NoProvidersAvailable(_) => ErrorKind::NoProvidersAvailableError,
        }
    }

    /// Returns the provider the error is attributable to, if any.
    pub fn provider(&self) -> Option<Provider> {
        match self {
            Self::ProviderUnavailable { provider, .. }
            | Self::Auth { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Remote { provider, .. } => Some(*provider),
            Self::UnsupportedParameter { provider, .. } | Self::InvalidInput { provider, .. } => {
                *provider
            }
            Self::Configuration(_) | Self::UnknownModel(_) | Self::NoProvidersAvailable(_) => None,
        }
    }

    /// Returns true for errors detected locally from the request alone.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownModelError
                | ErrorKind::UnsupportedParameterError
                | ErrorKind::InvalidInputError
        )
    }

    /// Returns the suggested retry delay, if the provider sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for image operations.
pub type Result<T> = std::result::Result<T, SmartImageError>;

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Redacts key-like tokens and truncates a remote error body.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            let bare = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
            let looks_like_key = (bare.starts_with("sk-") || bare.starts_with("AIza"))
                && bare.len() > 12;
            if looks_like_key {
                word.replace(bare, "[REDACTED]")
            } else {
                word.to_string()
            }
        })
        .collect();
    let mut message = redacted.join(" ");
    if message.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("...");
    }
    message
}

/// Maps an HTTP error status shared by the REST providers into a category.
///
/// Provider clients call this after their own body-specific checks.
pub(crate) fn classify_http_status(
    provider: Provider,
    status: u16,
    text: &str,
    headers: &reqwest::header::HeaderMap,
) -> SmartImageError {
    let message = sanitize_error_message(text);
    match status {
        401 | 403 => SmartImageError::Auth { provider, message },
        429 => SmartImageError::RateLimited {
            provider,
            retry_after: parse_retry_after(headers).map(Duration::from_secs),
            message,
        },
        413 => SmartImageError::InvalidInput {
            provider: Some(provider),
            message: "image too large, reduce its size and try again".into(),
        },
        _ => SmartImageError::Remote {
            provider,
            status: Some(status),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_provider() {
        let err = SmartImageError::Auth {
            provider: Provider::OpenAi,
            message: "bad key".into(),
        };
        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert_eq!(err.provider(), Some(Provider::OpenAi));
        assert!(!err.is_validation());

        let err = SmartImageError::UnknownModel("nope".into());
        assert_eq!(err.kind().as_str(), "unknown_model_error");
        assert_eq!(err.provider(), None);
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = SmartImageError::Remote {
            provider: Provider::Gemini,
            status: Some(500),
            message: "internal".into(),
        };
        assert_eq!(err.to_string(), "gemini request failed: internal");

        let err = SmartImageError::unsupported(Provider::Bedrock, "512x768 not supported");
        assert_eq!(err.to_string(), "unsupported parameter: 512x768 not supported");
        assert_eq!(err.provider(), Some(Provider::Bedrock));
    }

    #[test]
    fn test_retry_after() {
        let err = SmartImageError::RateLimited {
            provider: Provider::Bedrock,
            retry_after: Some(Duration::from_secs(30)),
            message: "slow down".into(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(SmartImageError::invalid_input("x").retry_after(), None);
    }

    #[test]
    fn test_sanitize_redacts_keys() {
        let msg = sanitize_error_message("Incorrect API key provided: sk-abcdefghijklmnop.");
        assert!(!msg.contains("sk-abcdefghijklmnop"));
        assert!(msg.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(2000);
        let msg = sanitize_error_message(&long);
        assert!(msg.len() <= MAX_ERROR_MESSAGE_LEN + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn test_classify_http_status() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());

        let err = classify_http_status(Provider::OpenAi, 429, "too many", &headers);
        assert_eq!(err.kind(), ErrorKind::RateLimitError);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));

        let empty = reqwest::header::HeaderMap::new();
        let err = classify_http_status(Provider::Gemini, 403, "denied", &empty);
        assert_eq!(err.kind(), ErrorKind::AuthError);

        let err = classify_http_status(Provider::Gemini, 502, "bad gateway", &empty);
        assert!(matches!(err, SmartImageError::Remote { status: Some(502), .. }));
    }
}
