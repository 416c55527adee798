//! Provider configuration snapshot.
//!
//! Built once at startup from environment-style variables and immutable
//! afterwards. A provider whose enable flag is absent or false is silently
//! disabled; a provider that is enabled without its required credentials is a
//! configuration error.

use crate::error::{Result, SmartImageError};
use crate::image::Provider;
use std::time::Duration;

/// Default per-call timeout for provider requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_AWS_REGION: &str = "us-east-1";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Settings for AWS Bedrock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedrockSettings {
    /// AWS region hosting the models.
    pub region: String,
    /// Named profile; the default credential chain is used when absent.
    pub profile: Option<String>,
}

/// Settings for the OpenAI Images API.
#[derive(Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    /// Bearer token.
    pub api_key: String,
    /// API root, without a trailing slash.
    pub base_url: String,
}

/// Settings for the Gemini API.
#[derive(Clone, PartialEq, Eq)]
pub struct GeminiSettings {
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// API root, without a trailing slash.
    pub base_url: String,
}

// Keep keys out of debug output.
impl std::fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Immutable configuration for all providers.
///
/// `Some` settings mean the provider is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// AWS Bedrock settings, if enabled.
    pub bedrock: Option<BedrockSettings>,
    /// OpenAI settings, if enabled.
    pub openai: Option<OpenAiSettings>,
    /// Gemini settings, if enabled.
    pub gemini: Option<GeminiSettings>,
    /// Bound applied to every provider call.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ProviderConfig {
    /// A configuration with every provider disabled.
    pub fn disabled() -> Self {
        Self {
            bedrock: None,
            openai: None,
            gemini: None,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let request_timeout = match get("SMART_IMAGE_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(SmartImageError::Configuration(format!(
                        "SMART_IMAGE_TIMEOUT_SECS must be a positive number of seconds, got '{}'",
                        raw
                    )))
                }
            },
        };

        let bedrock = if is_flag_set(get(Provider::Bedrock.enable_flag())) {
            let region = match lookup("AWS_REGION") {
                None => DEFAULT_AWS_REGION.to_string(),
                Some(r) if r.trim().is_empty() => {
                    return Err(SmartImageError::Configuration(
                        "ENABLE_AWS is true but AWS_REGION is empty".into(),
                    ))
                }
                Some(r) => r.trim().to_string(),
            };
            Some(BedrockSettings {
                region,
                profile: get("AWS_PROFILE"),
            })
        } else {
            None
        };

        let openai = if is_flag_set(get(Provider::OpenAi.enable_flag())) {
            let api_key = get("OPENAI_API_KEY").ok_or_else(|| {
                SmartImageError::Configuration(
                    "ENABLE_OPENAI is true but OPENAI_API_KEY is not set".into(),
                )
            })?;
            Some(OpenAiSettings {
                api_key,
                base_url: base_url(get("OPENAI_BASE_URL"), DEFAULT_OPENAI_BASE_URL),
            })
        } else {
            None
        };

        let gemini = if is_flag_set(get(Provider::Gemini.enable_flag())) {
            let api_key = get("GEMINI_API_KEY")
                .or_else(|| get("GOOGLE_API_KEY"))
                .ok_or_else(|| {
                    SmartImageError::Configuration(
                        "ENABLE_GEMINI is true but GEMINI_API_KEY is not set".into(),
                    )
                })?;
            Some(GeminiSettings {
                api_key,
                base_url: base_url(get("GEMINI_BASE_URL"), DEFAULT_GEMINI_BASE_URL),
            })
        } else {
            None
        };

        let config = Self {
            bedrock,
            openai,
            gemini,
            request_timeout,
        };
        tracing::debug!(
            enabled = ?config.enabled_providers(),
            timeout_secs = config.request_timeout.as_secs(),
            "provider configuration loaded"
        );
        Ok(config)
    }

    /// Enables Bedrock.
    pub fn with_bedrock(mut self, settings: BedrockSettings) -> Self {
        self.bedrock = Some(settings);
        self
    }

    /// Enables OpenAI.
    pub fn with_openai(mut self, settings: OpenAiSettings) -> Self {
        self.openai = Some(settings);
        self
    }

    /// Enables Gemini.
    pub fn with_gemini(mut self, settings: GeminiSettings) -> Self {
        self.gemini = Some(settings);
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns true if the provider is enabled.
    pub fn is_enabled(&self, provider: Provider) -> bool {
        match provider {
            Provider::Bedrock => self.bedrock.is_some(),
            Provider::OpenAi => self.openai.is_some(),
            Provider::Gemini => self.gemini.is_some(),
        }
    }

    /// Enabled providers in declaration order.
    pub fn enabled_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.is_enabled(*p))
            .collect()
    }
}

fn is_flag_set(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn base_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ProviderConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProviderConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_nothing_set_disables_everything() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.enabled_providers().is_empty());
        assert_eq!(cfg.request_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_false_flag_ignores_missing_credentials() {
        let cfg = config(&[("ENABLE_OPENAI", "false"), ("ENABLE_GEMINI", "no")]).unwrap();
        assert!(!cfg.is_enabled(Provider::OpenAi));
        assert!(!cfg.is_enabled(Provider::Gemini));
    }

    #[test]
    fn test_enabled_without_key_fails() {
        let err = config(&[("ENABLE_OPENAI", "true")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = config(&[("ENABLE_GEMINI", "TRUE"), ("GEMINI_API_KEY", "  ")]).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_gemini_accepts_google_api_key() {
        let cfg = config(&[("ENABLE_GEMINI", "true"), ("GOOGLE_API_KEY", "g-key")]).unwrap();
        assert_eq!(cfg.gemini.unwrap().api_key, "g-key");
    }

    #[test]
    fn test_bedrock_defaults() {
        let cfg = config(&[("ENABLE_AWS", "1")]).unwrap();
        let bedrock = cfg.bedrock.unwrap();
        assert_eq!(bedrock.region, "us-east-1");
        assert!(bedrock.profile.is_none());

        let cfg = config(&[
            ("ENABLE_AWS", "true"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_PROFILE", "images"),
        ])
        .unwrap();
        let bedrock = cfg.bedrock.unwrap();
        assert_eq!(bedrock.region, "eu-west-1");
        assert_eq!(bedrock.profile.as_deref(), Some("images"));
    }

    #[test]
    fn test_bedrock_empty_region_fails() {
        let err = config(&[("ENABLE_AWS", "true"), ("AWS_REGION", "")]).unwrap_err();
        assert!(err.to_string().contains("AWS_REGION"));
    }

    #[test]
    fn test_base_url_override_strips_slash() {
        let cfg = config(&[
            ("ENABLE_OPENAI", "true"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
        ])
        .unwrap();
        assert_eq!(cfg.openai.unwrap().base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_timeout_parsing() {
        let cfg = config(&[("SMART_IMAGE_TIMEOUT_SECS", "30")]).unwrap();
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));

        let err = config(&[("SMART_IMAGE_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("SMART_IMAGE_TIMEOUT_SECS"));
        assert!(config(&[("SMART_IMAGE_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_enabled_order_follows_declaration() {
        let cfg = config(&[
            ("ENABLE_GEMINI", "true"),
            ("GEMINI_API_KEY", "g"),
            ("ENABLE_AWS", "true"),
        ])
        .unwrap();
        assert_eq!(
            cfg.enabled_providers(),
            vec![Provider::Bedrock, Provider::Gemini]
        );
    }

    #[test]
    fn test_debug_redacts_keys() {
        let cfg = config(&[("ENABLE_OPENAI", "true"), ("OPENAI_API_KEY", "sk-secret")]).unwrap();
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("sk-secret"));
    }
}
