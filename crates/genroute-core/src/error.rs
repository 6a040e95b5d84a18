use std::path::PathBuf;

use thiserror::Error;

/// Validation errors raised when building requests and parsing identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid task type '{value}', expected one of text, image, speech, music")]
    InvalidTaskType { value: String },
    #[error("invalid provider kind '{value}', expected one of openai, gemini, elevenlabs, suno")]
    InvalidProviderKind { value: String },

    #[error("prompt cannot be empty")]
    EmptyPrompt,
    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,
    #[error("payload parameter '{key}' must be {expected}")]
    InvalidParameter { key: String, expected: &'static str },

    #[error("provider name cannot be empty")]
    EmptyProviderName,
}

/// Errors raised while loading or applying orchestrator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("provider '{name}' is configured more than once")]
    DuplicateProvider { name: String },

    #[error("health.failure_threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("quota window for provider '{name}' must be greater than zero")]
    ZeroQuotaWindow { name: String },

    #[error("quota window for provider '{name}' must not exceed {max_secs} seconds")]
    QuotaWindowTooLong { name: String, max_secs: u64 },

    #[error("rate limit for provider '{name}' must allow at least one request per non-zero period")]
    InvalidRateLimit { name: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
