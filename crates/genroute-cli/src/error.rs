use thiserror::Error;

use genroute_core::DispatchError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] genroute_core::ValidationError),

    #[error(transparent)]
    Config(#[from] genroute_core::ConfigError),

    #[error("invalid --param '{0}', expected key=value")]
    InvalidParam(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::InvalidParam(_) => 2,
            Self::Dispatch(DispatchError::NoAvailableProvider { .. }) => 3,
            Self::Dispatch(DispatchError::AllProvidersFailed { .. }) => 4,
            Self::Serialization(_) => 10,
            Self::Io(_) => 10,
        }
    }
}
