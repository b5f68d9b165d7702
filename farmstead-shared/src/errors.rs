//! Error taxonomy shared by the deploying side and the on-instance side.

use std::time::Duration;
use thiserror::Error;

pub type FarmsteadResult<T> = Result<T, FarmsteadError>;

#[derive(Debug, Error)]
pub enum FarmsteadError {
    /// Invalid options, capacity bounds, subnet lists or secret references.
    #[error("configuration error: {0}")]
    Config(String),

    /// A role that must never be assigned through bulk registration.
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Two callers disagree about the same network segment.
    #[error("registration conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The boot sequence reported failure through the completion signal.
    #[error("boot sequence failed with exit code {exit_code}")]
    BootFailed { exit_code: i32 },

    /// No completion signal arrived within the configured window.
    #[error("completion signal not received within {0:?}")]
    Timeout(Duration),

    /// Unknown resources or cyclic ordering edges in the deployment graph.
    #[error("deployment graph error: {0}")]
    Graph(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FarmsteadError {
    fn from(err: serde_json::Error) -> Self {
        FarmsteadError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FarmsteadError {
    fn from(err: toml::de::Error) -> Self {
        FarmsteadError::Config(format!("invalid TOML: {}", err))
    }
}

impl FarmsteadError {
    /// Configuration errors are raised synchronously and are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FarmsteadError::Config(_)
                | FarmsteadError::InvalidRole(_)
                | FarmsteadError::Conflict(_)
        )
    }

    /// Explicit failure and timeout are handled identically by the controller.
    pub fn is_deployment_failure(&self) -> bool {
        matches!(
            self,
            FarmsteadError::BootFailed { .. } | FarmsteadError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_classification() {
        assert!(FarmsteadError::Conflict("x".into()).is_configuration());
        assert!(FarmsteadError::InvalidRole("x".into()).is_configuration());
        assert!(!FarmsteadError::Timeout(Duration::from_secs(1)).is_configuration());
        assert!(FarmsteadError::Timeout(Duration::from_secs(1)).is_deployment_failure());
        assert!(FarmsteadError::BootFailed { exit_code: 2 }.is_deployment_failure());
    }

    #[test]
    fn test_boot_failure_message_has_exit_code() {
        let err = FarmsteadError::BootFailed { exit_code: 127 };
        assert!(err.to_string().contains("127"));
    }
}
