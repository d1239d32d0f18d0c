use thiserror::Error;

/// Model selection that cannot be served. Surfaced immediately, never retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown model backend `{name}` (expected mistral|openai|google|dryrun)")]
    UnknownBackend { name: String },
    #[error("model backend `{backend}` is not configured (missing api key)")]
    BackendNotConfigured { backend: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("turn did not reach a terminal state within {steps} steps")]
    StepLimitExceeded { steps: u32 },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl ApplicationError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check the selected models and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "A language model or database is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::StepLimitExceeded { .. })
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::Internal {
                message: "turn did not complete".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, ConfigurationError, DomainError, InterfaceError};

    #[test]
    fn unknown_backend_maps_to_bad_request_interface_error() {
        let unknown = ConfigurationError::UnknownBackend { name: "claude".to_owned() };
        let interface = ApplicationError::from(unknown).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "req-1" && message.contains("claude")
        ));
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface = ApplicationError::from(ConfigurationError::BackendNotConfigured {
            backend: "openai".to_owned(),
        })
        .into_interface("req-2");

        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check the selected models and try again."
        );
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Integration("mistral returned 503".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "A language model or database is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn step_limit_maps_to_internal() {
        let interface = ApplicationError::from(DomainError::StepLimitExceeded { steps: 32 })
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn configuration_classification_covers_unknown_and_unconfigured_backends() {
        let unknown = ConfigurationError::UnknownBackend { name: "x".to_owned() };
        assert!(ApplicationError::from(unknown).is_configuration());
        let unconfigured =
            ConfigurationError::BackendNotConfigured { backend: "google".to_owned() };
        assert!(ApplicationError::from(unconfigured).is_configuration());
        assert!(!ApplicationError::from(DomainError::StepLimitExceeded { steps: 1 })
            .is_configuration());
        assert!(!ApplicationError::Integration("timeout".to_owned()).is_configuration());
    }
}
