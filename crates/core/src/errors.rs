use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by the gateway, the approval protocol and the tools.
///
/// Every kind is carried inside a structured result so the orchestration layer
/// can narrate it to the user; none of them is raised as a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    Transport,
    Remote,
    TokenMismatch,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Remote => "remote",
            Self::TokenMismatch => "token_mismatch",
            Self::NotFound => "not_found",
        }
    }

    pub fn into_interface(
        self,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> InterfaceError {
        let message = message.into();
        let correlation_id = correlation_id.into();
        match self {
            Self::Validation | Self::TokenMismatch => {
                InterfaceError::BadRequest { message, correlation_id }
            }
            Self::NotFound => InterfaceError::NotFound { message, correlation_id },
            Self::Transport | Self::Remote => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration => InterfaceError::Internal { message, correlation_id },
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record could not be found.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ErrorKind, InterfaceError};

    #[test]
    fn validation_maps_to_bad_request_with_correlation_id() {
        let interface = ErrorKind::Validation.into_interface("prompt is required", "req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn token_mismatch_is_a_caller_error() {
        let interface =
            ErrorKind::TokenMismatch.into_interface("content changed since preview", "req-2");
        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn transport_and_remote_map_to_service_unavailable() {
        for kind in [ErrorKind::Transport, ErrorKind::Remote] {
            let interface = kind.into_interface("upstream down", "req-3");
            assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
            assert_eq!(interface.correlation_id(), "req-3");
        }
    }

    #[test]
    fn configuration_maps_to_internal() {
        let interface = ErrorKind::Configuration.into_interface("endpoint missing", "req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        let encoded = serde_json::to_string(&ErrorKind::TokenMismatch).expect("serialize");
        assert_eq!(encoded, "\"token_mismatch\"");
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }
}
