//! Error types for plugkit
//!
//! Recoverable problems (validation, plan inconsistencies, handler failures)
//! travel as [`Diagnostics`](crate::types::Diagnostics) inside response
//! envelopes. This error type is reserved for protocol-level failures that
//! abort an RPC outright or prevent a server from starting.

use crate::types::{AttributePath, Diagnostic};

/// Error type for plugkit operations
#[derive(Debug, thiserror::Error)]
pub enum PlugkitError {
    #[error("Invalid schema: {0}")]
    SchemaInvalid(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: AttributePath,
        expected: String,
        actual: String,
    },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Unknown value: {0}")]
    UnknownValue(String),

    #[error("Resource type not found: {0}")]
    ResourceNotFound(String),

    #[error("Data source type not found: {0}")]
    DataSourceNotFound(String),

    #[error("Ephemeral resource type not found: {0}")]
    EphemeralResourceNotFound(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Action type not found: {0}")]
    ActionNotFound(String),

    #[error("Multiplexer conflict: {0}")]
    MuxConflict(String),

    #[error("Protocol version mismatch: server speaks {server}, client requested {client}")]
    ProtocolMismatch { server: u8, client: u8 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("gRPC transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

/// Result type alias for plugkit operations
pub type Result<T> = std::result::Result<T, PlugkitError>;

impl PlugkitError {
    /// Converts the error into an error diagnostic for a response envelope.
    pub fn into_diagnostic(self) -> Diagnostic {
        let summary = match &self {
            PlugkitError::SchemaInvalid(_) => "Invalid Schema",
            PlugkitError::DecodingError(_) | PlugkitError::TypeMismatch { .. } => {
                "Unable to Decode Value"
            }
            PlugkitError::EncodingError(_) => "Unable to Encode Value",
            PlugkitError::Unsupported(_) => "Unsupported Operation",
            PlugkitError::UnknownValue(_) => "Unknown Configuration Value",
            PlugkitError::ResourceNotFound(_) => "Resource Type Not Found",
            PlugkitError::DataSourceNotFound(_) => "Data Source Type Not Found",
            PlugkitError::EphemeralResourceNotFound(_) => "Ephemeral Resource Type Not Found",
            PlugkitError::FunctionNotFound(_) => "Function Not Found",
            PlugkitError::ActionNotFound(_) => "Action Type Not Found",
            PlugkitError::Cancelled => "Operation Cancelled",
            PlugkitError::TimedOut(_) => "Operation Timed Out",
            _ => "Provider Error",
        };
        let attribute = match &self {
            PlugkitError::TypeMismatch { path, .. } if !path.steps.is_empty() => {
                Some(path.clone())
            }
            _ => None,
        };
        let diagnostic = Diagnostic::error(summary, self.to_string());
        match attribute {
            Some(path) => diagnostic.with_attribute(path),
            None => diagnostic,
        }
    }
}

impl From<String> for PlugkitError {
    fn from(s: String) -> Self {
        PlugkitError::Custom(s)
    }
}

impl From<&str> for PlugkitError {
    fn from(s: &str) -> Self {
        PlugkitError::Custom(s.to_string())
    }
}

impl From<PlugkitError> for tonic::Status {
    fn from(error: PlugkitError) -> Self {
        let message = error.to_string();
        match error {
            PlugkitError::ResourceNotFound(_)
            | PlugkitError::DataSourceNotFound(_)
            | PlugkitError::EphemeralResourceNotFound(_)
            | PlugkitError::FunctionNotFound(_)
            | PlugkitError::ActionNotFound(_) => tonic::Status::not_found(message),
            PlugkitError::DecodingError(_) | PlugkitError::TypeMismatch { .. } => {
                tonic::Status::invalid_argument(message)
            }
            PlugkitError::Unsupported(_) => tonic::Status::unimplemented(message),
            PlugkitError::ProtocolMismatch { .. } => tonic::Status::failed_precondition(message),
            PlugkitError::Cancelled => tonic::Status::cancelled(message),
            PlugkitError::TimedOut(_) => tonic::Status::deadline_exceeded(message),
            _ => tonic::Status::internal(message),
        }
    }
}

impl From<serde_json::Error> for PlugkitError {
    fn from(e: serde_json::Error) -> Self {
        PlugkitError::DecodingError(format!("json: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiagnosticSeverity;

    #[test]
    fn type_mismatch_diagnostic_carries_path() {
        let err = PlugkitError::TypeMismatch {
            path: AttributePath::new("dyn"),
            expected: "string".to_string(),
            actual: "bool".to_string(),
        };
        let diag = err.into_diagnostic();

        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.summary, "Unable to Decode Value");
        assert_eq!(diag.attribute, Some(AttributePath::new("dyn")));
    }

    #[test]
    fn errors_map_to_grpc_status_codes() {
        let status = tonic::Status::from(PlugkitError::ResourceNotFound("corner_nope".to_string()));
        assert_eq!(status.code(), tonic::Code::NotFound);
        assert!(status.message().contains("corner_nope"));

        let status = tonic::Status::from(PlugkitError::Unsupported("flatmap".to_string()));
        assert_eq!(status.code(), tonic::Code::Unimplemented);

        let status = tonic::Status::from(PlugkitError::Handler("boom".to_string()));
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[test]
    fn string_conversion_produces_custom_error() {
        let err: PlugkitError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
