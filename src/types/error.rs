//! Error types for the FYP portal
//!
//! Every failure a lifecycle, panel, marks or task operation can produce is a
//! variant here. Variants are grouped into coarse categories that decide the
//! HTTP status and whether the message may be shown to the caller.

use hyper::StatusCode;

/// Coarse error taxonomy shared by all operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Out-of-range marks, missing fields, malformed identities
    Validation,
    /// Invalid transition, capacity exceeded, duplicates, already assigned
    StateConflict,
    /// Contract, panel, task or user id did not resolve
    NotFound,
    /// Role or ownership mismatch
    Unauthorized,
    /// Store or unexpected failure; detail is never shown to the caller
    Internal,
}

/// Main error type for portal operations
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    CapacityExceeded(String),

    #[error("{0}")]
    DuplicateEngagement(String),

    #[error("{0}")]
    IdentityMismatch(String),

    #[error("Error! Same ID found for both students")]
    SelfPairing,

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Panel name must be entered!")]
    NameRequired,

    #[error("One or more of the selected advisor/panel is already in panel!")]
    MemberAlreadyAssigned,

    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    AlreadySubmitted(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// Category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::Http(_) => ErrorCategory::Validation,
            Self::CapacityExceeded(_)
            | Self::DuplicateEngagement(_)
            | Self::IdentityMismatch(_)
            | Self::SelfPairing
            | Self::InvalidTransition(_)
            | Self::NameRequired
            | Self::MemberAlreadyAssigned
            | Self::InvalidOperation(_)
            | Self::AlreadySubmitted(_) => ErrorCategory::StateConflict,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Unauthorized(_) | Self::Auth(_) => ErrorCategory::Unauthorized,
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::StateConflict => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    pub fn public_message(&self) -> String {
        match self.category() {
            ErrorCategory::Internal => "Internal server error!".to_string(),
            ErrorCategory::Unauthorized => match self {
                Self::Unauthorized(msg) => msg.clone(),
                _ => "Unauthorized Access!".to_string(),
            },
            _ => self.to_string(),
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        (self.status_code(), self.public_message())
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Http(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for PortalError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for PortalError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for PortalError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON serialization error: {}", err))
    }
}

impl From<bson::de::Error> for PortalError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON deserialization error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for PortalError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Auth(format!("JWT error: {}", err))
    }
}

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conflicts_are_bad_requests() {
        let errors = [
            PortalError::CapacityExceeded("full".into()),
            PortalError::DuplicateEngagement("dup".into()),
            PortalError::SelfPairing,
            PortalError::InvalidTransition("nope".into()),
            PortalError::MemberAlreadyAssigned,
        ];
        for err in errors {
            assert_eq!(err.category(), ErrorCategory::StateConflict);
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = PortalError::Database("connection refused on 10.0.0.3".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error!");
    }

    #[test]
    fn test_not_found_and_unauthorized() {
        let err = PortalError::NotFound("Entity does not exist!".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "Entity does not exist!");

        let err = PortalError::Auth("Token expired".into());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.public_message(), "Unauthorized Access!");
    }
}
