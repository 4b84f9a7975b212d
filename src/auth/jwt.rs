//! JWT token handling
//!
//! Tokens are HS256-signed and carry the user id and role. The role in the
//! token is re-checked against the stored user on every request.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::types::PortalError;

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (hex ObjectId)
    pub sub: String,
    /// Role the token was issued for
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into a `Result`, mapping failures to `Auth`
    pub fn into_claims(self) -> Result<Claims, PortalError> {
        match self.claims {
            Some(claims) if self.valid => Ok(claims),
            _ => Err(PortalError::Auth(
                self.error.unwrap_or_else(|| "Invalid token".into()),
            )),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, PortalError> {
        if secret.is_empty() {
            return Err(PortalError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(PortalError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode (allows empty secret)
    pub fn new_dev(expiry_seconds: u64) -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds,
        }
    }

    /// Generate a JWT token for an authenticated user
    pub fn generate_token(&self, user_id: &str, role: Role) -> Result<String, PortalError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PortalError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| PortalError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

/// Extract token from Authorization header.
/// Only the "Bearer <token>" format is accepted.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();

        let token = validator
            .generate_token("65f1c0ffee0000000000beef", Role::Advisor)
            .unwrap();
        assert!(!token.is_empty());

        let claims = validator.verify_token(&token).into_claims().unwrap();
        assert_eq!(claims.sub, "65f1c0ffee0000000000beef");
        assert_eq!(claims.role, Role::Advisor);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_invalid_token() {
        let validator = test_validator();

        let result = validator.verify_token("invalid-token");
        assert!(!result.valid);
        assert!(matches!(result.into_claims(), Err(PortalError::Auth(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let validator1 = test_validator();
        let validator2 = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            3600,
        )
        .unwrap();

        let token = validator1.generate_token("user", Role::Admin).unwrap();
        assert!(!validator2.verify_token(&token).valid);
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("abc123")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
        assert!(JwtValidator::new("".into(), 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600).is_ok());
    }
}
