//! Authentication and authorization for the portal
//!
//! Provides:
//! - The closed role model and role-scoped marks capabilities
//! - JWT token generation and validation
//! - Password hashing with Argon2
//! - Per-request caller context

pub mod context;
pub mod jwt;
pub mod password;
pub mod role;

pub use context::AuthContext;
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenValidationResult};
pub use password::{hash_password, validate_password_pair, verify_password};
pub use role::{MarksCapability, Role};
