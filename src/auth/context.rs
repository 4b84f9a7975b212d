//! Per-request caller identity
//!
//! Built from the bearer token and the stored user. The stored role must match
//! the role the token was issued for.

use bson::oid::ObjectId;
use tracing::debug;

use crate::auth::{extract_token_from_header, JwtValidator, Role};
use crate::db::schemas::UserDoc;
use crate::db::PortalStore;
use crate::types::PortalError;

/// Caller identity and role
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub identity: ObjectId,
    pub role: Role,
    pub name: String,
    pub email: String,
    /// Registration ID (students only)
    pub student_id: Option<String>,
    pub department: Option<String>,
}

impl AuthContext {
    pub fn from_user(user: &UserDoc) -> Result<Self, PortalError> {
        let identity = user
            ._id
            .ok_or_else(|| PortalError::Internal("stored user has no id".into()))?;

        Ok(Self {
            identity,
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
            student_id: user.student_id.clone(),
            department: user.department.clone(),
        })
    }

    /// Resolve the caller from an `Authorization` header
    pub async fn resolve(
        store: &dyn PortalStore,
        jwt: &JwtValidator,
        auth_header: Option<&str>,
    ) -> Result<Self, PortalError> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| PortalError::Auth("Missing bearer token".into()))?;

        let claims = jwt.verify_token(token).into_claims()?;

        let identity = ObjectId::parse_str(&claims.sub)
            .map_err(|_| PortalError::Auth("Malformed subject".into()))?;

        let user = store
            .find_user(&identity)
            .await?
            .ok_or_else(|| PortalError::Auth("User no longer exists".into()))?;

        if user.role != claims.role {
            debug!(user = %identity, token_role = %claims.role, "role changed since token issue");
            return Err(PortalError::Auth("Role mismatch".into()));
        }

        Self::from_user(&user)
    }

    /// Fail unless the caller holds `role`
    pub fn require(&self, role: Role) -> Result<(), PortalError> {
        self.require_any(&[role])
    }

    /// Fail unless the caller holds one of `roles`
    pub fn require_any(&self, roles: &[Role]) -> Result<(), PortalError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(PortalError::Unauthorized("Unauthorized Access!".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn validator() -> JwtValidator {
        JwtValidator::new("context-test-secret-of-at-least-32-chars".into(), 600).unwrap()
    }

    async fn seeded(role: Role) -> (MemoryStore, ObjectId) {
        let store = MemoryStore::new();
        let id = store
            .insert_user(UserDoc::new(
                "Dr. Rana".into(),
                "rana@uni.edu".into(),
                "hash".into(),
                role,
            ))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_resolve_valid_token() {
        let (store, id) = seeded(Role::Advisor).await;
        let jwt = validator();
        let token = jwt.generate_token(&id.to_hex(), Role::Advisor).unwrap();
        let header = format!("Bearer {token}");

        let ctx = AuthContext::resolve(&store, &jwt, Some(&header))
            .await
            .unwrap();
        assert_eq!(ctx.identity, id);
        assert_eq!(ctx.role, Role::Advisor);
        assert!(ctx.require(Role::Advisor).is_ok());
        assert!(matches!(
            ctx.require(Role::Admin),
            Err(PortalError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_role_mismatch() {
        let (store, id) = seeded(Role::Panel).await;
        let jwt = validator();
        let token = jwt.generate_token(&id.to_hex(), Role::Admin).unwrap();
        let header = format!("Bearer {token}");

        let err = AuthContext::resolve(&store, &jwt, Some(&header))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Auth(_)));
        assert_eq!(err.public_message(), "Unauthorized Access!");
    }

    #[tokio::test]
    async fn test_resolve_missing_header() {
        let (store, _) = seeded(Role::Student).await;
        let err = AuthContext::resolve(&store, &validator(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Auth(_)));
    }

    #[tokio::test]
    async fn test_resolve_unknown_user() {
        let store = MemoryStore::new();
        let jwt = validator();
        let token = jwt
            .generate_token(&ObjectId::new().to_hex(), Role::Student)
            .unwrap();
        let header = format!("Bearer {token}");
        assert!(AuthContext::resolve(&store, &jwt, Some(&header))
            .await
            .is_err());
    }
}
