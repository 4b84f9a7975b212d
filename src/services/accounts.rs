//! Accounts: signup, signin, profile and user listings
//!
//! Every role signs up and in on its own surface. A user can only sign in on
//! the surface matching the role stored at signup.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{
    hash_password, validate_password_pair, verify_password, AuthContext, JwtValidator, Role,
};
use crate::db::schemas::UserDoc;
use crate::db::PortalStore;
use crate::services::views::{ProfileView, UserSummary};
use crate::types::PortalError;

const SIGNUP_TAKEN: &str = "Error signing up! Email or registration ID is already in use.";

/// Signup form
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    /// University registration ID, students only
    #[serde(rename = "ID", default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub struct AccountService {
    store: Arc<dyn PortalStore>,
    jwt: Arc<JwtValidator>,
}

impl AccountService {
    pub fn new(store: Arc<dyn PortalStore>, jwt: Arc<JwtValidator>) -> Self {
        Self { store, jwt }
    }

    /// Register a user with the role of the surface the request came in on
    pub async fn signup(&self, role: Role, req: SignupRequest) -> Result<UserDoc, PortalError> {
        let name = non_blank(Some(req.name.as_str()))
            .ok_or_else(|| PortalError::Validation("Name must be entered!".into()))?;
        let email = non_blank(Some(req.email.as_str()))
            .ok_or_else(|| PortalError::Validation("Email must be entered!".into()))?
            .to_lowercase();

        validate_password_pair(&req.password, &req.confirm_password)?;

        let student_id = non_blank(req.student_id.as_deref());
        let department = non_blank(req.department.as_deref());

        let mut user = UserDoc::new(name.to_string(), email.clone(), String::new(), role)
            .with_gender(req.gender.clone());

        match role {
            Role::Student => {
                let sid = student_id.ok_or_else(|| {
                    PortalError::Validation(
                        "Student must enter his/her registration ID provided by the university! Enter correct ID as it cannot be modified later".into(),
                    )
                })?;
                if self.store.find_user_by_student_id(sid).await?.is_some() {
                    return Err(PortalError::Validation(SIGNUP_TAKEN.into()));
                }
                user = user.with_student_id(sid);
            }
            Role::Advisor => {
                let dept = department.ok_or_else(|| {
                    PortalError::Validation("Advisor must enter his/her department!".into())
                })?;
                user = user.with_department(dept);
            }
            Role::Panel => {
                if let Some(dept) = department {
                    user = user.with_department(dept);
                }
            }
            Role::Admin => {}
        }

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(PortalError::Validation(SIGNUP_TAKEN.into()));
        }

        user.password_hash = hash_password(&req.password)?;

        // A concurrent signup can still hit the unique indexes
        let id = self.store.insert_user(user.clone()).await.map_err(|e| match e {
            PortalError::Database(msg) if msg.contains("duplicate key") => {
                PortalError::Validation(SIGNUP_TAKEN.into())
            }
            other => other,
        })?;
        user._id = Some(id);

        info!(user = %id, role = %role, "user signed up");
        Ok(user)
    }

    /// Check credentials and issue a token for the surface role
    pub async fn signin(&self, role: Role, req: SigninRequest) -> Result<String, PortalError> {
        let user = self
            .store
            .find_user_by_email(&req.email.trim().to_lowercase())
            .await?
            .ok_or_else(|| PortalError::NotFound("User does not exist!".into()))?;

        if user.role != role {
            debug!(email = %user.email, stored = %user.role, surface = %role, "signin on wrong surface");
            return Err(PortalError::Unauthorized("Unauthorized Access!".into()));
        }

        // A corrupt stored hash is a failed login, not a server error
        let verified = verify_password(&req.password, &user.password_hash).unwrap_or(false);
        if !verified {
            return Err(PortalError::Unauthorized("Incorrect Credentials!".into()));
        }

        let id = user
            ._id
            .ok_or_else(|| PortalError::Internal("stored user has no id".into()))?;
        let token = self.jwt.generate_token(&id.to_hex(), role)?;

        info!(user = %id, role = %role, "user signed in");
        Ok(token)
    }

    pub async fn profile(&self, ctx: &AuthContext) -> Result<ProfileView, PortalError> {
        let user = self
            .store
            .find_user(&ctx.identity)
            .await?
            .ok_or_else(|| PortalError::NotFound("User does not exist!".into()))?;
        Ok(ProfileView::from(&user))
    }

    /// Every advisor with their department
    pub async fn advisors(&self, ctx: &AuthContext) -> Result<Vec<UserSummary>, PortalError> {
        ctx.require_any(&[Role::Student, Role::Admin])?;
        Ok(self
            .store
            .list_users_by_role(Role::Advisor)
            .await?
            .iter()
            .map(UserSummary::staff)
            .collect())
    }

    /// Every student with their registration ID
    pub async fn students(&self, ctx: &AuthContext) -> Result<Vec<UserSummary>, PortalError> {
        ctx.require(Role::Admin)?;
        Ok(self
            .store
            .list_users_by_role(Role::Student)
            .await?
            .iter()
            .map(UserSummary::student)
            .collect())
    }
}
