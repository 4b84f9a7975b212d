//! Handlers shared across role surfaces
//!
//! Signup and signin exist once per role; the panel view and the evaluator
//! marks routes are served to both advisors and panel members.

use serde::Deserialize;

use crate::auth::Role;
use crate::db::schemas::MarksChannel;
use crate::logging::{AuditEvent, Operation};
use crate::routes::request::{
    parse_id, ApiRequest, ContractEnvelope, Reply, RouteResult, UserEnvelope,
};
use crate::server::AppState;
use crate::services::{SigninRequest, SignupRequest};
use crate::types::PortalError;

/// `{"contract": {"id", "marks": {<channel>: value}}}`
#[derive(Debug, Deserialize)]
pub struct MarksBody {
    pub id: String,
    #[serde(default)]
    pub marks: MarksInput,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarksInput {
    pub admin: Option<f64>,
    pub advisor: Option<f64>,
    pub mid: Option<f64>,
    #[serde(rename = "final")]
    pub final_: Option<f64>,
}

impl MarksInput {
    pub fn value(&self, channel: MarksChannel) -> Result<f64, PortalError> {
        let value = match channel {
            MarksChannel::Admin => self.admin,
            MarksChannel::Advisor => self.advisor,
            MarksChannel::Mid => self.mid,
            MarksChannel::Final => self.final_,
        };
        value.ok_or_else(|| {
            PortalError::Validation(format!("Invalid marks! {} marks are missing", channel.name()))
        })
    }
}

pub fn rows_retrieved(count: usize) -> String {
    format!("{count} rows retreived!")
}

pub fn reachable(role: Role) -> RouteResult {
    Ok(Reply::ok(format!("{} routes are reachable", role.route_prefix())))
}

pub async fn signup(state: &AppState, req: &ApiRequest, role: Role) -> RouteResult {
    let body: UserEnvelope<SignupRequest> = req.json()?;
    let user = state.accounts.signup(role, body.user).await?;

    let mut event = AuditEvent::new(Operation::Signup).detail(serde_json::json!({ "role": role }));
    if let Some(id) = user._id {
        event = event.target(id.to_hex());
    }
    state.audit.log(event).await;

    Ok(Reply::ok("Successfully signed up!"))
}

pub async fn signin(state: &AppState, req: &ApiRequest, role: Role) -> RouteResult {
    let body: UserEnvelope<SigninRequest> = req.json()?;
    let token = state.accounts.signin(role, body.user).await?;
    Reply::ok("Successfully signed in!").with("token", &token)
}

/// `GET /user/profile`
pub async fn profile(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate(req).await?;
    let profile = state.accounts.profile(&ctx).await?;
    Reply::ok("Success").with("profile", &profile)
}

/// `GET /{advisor,panel}/panel`
pub async fn assigned_panel(state: &AppState, req: &ApiRequest, role: Role) -> RouteResult {
    let ctx = state.authenticate_as(req, role).await?;
    let panel = state.marks.assigned_panel(&ctx).await?;
    let message = match panel {
        Some(_) => "Panel retrieved!",
        None => "You are not in any panel!",
    };
    Reply::ok(message).with("panel", &panel)
}

/// `POST /{advisor,panel}/contract/{midmarks,finalmarks}`
pub async fn evaluator_marks(
    state: &AppState,
    req: &ApiRequest,
    role: Role,
    channel: MarksChannel,
) -> RouteResult {
    let ctx = state.authenticate_as(req, role).await?;
    let body: ContractEnvelope<MarksBody> = req.json()?;
    let id = parse_id(&body.contract.id)?;
    let value = body.contract.marks.value(channel)?;

    let operation = match channel {
        MarksChannel::Final => {
            state.marks.set_final_marks(&ctx, &id, value).await?;
            Operation::SetFinalMarks
        }
        _ => {
            state.marks.set_mid_marks(&ctx, &id, value).await?;
            Operation::SetMidMarks
        }
    };

    state
        .audit
        .log(
            AuditEvent::new(operation)
                .by(&ctx)
                .target(id.to_hex())
                .detail(serde_json::json!({ "marks": value })),
        )
        .await;

    Ok(Reply::ok("Marks updated successfully!"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_body_shape() {
        let body: ContractEnvelope<MarksBody> = serde_json::from_value(serde_json::json!({
            "contract": { "id": "abc", "marks": { "final": 31.5 } }
        }))
        .unwrap();

        assert_eq!(body.contract.marks.value(MarksChannel::Final).unwrap(), 31.5);
        assert!(matches!(
            body.contract.marks.value(MarksChannel::Mid),
            Err(PortalError::Validation(_))
        ));
    }

    #[test]
    fn test_rows_message() {
        assert_eq!(rows_retrieved(3), "3 rows retreived!");
    }
}
