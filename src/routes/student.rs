//! Student surface (`/student/*`)
//!
//! - POST /student/signup, /student/signin
//! - GET  /student/advisors
//! - POST /student/request/advisor
//! - POST /student/close/request
//! - GET  /student/requests?acceptance_status=
//! - GET  /student/request/{id}
//! - POST /student/form/advisor
//! - GET  /student/form/{id}
//! - GET  /student/panel/{id}
//! - GET  /student/contract/get-tasks/{id}

use hyper::Method;
use serde::Deserialize;

use crate::auth::Role;
use crate::db::schemas::{AdvisorFormDetails, Project, StudentSlot};
use crate::logging::{AuditEvent, Operation};
use crate::routes::common::{self, rows_retrieved};
use crate::routes::request::{parse_id, ApiRequest, ContractEnvelope, IdBody, Reply, RouteResult};
use crate::server::AppState;
use crate::services::views::ContractSummary;
use crate::services::NewContract;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestAdvisorBody {
    advisor: String,
    #[serde(default)]
    project: Project,
    student_one: StudentSlot,
    student_two: StudentSlot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvisorFormBody {
    id: String,
    #[serde(default)]
    advisor_form: AdvisorFormDetails,
}

/// Route a `/student/*` request; `None` if no route matches
pub async fn handle(state: &AppState, req: &ApiRequest) -> Option<RouteResult> {
    let segments = req.segments();

    let result = match (&req.method, segments.as_slice()) {
        (&Method::GET, ["student"]) => common::reachable(Role::Student),
        (&Method::POST, ["student", "signup"]) => common::signup(state, req, Role::Student).await,
        (&Method::POST, ["student", "signin"]) => common::signin(state, req, Role::Student).await,
        (&Method::GET, ["student", "advisors"]) => advisors(state, req).await,
        (&Method::POST, ["student", "request", "advisor"]) => request_advisor(state, req).await,
        (&Method::POST, ["student", "close", "request"]) => close_request(state, req).await,
        (&Method::GET, ["student", "requests"]) => requests(state, req).await,
        (&Method::GET, ["student", "request", id]) => request(state, req, id).await,
        (&Method::POST, ["student", "form", "advisor"]) => submit_form(state, req).await,
        (&Method::GET, ["student", "form", id]) => advisor_form(state, req, id).await,
        (&Method::GET, ["student", "panel", id]) => panel(state, req, id).await,
        (&Method::GET, ["student", "contract", "get-tasks", id]) => tasks(state, req, id).await,
        _ => return None,
    };
    Some(result)
}

async fn advisors(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let advisors = state.accounts.advisors(&ctx).await?;
    Reply::ok(rows_retrieved(advisors.len())).with("advisors", &advisors)
}

async fn request_advisor(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let body: ContractEnvelope<RequestAdvisorBody> = req.json()?;
    let body = body.contract;

    let contract = state
        .contracts
        .request_advisor(
            &ctx,
            NewContract {
                advisor: parse_id(&body.advisor)?,
                project: body.project,
                student_one: body.student_one,
                student_two: body.student_two,
            },
        )
        .await?;

    let mut event = AuditEvent::new(Operation::RequestAdvisor).by(&ctx);
    if let Some(id) = contract._id {
        event = event.target(id.to_hex());
    }
    state.audit.log(event).await;

    Reply::ok("Request successfully sent to the advisor")
        .with("contract", &ContractSummary::new(&contract, None, None))
}

async fn close_request(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let body: ContractEnvelope<IdBody> = req.json()?;
    let id = parse_id(&body.contract.id)?;

    state.contracts.close(&ctx, &id).await?;
    state
        .audit
        .log(AuditEvent::new(Operation::CloseRequest).by(&ctx).target(id.to_hex()))
        .await;

    Ok(Reply::ok("Request closed successfully!"))
}

async fn requests(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let status = req.query_param("acceptance_status").unwrap_or_default();
    let requests = state.contracts.requests(&ctx, &status).await?;
    Reply::ok(rows_retrieved(requests.len())).with("requests", &requests)
}

async fn request(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let request = state.contracts.request(&ctx, &parse_id(id)?).await?;
    Reply::ok("Success").with("request", &request)
}

async fn submit_form(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let body: ContractEnvelope<AdvisorFormBody> = req.json()?;
    let id = parse_id(&body.contract.id)?;

    state
        .contracts
        .submit_advisor_form(&ctx, &id, body.contract.advisor_form)
        .await?;
    state
        .audit
        .log(AuditEvent::new(Operation::SubmitAdvisorForm).by(&ctx).target(id.to_hex()))
        .await;

    Ok(Reply::ok("Successfully submitted advisor form!"))
}

async fn advisor_form(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let form = state.contracts.advisor_form(&ctx, &parse_id(id)?).await?;
    Reply::ok("Success").with("contract", &form)
}

async fn panel(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let panel = state.marks.student_panel(&ctx, &parse_id(id)?).await?;
    let message = match panel {
        Some(_) => "Panel retrieved!",
        None => "Your project is not assigned to any panel yet!",
    };
    Reply::ok(message).with("panel", &panel)
}

async fn tasks(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Student).await?;
    let tasks = state.logform.list_tasks(&ctx, &parse_id(id)?).await?;
    Reply::ok(rows_retrieved(tasks.len())).with("tasks", &tasks)
}
