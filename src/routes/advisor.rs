//! Advisor surface (`/advisor/*`)
//!
//! - POST   /advisor/signup, /advisor/signin
//! - POST   /advisor/accept/request, /reject/request, /close/request
//! - GET    /advisor/requests?acceptance_status=
//! - GET    /advisor/request/{id}, /advisor/form/{id}
//! - POST   /advisor/contract/marks
//! - GET    /advisor/panel
//! - POST   /advisor/contract/midmarks, /finalmarks
//! - POST   /advisor/contract/assign-task
//! - GET    /advisor/contract/get-tasks/{id}
//! - POST   /advisor/contract/sign-task/{id}
//! - DELETE /advisor/contract/task/{id}
//!
//! The `GET /advisor/contract/{sign,delete}-task/{id}` forms are still served
//! for older clients.

use hyper::Method;
use serde::Deserialize;

use crate::auth::Role;
use crate::db::schemas::MarksChannel;
use crate::logging::{AuditEvent, Operation};
use crate::routes::common::{self, rows_retrieved, MarksBody};
use crate::routes::request::{parse_id, ApiRequest, ContractEnvelope, IdBody, Reply, RouteResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignTaskBody {
    contract: IdBody,
    logform_entry: LogformEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogformEntry {
    #[serde(default)]
    task_assigned: String,
}

#[derive(Debug, Clone, Copy)]
enum Decision {
    Accept,
    Reject,
    Close,
}

pub async fn handle(state: &AppState, req: &ApiRequest) -> Option<RouteResult> {
    let segments = req.segments();

    let result = match (&req.method, segments.as_slice()) {
        (&Method::GET, ["advisor"]) => common::reachable(Role::Advisor),
        (&Method::POST, ["advisor", "signup"]) => common::signup(state, req, Role::Advisor).await,
        (&Method::POST, ["advisor", "signin"]) => common::signin(state, req, Role::Advisor).await,
        (&Method::POST, ["advisor", "accept", "request"]) => {
            respond(state, req, Decision::Accept).await
        }
        (&Method::POST, ["advisor", "reject", "request"]) => {
            respond(state, req, Decision::Reject).await
        }
        (&Method::POST, ["advisor", "close", "request"]) => {
            respond(state, req, Decision::Close).await
        }
        (&Method::GET, ["advisor", "requests"]) => requests(state, req).await,
        (&Method::GET, ["advisor", "request", id]) => request(state, req, id).await,
        (&Method::GET, ["advisor", "form", id]) => advisor_form(state, req, id).await,
        (&Method::POST, ["advisor", "contract", "marks"]) => advisor_marks(state, req).await,
        (&Method::GET, ["advisor", "panel"]) => {
            common::assigned_panel(state, req, Role::Advisor).await
        }
        (&Method::POST, ["advisor", "contract", "midmarks"]) => {
            common::evaluator_marks(state, req, Role::Advisor, MarksChannel::Mid).await
        }
        (&Method::POST, ["advisor", "contract", "finalmarks"]) => {
            common::evaluator_marks(state, req, Role::Advisor, MarksChannel::Final).await
        }
        (&Method::POST, ["advisor", "contract", "assign-task"]) => assign_task(state, req).await,
        (&Method::GET, ["advisor", "contract", "get-tasks", id]) => tasks(state, req, id).await,
        (&Method::POST, ["advisor", "contract", "sign-task", id])
        | (&Method::GET, ["advisor", "contract", "sign-task", id]) => {
            sign_task(state, req, id).await
        }
        (&Method::DELETE, ["advisor", "contract", "task", id])
        | (&Method::GET, ["advisor", "contract", "delete-task", id]) => {
            delete_task(state, req, id).await
        }
        _ => return None,
    };
    Some(result)
}

async fn respond(state: &AppState, req: &ApiRequest, decision: Decision) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let body: ContractEnvelope<IdBody> = req.json()?;
    let id = parse_id(&body.contract.id)?;

    let (operation, message) = match decision {
        Decision::Accept => {
            state.contracts.accept(&ctx, &id).await?;
            (Operation::AcceptRequest, "Request accepted successfully!")
        }
        Decision::Reject => {
            state.contracts.reject(&ctx, &id).await?;
            (Operation::RejectRequest, "Request rejected successfully!")
        }
        Decision::Close => {
            state.contracts.close(&ctx, &id).await?;
            (Operation::CloseRequest, "Request closed successfully!")
        }
    };

    state
        .audit
        .log(AuditEvent::new(operation).by(&ctx).target(id.to_hex()))
        .await;
    Ok(Reply::ok(message))
}

async fn requests(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let status = req.query_param("acceptance_status").unwrap_or_default();
    let requests = state.contracts.requests(&ctx, &status).await?;
    Reply::ok(rows_retrieved(requests.len())).with("requests", &requests)
}

async fn request(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let request = state.contracts.request(&ctx, &parse_id(id)?).await?;
    Reply::ok("Success").with("request", &request)
}

async fn advisor_form(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let form = state.contracts.advisor_form(&ctx, &parse_id(id)?).await?;
    Reply::ok("Success").with("contract", &form)
}

async fn advisor_marks(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let body: ContractEnvelope<MarksBody> = req.json()?;
    let id = parse_id(&body.contract.id)?;
    let value = body.contract.marks.value(MarksChannel::Advisor)?;

    state.marks.set_advisor_marks(&ctx, &id, value).await?;
    state
        .audit
        .log(
            AuditEvent::new(Operation::SetAdvisorMarks)
                .by(&ctx)
                .target(id.to_hex())
                .detail(serde_json::json!({ "marks": value })),
        )
        .await;

    Ok(Reply::ok("Marks updated successfully!"))
}

async fn assign_task(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let body: AssignTaskBody = req.json()?;
    let contract = parse_id(&body.contract.id)?;

    let task = state
        .logform
        .assign_task(&ctx, &contract, &body.logform_entry.task_assigned)
        .await?;
    state
        .audit
        .log(
            AuditEvent::new(Operation::AssignTask)
                .by(&ctx)
                .target(task.id.clone())
                .detail(serde_json::json!({ "contract": contract.to_hex() })),
        )
        .await;

    Reply::created("Task assigned successfully!").with("task", &task)
}

async fn tasks(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let tasks = state.logform.list_tasks(&ctx, &parse_id(id)?).await?;
    Reply::ok(rows_retrieved(tasks.len())).with("tasks", &tasks)
}

async fn sign_task(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let id = parse_id(id)?;

    let task = state.logform.toggle_sign(&ctx, &id).await?;
    state
        .audit
        .log(
            AuditEvent::new(Operation::ToggleTaskSign)
                .by(&ctx)
                .target(id.to_hex())
                .detail(serde_json::json!({ "signed": task.advisor_signed })),
        )
        .await;

    Reply::ok("Task sign status updated!").with("task", &task)
}

async fn delete_task(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Advisor).await?;
    let id = parse_id(id)?;

    state.logform.delete_task(&ctx, &id).await?;
    state
        .audit
        .log(AuditEvent::new(Operation::DeleteTask).by(&ctx).target(id.to_hex()))
        .await;

    Ok(Reply::ok("Task deleted successfully!"))
}
