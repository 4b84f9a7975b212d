//! Admin surface (`/admin/*`)
//!
//! - POST /admin/signup, /admin/signin
//! - GET  /admin/advisors, /admin/students
//! - GET  /admin/advisor/{id}, /admin/student/{id}/request
//! - GET  /admin/contracts, /admin/contractsnotinpanel
//! - GET  /admin/listforpanel
//! - POST /admin/panel, GET /admin/panel/{id}, GET /admin/panels
//! - POST /admin/close/panel, /admin/panel/addcontracts
//! - POST /admin/contract/marks

use hyper::Method;
use serde::Deserialize;

use crate::auth::Role;
use crate::db::schemas::MarksChannel;
use crate::logging::{AuditEvent, Operation};
use crate::routes::common::{self, rows_retrieved, MarksBody};
use crate::routes::request::{
    parse_id, parse_ids, ApiRequest, ContractEnvelope, PanelEnvelope, Reply, RouteResult,
};
use crate::server::AppState;
use crate::services::views::PanelSummary;

#[derive(Debug, Deserialize)]
struct CreatePanelBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    members: Vec<String>,
}

/// Member ids may be sent along; the stored member set is what gets released
#[derive(Debug, Deserialize)]
struct ClosePanelBody {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AddContractsBody {
    id: String,
    #[serde(default)]
    contracts: Vec<String>,
}

pub async fn handle(state: &AppState, req: &ApiRequest) -> Option<RouteResult> {
    let segments = req.segments();

    let result = match (&req.method, segments.as_slice()) {
        (&Method::GET, ["admin"]) => common::reachable(Role::Admin),
        (&Method::POST, ["admin", "signup"]) => common::signup(state, req, Role::Admin).await,
        (&Method::POST, ["admin", "signin"]) => common::signin(state, req, Role::Admin).await,
        (&Method::GET, ["admin", "advisors"]) => advisors(state, req).await,
        (&Method::GET, ["admin", "students"]) => students(state, req).await,
        (&Method::GET, ["admin", "advisor", id]) => advisor_details(state, req, id).await,
        (&Method::GET, ["admin", "student", id, "request"]) => {
            student_request(state, req, id).await
        }
        (&Method::GET, ["admin", "contracts"]) => contracts(state, req, false).await,
        (&Method::GET, ["admin", "contractsnotinpanel"]) => contracts(state, req, true).await,
        (&Method::GET, ["admin", "listforpanel"]) => eligible_staff(state, req).await,
        (&Method::POST, ["admin", "panel"]) => create_panel(state, req).await,
        (&Method::GET, ["admin", "panel", id]) => panel_details(state, req, id).await,
        (&Method::GET, ["admin", "panels"]) => panels(state, req).await,
        (&Method::POST, ["admin", "close", "panel"]) => close_panel(state, req).await,
        (&Method::POST, ["admin", "panel", "addcontracts"]) => add_contracts(state, req).await,
        (&Method::POST, ["admin", "contract", "marks"]) => admin_marks(state, req).await,
        _ => return None,
    };
    Some(result)
}

async fn advisors(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let advisors = state.accounts.advisors(&ctx).await?;
    Reply::ok(rows_retrieved(advisors.len())).with("advisors", &advisors)
}

async fn students(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let students = state.accounts.students(&ctx).await?;
    Reply::ok(rows_retrieved(students.len())).with("students", &students)
}

async fn advisor_details(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let contracts = state.contracts.advisor_details(&ctx, &parse_id(id)?).await?;
    Reply::ok(rows_retrieved(contracts.len())).with("contracts", &contracts)
}

async fn student_request(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let request = state.contracts.student_request(&ctx, &parse_id(id)?).await?;
    Reply::ok("Success").with("request", &request)
}

async fn contracts(state: &AppState, req: &ApiRequest, not_in_panel: bool) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let contracts = if not_in_panel {
        state.contracts.contracts_not_in_panel(&ctx).await?
    } else {
        state.contracts.all_contracts(&ctx).await?
    };
    Reply::ok(rows_retrieved(contracts.len())).with("contracts", &contracts)
}

async fn eligible_staff(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let staff = state.panels.eligible_staff(&ctx).await?;
    Reply::ok(rows_retrieved(staff.len())).with("staff", &staff)
}

async fn create_panel(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let body: PanelEnvelope<CreatePanelBody> = req.json()?;
    let members = parse_ids(&body.panel.members)?;

    let panel = state
        .panels
        .create_panel(&ctx, body.panel.name.as_deref(), &members)
        .await?;

    let summary = PanelSummary::from(&panel);
    state
        .audit
        .log(
            AuditEvent::new(Operation::CreatePanel)
                .by(&ctx)
                .target(summary.id.clone())
                .detail(serde_json::json!({ "members": body.panel.members })),
        )
        .await;

    Reply::ok("Panel created successfully").with("panel", &summary)
}

async fn panel_details(state: &AppState, req: &ApiRequest, id: &str) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let panel = state.panels.panel_details(&ctx, &parse_id(id)?).await?;
    Reply::ok("Success").with("panel", &panel)
}

async fn panels(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let panels = state.panels.open_panels(&ctx).await?;
    Reply::ok(rows_retrieved(panels.len())).with("panels", &panels)
}

async fn close_panel(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let body: PanelEnvelope<ClosePanelBody> = req.json()?;
    let id = parse_id(&body.panel.id)?;

    state.panels.close_panel(&ctx, &id).await?;
    state
        .audit
        .log(AuditEvent::new(Operation::ClosePanel).by(&ctx).target(id.to_hex()))
        .await;

    Ok(Reply::ok("Panel closed successfully!"))
}

async fn add_contracts(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let body: PanelEnvelope<AddContractsBody> = req.json()?;
    let id = parse_id(&body.panel.id)?;
    let contracts = parse_ids(&body.panel.contracts)?;

    let panel = state.panels.add_contracts(&ctx, &id, &contracts).await?;
    state
        .audit
        .log(
            AuditEvent::new(Operation::AssignContracts)
                .by(&ctx)
                .target(id.to_hex())
                .detail(serde_json::json!({ "contracts": body.panel.contracts })),
        )
        .await;

    Reply::ok("FYP Groups added successfully").with("panel", &PanelSummary::from(&panel))
}

async fn admin_marks(state: &AppState, req: &ApiRequest) -> RouteResult {
    let ctx = state.authenticate_as(req, Role::Admin).await?;
    let body: ContractEnvelope<MarksBody> = req.json()?;
    let id = parse_id(&body.contract.id)?;
    let value = body.contract.marks.value(MarksChannel::Admin)?;

    state.marks.set_admin_marks(&ctx, &id, value).await?;
    state
        .audit
        .log(
            AuditEvent::new(Operation::SetAdminMarks)
                .by(&ctx)
                .target(id.to_hex())
                .detail(serde_json::json!({ "marks": value })),
        )
        .await;

    Ok(Reply::ok("Marks updated successfully!"))
}
