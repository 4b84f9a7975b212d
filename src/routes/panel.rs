//! Panel member surface (`/panel/*`)
//!
//! - POST /panel/signup, /panel/signin
//! - GET  /panel/panel
//! - POST /panel/contract/midmarks, /panel/contract/finalmarks

use hyper::Method;

use crate::auth::Role;
use crate::db::schemas::MarksChannel;
use crate::routes::common;
use crate::routes::request::{ApiRequest, RouteResult};
use crate::server::AppState;

pub async fn handle(state: &AppState, req: &ApiRequest) -> Option<RouteResult> {
    let segments = req.segments();

    let result = match (&req.method, segments.as_slice()) {
        (&Method::GET, ["panel"]) => common::reachable(Role::Panel),
        (&Method::POST, ["panel", "signup"]) => common::signup(state, req, Role::Panel).await,
        (&Method::POST, ["panel", "signin"]) => common::signin(state, req, Role::Panel).await,
        (&Method::GET, ["panel", "panel"]) => common::assigned_panel(state, req, Role::Panel).await,
        (&Method::POST, ["panel", "contract", "midmarks"]) => {
            common::evaluator_marks(state, req, Role::Panel, MarksChannel::Mid).await
        }
        (&Method::POST, ["panel", "contract", "finalmarks"]) => {
            common::evaluator_marks(state, req, Role::Panel, MarksChannel::Final).await
        }
        _ => return None,
    };
    Some(result)
}
