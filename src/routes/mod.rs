//! HTTP routes for the portal
//!
//! One module per role surface. Each `handle` returns `None` when no route in
//! its surface matches, letting the dispatcher answer 404.

pub mod admin;
pub mod advisor;
pub mod common;
pub mod health;
pub mod panel;
pub mod request;
pub mod student;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response};

pub use health::{health_check, version_info};
pub use request::{
    error_response, json_response, not_found_response, preflight_response, ApiRequest, Reply,
    RouteResult,
};

use crate::server::AppState;

/// Route a fully read request to its surface
pub async fn dispatch(state: &AppState, req: &ApiRequest) -> Response<Full<Bytes>> {
    let surface = req.segments().first().copied().unwrap_or_default();

    let result = match surface {
        "student" => student::handle(state, req).await,
        "advisor" => advisor::handle(state, req).await,
        "panel" => panel::handle(state, req).await,
        "admin" => admin::handle(state, req).await,
        "user" if req.method == Method::GET && req.segments() == ["user", "profile"] => {
            Some(common::profile(state, req).await)
        }
        _ => None,
    };

    match result {
        Some(Ok(reply)) => reply.into_response(),
        Some(Err(err)) => error_response(err),
        None => not_found_response(&req.path),
    }
}
