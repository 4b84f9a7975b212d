//! Health check endpoints
//!
//! - /health, /healthz - liveness, always 200 while the process serves
//! - /version - build information captured by `build.rs`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::routes::request::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    pub timestamp: String,
    /// `development` or `production`
    pub mode: &'static str,
    /// Backing store, `mongodb` or `memory`
    pub store: &'static str,
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        store: state.store_kind,
    };

    json_response(StatusCode::OK, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "fyp-portal",
    };

    json_response(StatusCode::OK, &response)
}
