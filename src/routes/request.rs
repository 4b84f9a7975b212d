//! Request and response plumbing shared by the role surfaces
//!
//! Every reply uses one envelope: `{"success": bool, "message": String, ...}`
//! with the payload under its own key.

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::types::{ErrorCategory, PortalError};

/// A fully read HTTP request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub auth_header: Option<String>,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            auth_header: None,
            body: Bytes::new(),
        }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.auth_header = Some(format!("Bearer {token}"));
        self
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self
    }

    /// Path segments after the leading slash
    pub fn segments(&self) -> Vec<&str> {
        self.path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// First value of a query parameter, URL-decoded
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key != name {
                return None;
            }
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|v| v.into_owned())
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PortalError> {
        if self.body.is_empty() {
            return Err(PortalError::Validation("Request body is required!".into()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| PortalError::Validation(format!("Invalid request body: {e}")))
    }
}

/// Body carrying `{"contract": {...}}`
#[derive(Debug, Deserialize)]
pub struct ContractEnvelope<T> {
    pub contract: T,
}

/// Body carrying `{"panel": {...}}`
#[derive(Debug, Deserialize)]
pub struct PanelEnvelope<T> {
    pub panel: T,
}

/// Body carrying `{"user": {...}}`
#[derive(Debug, Deserialize)]
pub struct UserEnvelope<T> {
    pub user: T,
}

/// A contract reference
#[derive(Debug, Deserialize)]
pub struct IdBody {
    pub id: String,
}

pub fn parse_id(raw: &str) -> Result<ObjectId, PortalError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| PortalError::Validation("Invalid id!".into()))
}

pub fn parse_ids(raw: &[String]) -> Result<Vec<ObjectId>, PortalError> {
    raw.iter().map(|id| parse_id(id)).collect()
}

/// Success reply under construction
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    body: Map<String, Value>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, message)
    }

    pub fn created(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CREATED, message)
    }

    fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(true));
        body.insert("message".into(), Value::String(message.into()));
        Self { status, body }
    }

    /// Attach a payload under `key`
    pub fn with<T: Serialize>(mut self, key: &str, value: &T) -> Result<Self, PortalError> {
        let value = serde_json::to_value(value)
            .map_err(|e| PortalError::Internal(format!("serialize {key}: {e}")))?;
        self.body.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        json_response(self.status, &Value::Object(self.body))
    }
}

/// Result type of every route handler
pub type RouteResult = Result<Reply, PortalError>;

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Render an error as the failure envelope, logging by category
pub fn error_response(err: PortalError) -> Response<Full<Bytes>> {
    match err.category() {
        ErrorCategory::Internal => error!("Request failed: {}", err),
        ErrorCategory::StateConflict => warn!("Request rejected: {}", err),
        _ => {}
    }

    let (status, message) = err.into_status_code_and_body();
    json_response(
        status,
        &serde_json::json!({ "success": false, "message": message }),
    )
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "success": false,
            "message": format!("No route for {path}"),
        }),
    )
}

pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_decoding() {
        let req = ApiRequest::new(Method::GET, "/student/requests?acceptance_status=NOT_RESPONDED&x=a%20b");
        assert_eq!(req.path, "/student/requests");
        assert_eq!(
            req.query_param("acceptance_status").as_deref(),
            Some("NOT_RESPONDED")
        );
        assert_eq!(req.query_param("x").as_deref(), Some("a b"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn test_segments() {
        let req = ApiRequest::new(Method::GET, "/admin/student/abc/request/");
        assert_eq!(req.segments(), vec!["admin", "student", "abc", "request"]);
    }

    #[test]
    fn test_reply_envelope() {
        let reply = Reply::created("Task assigned")
            .with("task", &serde_json::json!({ "id": "1" }))
            .unwrap();
        assert_eq!(reply.status(), StatusCode::CREATED);
        assert_eq!(reply.body()["success"], true);
        assert_eq!(reply.body()["task"]["id"], "1");
    }

    #[test]
    fn test_error_envelope_hides_internal_detail() {
        let response = error_response(PortalError::Database("connection reset".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = error_response(PortalError::NotFound("Entity does not exist!".into()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_parse_id() {
        let id = ObjectId::new();
        assert_eq!(parse_id(&id.to_hex()).unwrap(), id);
        assert!(matches!(parse_id("nope"), Err(PortalError::Validation(_))));
    }
}
