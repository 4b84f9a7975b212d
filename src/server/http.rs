//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Bodies are read in full
//! (up to `MAX_BODY_BYTES`) before routing.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthContext, JwtValidator, Role};
use crate::config::Args;
use crate::db::PortalStore;
use crate::logging::AuditLogger;
use crate::routes::{self, ApiRequest};
use crate::services::{
    AccountService, ContractService, LogformService, MarksService, PanelService,
};
use crate::types::PortalError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn PortalStore>,
    /// `mongodb` or `memory`
    pub store_kind: &'static str,
    pub jwt: Arc<JwtValidator>,
    pub audit: AuditLogger,
    pub accounts: AccountService,
    pub contracts: ContractService,
    pub panels: PanelService,
    pub marks: MarksService,
    pub logform: LogformService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn PortalStore>,
        store_kind: &'static str,
        jwt: JwtValidator,
        audit: AuditLogger,
    ) -> Self {
        let jwt = Arc::new(jwt);
        Self {
            accounts: AccountService::new(Arc::clone(&store), Arc::clone(&jwt)),
            contracts: ContractService::new(Arc::clone(&store)),
            panels: PanelService::new(Arc::clone(&store)),
            marks: MarksService::new(Arc::clone(&store)),
            logform: LogformService::new(Arc::clone(&store)),
            args,
            store,
            store_kind,
            jwt,
            audit,
            started_at: Instant::now(),
        }
    }

    /// Resolve the caller from the bearer token
    pub async fn authenticate(&self, req: &ApiRequest) -> Result<AuthContext, PortalError> {
        AuthContext::resolve(self.store.as_ref(), &self.jwt, req.auth_header.as_deref()).await
    }

    /// Resolve the caller and require the surface role
    pub async fn authenticate_as(
        &self,
        req: &ApiRequest,
        role: Role,
    ) -> Result<AuthContext, PortalError> {
        let ctx = self.authenticate(req).await?;
        ctx.require(role)?;
        Ok(ctx)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), PortalError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "FYP portal listening on {} ({} store)",
        state.args.listen, state.store_kind
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory data and dev signing secret");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => routes::health_check(&state),
        (&Method::GET, "/version") => routes::version_info(),
        (&Method::OPTIONS, _) => routes::preflight_response(),
        _ => match read_request(req, state.args.max_body_bytes).await {
            Ok(api) => routes::dispatch(&state, &api).await,
            Err(response) => response,
        },
    };

    debug!("[{}] {} {} -> {}", addr, method, path, response.status());
    Ok(response)
}

/// Read the body under the size limit and capture what routing needs
async fn read_request(
    req: Request<Incoming>,
    max_body_bytes: usize,
) -> Result<ApiRequest, Response<Full<Bytes>>> {
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(routes::json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &serde_json::json!({ "success": false, "message": "Request body too large" }),
            ));
        }
        Err(e) => {
            return Err(routes::error_response(PortalError::Http(format!(
                "Failed to read body: {e}"
            ))));
        }
    };

    Ok(ApiRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        auth_header: parts
            .headers
            .get(hyper::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    })
}
