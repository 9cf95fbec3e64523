//! Axum-based admission server.
//!
//! [`AdmissionServer`] runs every inbound request through the filter
//! pipeline (access log + validator gate) and answers with the decision.
//! It is meant to sit behind a proxy's forward-auth hook: when the proxy
//! sends `X-Forwarded-Method` / `X-Forwarded-Uri`, those describe the
//! request being admitted.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check with the live generation; `503` once released. |
//! | `ANY`  | *anything else* | Admission decision: `200` or the rejection status. |

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::filter::{FilterPipeline, LoggingFilter};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_kernel::gateway::{
    FilterAction, GatewayContext, GatewayFilter, GatewayRequest, GatewayResponse, HttpMethod,
};
use vigil_validator::{Gate, GateState, ValidatorFilter};

const FORWARDED_METHOD: &str = "x-forwarded-method";
const FORWARDED_URI: &str = "x-forwarded-uri";
const REQUEST_ID: &str = "x-request-id";

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    gate: Arc<Gate>,
    pipeline: Arc<FilterPipeline>,
}

// ─────────────────────────────────────────────────────────────────────────────
// AdmissionServer
// ─────────────────────────────────────────────────────────────────────────────

pub struct AdmissionServer {
    config: ServerConfig,
    gate: Arc<Gate>,
}

impl AdmissionServer {
    pub fn new(config: ServerConfig, gate: Arc<Gate>) -> Self {
        Self { config, gate }
    }

    /// Build the axum [`Router`].  Call [`start()`](Self::start) to bind and
    /// serve.
    pub fn build_app(&self) -> Result<Router, ServerError> {
        let mut validator = ValidatorFilter::new(Arc::clone(&self.gate));
        if let Some(budget) = self.config.eval_budget {
            validator = validator.with_budget(budget);
        }
        let filters: Vec<Arc<dyn GatewayFilter>> =
            vec![Arc::new(LoggingFilter::new()), Arc::new(validator)];

        let state = AppState {
            gate: Arc::clone(&self.gate),
            pipeline: Arc::new(FilterPipeline::new(filters)?),
        };

        Ok(Router::new()
            .route("/health", get(health_handler))
            .fallback(admission_handler)
            .with_state(state))
    }

    /// Bind to `0.0.0.0:{port}` and serve until `shutdown` resolves.
    pub async fn start(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let app = self.build_app()?;
        let addr = format!("0.0.0.0:{}", self.config.port);
        info!(addr = %addr, generation = ?self.gate.generation(), "Vigil admission server starting");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.gate.state() {
        GateState::Live { generation } => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "generation": generation })),
        ),
        GateState::Released => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "released" })),
        ),
    }
}

/// Catch-all admission handler.
async fn admission_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(req) = build_request(&method, &uri, &headers, body) else {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": { "code": 405, "message": "Method Not Allowed" } })),
        )
            .into_response();
    };
    let request_id = req.id.clone();
    let mut ctx = GatewayContext::new(req);

    let mut resp = match state.pipeline.run_request(&mut ctx).await {
        Ok(FilterAction::Continue) => GatewayResponse::new(200).with_body(
            json!({ "status": "admitted", "requestId": request_id })
                .to_string()
                .into_bytes(),
        ),
        Ok(FilterAction::Reject(status, message)) => GatewayResponse::new(status).with_body(
            json!({ "error": { "code": status, "message": message } })
                .to_string()
                .into_bytes(),
        ),
        Ok(FilterAction::Redirect(location)) => {
            GatewayResponse::new(307).with_header("location", location)
        }
        // FilterAction is #[non_exhaustive]; unknown actions refuse the request.
        Ok(_) => GatewayResponse::new(403),
        Err(e) => return ServerError::from(e).into_response(),
    };

    if let Err(err) = state.pipeline.run_response(&ctx, &mut resp).await {
        warn!(
            request_id = %request_id,
            error = %err,
            "response filter pipeline error (decision still returned)"
        );
    }

    build_axum_response(resp.with_header(REQUEST_ID, request_id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Translate the inbound HTTP request into a [`GatewayRequest`].
///
/// Returns `None` for methods the kernel does not model.
fn build_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Option<GatewayRequest> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let method = match header(FORWARDED_METHOD) {
        Some(forwarded) => HttpMethod::from_str_ci(forwarded)?,
        None => HttpMethod::from_str_ci(method.as_str())?,
    };
    let target = header(FORWARDED_URI)
        .map(str::to_string)
        .unwrap_or_else(|| {
            uri.path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string())
        });
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target, None),
    };

    let id = header(REQUEST_ID)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut req = GatewayRequest::new(id, path, method);
    if let Some(query) = query {
        req = req.with_query(query);
    }
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            req = req.append_header(name.as_str(), v);
        }
    }
    Some(req.with_body(body.to_vec()))
}

fn build_axum_response(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, resp.body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("application/json"),
    );
    for (k, v) in &resp.headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::try_from(k.as_str()),
            axum::http::HeaderValue::from_str(v),
        ) {
            headers.insert(name, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_headers_describe_the_admitted_request() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_METHOD, "post".parse().unwrap());
        headers.insert(FORWARDED_URI, "/v1/orders?b=2&a=1".parse().unwrap());
        headers.insert(REQUEST_ID, "abc".parse().unwrap());

        let req = build_request(&Method::GET, &"/auth".parse().unwrap(), &headers, Bytes::new())
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "/v1/orders");
        assert_eq!(req.query.as_deref(), Some("b=2&a=1"));
        assert_eq!(req.id, "abc");
    }

    #[test]
    fn plain_requests_use_their_own_line() {
        let req = build_request(
            &Method::DELETE,
            &"/items/7".parse().unwrap(),
            &HeaderMap::new(),
            Bytes::from_static(b"x"),
        )
        .unwrap();
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.path, "/items/7");
        assert_eq!(req.query, None);
        assert_eq!(req.body, b"x");
        assert!(!req.id.is_empty());
    }

    #[test]
    fn repeated_headers_keep_every_value() {
        let mut headers = HeaderMap::new();
        headers.append("x-api-key", "k1".parse().unwrap());
        headers.append("x-api-key", "k2".parse().unwrap());

        let req = build_request(&Method::GET, &"/".parse().unwrap(), &headers, Bytes::new())
            .unwrap();
        assert_eq!(req.header("x-api-key"), Some("k1, k2"));
    }

    #[test]
    fn unknown_methods_are_refused() {
        assert!(build_request(&Method::TRACE, &"/".parse().unwrap(), &HeaderMap::new(), Bytes::new()).is_none());
    }
}
