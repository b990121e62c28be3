use std::{sync::Arc, time::Instant};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::Response,
    routing::any,
};
use eyre::{Result, WrapErr};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::{core::GatewayService, tracing_setup};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Decision endpoint: answers every request with the routing decision the
/// gateway would enforce for it.
#[derive(Clone)]
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>) -> Self {
        Self { gateway_service }
    }

    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let method = req.method().clone();
        let raw_path = req.uri().path().to_string();
        let span = tracing_setup::create_request_span(method.as_str(), &raw_path, &request_id);

        async move {
            let started = Instant::now();
            let mut response = match raw_path.as_str() {
                "/healthz" => self.handle_health_check()?,
                _ => self.handle_decision(&method, &raw_path, req.headers())?,
            };

            let current = tracing::Span::current();
            current.record("http.status_code", response.status().as_u16());
            current.record("duration_ms", started.elapsed().as_millis() as u64);

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            Ok::<_, eyre::Error>(response)
        }
        .instrument(span)
        .await
    }

    fn handle_health_check(&self) -> Result<Response<AxumBody>, eyre::Error> {
        let snapshot = self.gateway_service.snapshot();
        let health_data = serde_json::json!({
            "status": "ok",
            "service": snapshot.config().service_name,
            "generation": snapshot.generation(),
            "routes": snapshot.routes().len(),
            "rejected_rules": snapshot.rejected_rules().len(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        json_response(StatusCode::OK, &health_data)
    }

    fn handle_decision(
        &self,
        method: &Method,
        raw_path: &str,
        headers: &HeaderMap,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let path = match urlencoding::decode(raw_path) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(error = %e, "request path is not valid UTF-8 after decoding");
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &serde_json::json!({ "error": "malformed path encoding", "path": raw_path }),
                );
            }
        };

        let snapshot = self.gateway_service.snapshot();
        let Some(decision) = snapshot.decide(method, &path) else {
            tracing::debug!(%method, path = %path, "no route matched");
            return json_response(
                StatusCode::NOT_FOUND,
                &serde_json::json!({
                    "error": "no matching route",
                    "method": method.as_str(),
                    "path": path,
                    "generation": snapshot.generation(),
                }),
            );
        };
        tracing::Span::current().record("route.selector", decision.selector.as_str());

        let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
        if let (Some(cors), Some(origin)) = (snapshot.cors(), origin)
            && !cors.allows_origin(origin)
        {
            tracing::info!(origin, selector = %decision.selector, "origin rejected by CORS policy");
            return json_response(
                StatusCode::FORBIDDEN,
                &serde_json::json!({ "error": "origin not allowed", "origin": origin }),
            );
        }

        json_response(StatusCode::OK, &decision)
    }
}

fn json_response(
    status: StatusCode,
    body: &impl serde::Serialize,
) -> Result<Response<AxumBody>, eyre::Error> {
    let body = serde_json::to_vec(body).wrap_err("Failed to serialize response body")?;
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(body))
        .wrap_err("Failed to build response")
}

/// Axum router sending every path and method to `handler`.
pub fn router(handler: Arc<HttpHandler>) -> Router {
    let route = any(move |req: Request| {
        let handler = handler.clone();
        async move {
            match handler.handle_request(req).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = ?e, "request handling error");
                    let mut response = Response::new(AxumBody::from("Internal Server Error"));
                    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    response
                }
            }
        }
    });

    Router::new()
        .route("/", route.clone())
        .route("/{*path}", route)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
