//! HTTP control API: services, discovery lifecycle, events, metrics and
//! the model server passthrough.

use crate::metrics::MetricsRegistry;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use discovery::{DiscoveryController, DiscoveryError, DiscoveryState, ServiceRecord};
use futures::Stream;
use gateway::{GatewayError, OllamaClient};
use healthcheck::{PortRange, ServiceAddress};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DiscoveryController>,
    pub gateway: Arc<OllamaClient>,
    /// `None` when metrics are disabled
    pub metrics: Option<Arc<MetricsRegistry>>,
    /// Range used by `POST /discovery/start` when none is given
    pub ports: PortRange,
    pub stale_after: Duration,
}

impl AppState {
    fn record_registration(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_registration(result);
        }
    }

    fn record_gateway<T>(&self, operation: &str, outcome: &Result<T, GatewayError>) {
        if let Some(metrics) = &self.metrics {
            let result = match outcome {
                Ok(_) => "success",
                Err(e) => e.kind(),
            };
            metrics.record_gateway_request(operation, result);
        }
    }

    fn view(&self, record: ServiceRecord, now: SystemTime) -> ServiceView {
        ServiceView {
            stale: record.is_stale(self.stale_after, now),
            record,
        }
    }

    fn views(&self, records: Vec<ServiceRecord>) -> Vec<ServiceView> {
        let now = SystemTime::now();
        records.into_iter().map(|r| self.view(r, now)).collect()
    }
}

/// A record as reported over HTTP
#[derive(Debug, Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub record: ServiceRecord,
    pub stale: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub identity: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    /// `START-END`, half-open
    pub ports: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub state: DiscoveryState,
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryStatus {
    pub state: DiscoveryState,
    pub ports: Option<String>,
    pub services: usize,
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: Option<String>,
}

/// Handler errors, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            DiscoveryError::Unreachable { .. } => ApiError::BadGateway(err.to_string()),
            DiscoveryError::InternalScanFailure(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ModelNotSelected => ApiError::BadRequest(err.to_string()),
            GatewayError::InvalidUrl { .. } => ApiError::Internal(err.to_string()),
            GatewayError::Connection(_) | GatewayError::Status(_) | GatewayError::Decode(_) => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/services",
            get(list_services)
                .post(register_service)
                .delete(remove_service),
        )
        .route("/services/refresh", post(refresh_services))
        .route("/discovery", get(discovery_status))
        .route("/discovery/start", post(start_discovery))
        .route("/discovery/stop", post(stop_discovery))
        .route("/events", get(events))
        .route("/metrics", get(metrics_handler))
        .route("/models", get(list_models))
        .route("/models/select", post(select_model))
        .route("/generate", post(generate))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// HTTP server for the control API
pub struct ApiServer {
    state: AppState,
    listen_addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: AppState, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> common::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "API server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceView>> {
    Json(state.views(state.controller.snapshot()))
}

async fn register_service(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ServiceView>), ApiError> {
    match state
        .controller
        .register_manual(&request.identity, &request.address)
        .await
    {
        Ok(record) => {
            state.record_registration("success");
            Ok((StatusCode::CREATED, Json(state.view(record, SystemTime::now()))))
        }
        Err(e) => {
            state.record_registration(match &e {
                DiscoveryError::InvalidInput(_) => "invalid_input",
                DiscoveryError::Unreachable { .. } => "unreachable",
                DiscoveryError::InternalScanFailure(_) => "internal",
            });
            Err(e.into())
        }
    }
}

async fn remove_service(
    State(state): State<AppState>,
    Query(query): Query<AddressQuery>,
) -> Result<StatusCode, ApiError> {
    let address: ServiceAddress = query
        .address
        .parse()
        .map_err(|e| ApiError::from(DiscoveryError::from(e)))?;

    match state.controller.remove(&address) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound(format!("no service at {}", address))),
    }
}

async fn refresh_services(State(state): State<AppState>) -> Json<Vec<ServiceView>> {
    let records = state.controller.refresh().await;
    Json(state.views(records))
}

async fn discovery_status(State(state): State<AppState>) -> Json<DiscoveryStatus> {
    Json(DiscoveryStatus {
        state: state.controller.state(),
        ports: state.controller.active_ports().map(|p| p.to_string()),
        services: state.controller.snapshot().len(),
    })
}

async fn start_discovery(
    State(state): State<AppState>,
    Query(query): Query<StartQuery>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let ports = match query.ports {
        Some(raw) => raw
            .parse::<PortRange>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => state.ports,
    };

    let changed = state.controller.start(ports).await;
    Ok(Json(LifecycleResponse {
        state: state.controller.state(),
        changed,
    }))
}

async fn stop_discovery(State(state): State<AppState>) -> Json<LifecycleResponse> {
    let changed = state.controller.stop().await;
    Json(LifecycleResponse {
        state: state.controller.state(),
        changed,
    })
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(state.controller.subscribe()).filter_map(|item| match item {
        Ok(event) => Some(Event::default().event(event.kind()).json_data(&event)),
        Err(e) => {
            // Slow subscriber; skip what was dropped
            warn!(error = %e, "Event stream lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(metrics) = state.metrics else {
        return ApiError::NotFound("metrics are disabled".to_string()).into_response();
    };

    match metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            ApiError::Internal(format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}

async fn list_models(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state.gateway.list_models().await;
    state.record_gateway("list_models", &result);
    let models = result?;

    Ok(Json(json!({
        "models": models,
        "current": state.gateway.current_model(),
    })))
}

async fn select_model(
    State(state): State<AppState>,
    Json(request): Json<SelectModelRequest>,
) -> Result<StatusCode, ApiError> {
    let model = request.model.trim();
    if model.is_empty() {
        return Err(ApiError::BadRequest("model must not be empty".to_string()));
    }
    state.gateway.select_model(model);
    Ok(StatusCode::NO_CONTENT)
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .gateway
        .generate(&request.prompt, request.model.as_deref())
        .await;
    state.record_gateway("generate", &result);
    let response = result?;

    Ok(Json(json!({ "response": response })))
}
