//! REST API over the lifecycle backend, image store and disk provisioner.
//!
//! All routes live under `/api/v1`; `/healthz` sits outside it and is not
//! subject to bearer authentication.
//!
//! Each request runs its core operation on a spawned task with a child of
//! the daemon's shutdown token. The token is cancelled when the client goes
//! away (the handler future is dropped), when the request deadline passes,
//! or when the daemon shuts down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use deusvm_common::parse_size;
use deusvm_hypervisor::{
    CreateVmRequest, DiskProvisioner, ErrorKind, HypervisorError, ImageRecord, ImageStore,
    LifecycleManager, VmRecord,
};

/// Shared state for HTTP handlers
pub struct AppState {
    pub lifecycle: Arc<dyn LifecycleManager>,
    pub images: Arc<ImageStore>,
    pub disks: Arc<DiskProvisioner>,
    /// Parent of every request's cancellation token
    pub shutdown: CancellationToken,
    pub request_timeout: Option<Duration>,
    pub auth_token: Option<String>,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Error response: `{"error": <kind>, "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest.as_str(), message)
    }
}

/// HTTP status for a core error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<HypervisorError> for ApiError {
    fn from(e: HypervisorError) -> Self {
        let kind = e.kind();
        Self::new(status_for(kind), kind.as_str(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::bad_request(format!("invalid json: {}", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = self.error, message = %self.message, "Request failed");
        }
        let body = ApiErrorBody {
            error: self.error.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateVmBody {
    name: String,
    image: String,
    cpu: u32,
    /// Human size such as `4GB`
    memory: String,
    /// Human size such as `20GB`
    disk: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateImageBody {
    name: String,
    source: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateDiskBody {
    base_image: String,
    name: String,
    size: String,
}

#[derive(Serialize)]
struct DiskResponse {
    path: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
    version: &'static str,
}

// ============================================================================
// Server
// ============================================================================

/// Serve the API on `addr` until the shutdown token fires.
pub async fn run_http_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_app_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Starting HTTP API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP API server stopped");
    Ok(())
}

/// Build the application router with all routes
pub fn build_app_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // VMs
        .route("/vms", post(create_vm).get(list_vms))
        .route("/vms/:id", get(get_vm).delete(delete_vm))
        .route("/vms/:id/start", put(start_vm))
        .route("/vms/:id/stop", put(stop_vm))
        // Images
        .route("/images", post(create_image).get(list_images))
        .route("/images/:name", axum::routing::delete(delete_image))
        // Disks
        .route("/disks", post(create_disk))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Reject requests without the configured bearer token.
async fn require_bearer(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected) {
        next.run(req).await
    } else {
        ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid bearer token")
            .into_response()
    }
}

/// Run a core operation under a per-request cancellation token.
async fn run_op<T, F, Fut>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = deusvm_hypervisor::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let cancel = state.shutdown.child_token();
    // Fires if this handler is dropped because the client disconnected.
    let _guard = cancel.clone().drop_guard();

    let timer = state.request_timeout.map(|timeout| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    });

    let joined = tokio::spawn(f(cancel.clone())).await;

    if let Some(timer) = timer {
        timer.abort();
    }

    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!(error = %e, "Request task failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Internal.as_str(),
                "request task failed",
            ))
        }
    }
}

fn parse_size_field(field: &str, value: &str) -> ApiResult<u64> {
    parse_size(value).map_err(|e| ApiError::bad_request(format!("invalid {}: {}", field, e)))
}

// ============================================================================
// Handlers
// ============================================================================

async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.lifecycle.backend_name(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/v1/vms
async fn create_vm(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateVmBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<VmRecord>)> {
    let Json(body) = body?;
    let memory_bytes = parse_size_field("memory", &body.memory)?;
    let disk_bytes = parse_size_field("disk", &body.disk)?;
    let req = CreateVmRequest::new(body.name, body.cpu, memory_bytes, disk_bytes, body.image);

    let lifecycle = state.lifecycle.clone();
    let vm = run_op(&state, move |cancel| async move { lifecycle.create_vm(req, &cancel).await }).await?;

    info!(vm_id = %vm.id, name = %vm.name, "VM created via HTTP API");
    Ok((StatusCode::CREATED, Json(vm)))
}

/// GET /api/v1/vms
async fn list_vms(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<VmRecord>>> {
    let lifecycle = state.lifecycle.clone();
    let vms = run_op(&state, move |cancel| async move { lifecycle.list_vms(&cancel).await }).await?;
    Ok(Json(vms))
}

/// GET /api/v1/vms/:id
async fn get_vm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<VmRecord>> {
    let lifecycle = state.lifecycle.clone();
    let vm = run_op(&state, move |cancel| async move { lifecycle.get_vm(&id, &cancel).await }).await?;
    Ok(Json(vm))
}

/// PUT /api/v1/vms/:id/start
async fn start_vm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let lifecycle = state.lifecycle.clone();
    let vm_id = id.clone();
    run_op(&state, move |cancel| async move { lifecycle.start_vm(&vm_id, &cancel).await }).await?;

    info!(vm_id = %id, "VM started via HTTP API");
    Ok(Json(StatusResponse { status: "started" }))
}

/// PUT /api/v1/vms/:id/stop
async fn stop_vm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let lifecycle = state.lifecycle.clone();
    let vm_id = id.clone();
    run_op(&state, move |cancel| async move { lifecycle.stop_vm(&vm_id, &cancel).await }).await?;

    info!(vm_id = %id, "VM stopped via HTTP API");
    Ok(Json(StatusResponse { status: "stopped" }))
}

/// DELETE /api/v1/vms/:id
async fn delete_vm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let lifecycle = state.lifecycle.clone();
    let vm_id = id.clone();
    run_op(&state, move |cancel| async move { lifecycle.delete_vm(&vm_id, &cancel).await }).await?;

    info!(vm_id = %id, "VM deleted via HTTP API");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/images
async fn create_image(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateImageBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ImageRecord>)> {
    let Json(body) = body?;
    if body.name.is_empty() || body.source.is_empty() {
        return Err(ApiError::bad_request("name and source required"));
    }

    let images = state.images.clone();
    let image = run_op(&state, move |cancel| async move {
        images.save_image_from_url(&body.name, &body.source, &cancel).await
    })
    .await?;

    info!(image = %image.name, size_bytes = image.size_bytes, "Image created via HTTP API");
    Ok((StatusCode::CREATED, Json(image)))
}

/// GET /api/v1/images
async fn list_images(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ImageRecord>>> {
    let images = state.images.clone();
    let list = run_op(&state, move |cancel| async move { images.list_images(&cancel).await }).await?;
    Ok(Json(list))
}

/// DELETE /api/v1/images/:name
async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let images = state.images.clone();
    let image = name.clone();
    run_op(&state, move |cancel| async move { images.delete_image(&image, &cancel).await }).await?;

    info!(image = %name, "Image deleted via HTTP API");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/disks
async fn create_disk(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateDiskBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DiskResponse>)> {
    let Json(body) = body?;
    let size_bytes = parse_size_field("size", &body.size)?;

    let disks = state.disks.clone();
    let path = run_op(&state, move |cancel| async move {
        disks
            .create_disk_from_base(&body.base_image, &body.name, size_bytes, &cancel)
            .await
    })
    .await?;

    let path = path.display().to_string();
    info!(path = %path, "Disk created via HTTP API");
    Ok((StatusCode::CREATED, Json(DiskResponse { path })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use deusvm_hypervisor::SimulatedBackend;
    use tower::ServiceExt;

    struct Harness {
        _dir: tempfile::TempDir,
        shutdown: CancellationToken,
        state: Arc<AppState>,
    }

    fn harness_with(
        lifecycle: Arc<dyn LifecycleManager>,
        auth_token: Option<&str>,
        request_timeout: Option<Duration>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let images = ImageStore::new(dir.path().join("images")).unwrap();
        let disks = images.disk_provisioner(dir.path().join("disks")).unwrap();
        let shutdown = CancellationToken::new();

        let state = Arc::new(AppState {
            lifecycle,
            images: Arc::new(images),
            disks: Arc::new(disks),
            shutdown: shutdown.clone(),
            request_timeout,
            auth_token: auth_token.map(str::to_string),
        });

        Harness {
            _dir: dir,
            shutdown,
            state,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(SimulatedBackend::new()), None, None)
    }

    impl Harness {
        async fn send(&self, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
            self.send_with(method, uri, body, None).await
        }

        async fn send_with(
            &self,
            method: &str,
            uri: &str,
            body: Option<serde_json::Value>,
            token: Option<&str>,
        ) -> (StatusCode, serde_json::Value) {
            let mut req = axum::http::Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let req = match body {
                Some(body) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => req.body(Body::empty()).unwrap(),
            };

            let response = build_app_router(self.state.clone()).oneshot(req).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn create_vm(&self, name: &str) -> serde_json::Value {
            let (status, vm) = self
                .send(
                    "POST",
                    "/api/v1/vms",
                    Some(serde_json::json!({
                        "name": name, "image": "ubuntu.qcow2", "cpu": 2,
                        "memory": "4GB", "disk": "20GB"
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", vm);
            vm
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidRequest), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Upstream), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Io), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_healthz_reports_backend() {
        let h = harness();
        let (status, body) = h.send("GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["backend"], "simulated");
    }

    #[tokio::test]
    async fn test_vm_lifecycle() {
        let h = harness();
        let vm = h.create_vm("web-1").await;
        let id = vm["id"].as_str().unwrap().to_string();
        assert_eq!(vm["status"], "stopped");
        assert_eq!(vm["memory_bytes"], 4u64 << 30);
        assert_eq!(vm["disk_bytes"], 20u64 << 30);

        let (status, body) = h.send("PUT", &format!("/api/v1/vms/{}/start", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "started");

        let (_, vm) = h.send("GET", &format!("/api/v1/vms/{}", id), None).await;
        assert_eq!(vm["status"], "running");

        let (status, _) = h.send("PUT", &format!("/api/v1/vms/{}/stop", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, list) = h.send("GET", "/api/v1/vms", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _) = h.send("DELETE", &format!("/api/v1/vms/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = h.send("GET", &format!("/api/v1/vms/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_create_vm_errors() {
        let h = harness();
        h.create_vm("dup").await;

        let (status, body) = h
            .send(
                "POST",
                "/api/v1/vms",
                Some(serde_json::json!({"name": "dup", "image": "x.raw", "cpu": 1, "memory": "1GB", "disk": "1GB"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");

        let (status, body) = h
            .send(
                "POST",
                "/api/v1/vms",
                Some(serde_json::json!({"name": "x", "image": "x.raw", "cpu": 1, "memory": "lots", "disk": "1GB"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, _) = h
            .send(
                "POST",
                "/api/v1/vms",
                Some(serde_json::json!({"name": "x", "image": "x.raw", "cpu": 0, "memory": "1GB", "disk": "1GB"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = h.send("POST", "/api/v1/vms", Some(serde_json::json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_vm_actions_are_not_found() {
        let h = harness();
        for (method, uri) in [
            ("PUT", "/api/v1/vms/nope/start"),
            ("PUT", "/api/v1/vms/nope/stop"),
            ("DELETE", "/api/v1/vms/nope"),
        ] {
            let (status, _) = h.send(method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_bearer_auth() {
        let h = harness_with(Arc::new(SimulatedBackend::new()), Some("s3cret"), None);

        let (status, body) = h.send("GET", "/api/v1/vms", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = h.send_with("GET", "/api/v1/vms", None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = h.send_with("GET", "/api/v1/vms", None, Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h.send("GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_image_routes() {
        let h = harness();

        let (status, list) = h.send("GET", "/api/v1/images", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list, serde_json::json!([]));

        let (status, _) = h
            .send("POST", "/api/v1/images", Some(serde_json::json!({"name": "a.raw"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = h
            .send(
                "POST",
                "/api/v1/images",
                Some(serde_json::json!({"name": "a.part", "source": "http://127.0.0.1:9/a"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        std::fs::write(h.state.images.images_dir().join("base.raw"), b"1234").unwrap();
        let (_, list) = h.send("GET", "/api/v1/images", None).await;
        assert_eq!(list[0]["name"], "base.raw");
        assert_eq!(list[0]["size_bytes"], 4);
        assert_eq!(list[0]["format"], "raw");

        let (status, _) = h.send("DELETE", "/api/v1/images/base.raw", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = h.send("DELETE", "/api/v1/images/base.raw", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_disk_route() {
        let h = harness();
        std::fs::write(h.state.images.images_dir().join("base.qcow2"), b"disk bytes").unwrap();

        let (status, body) = h
            .send(
                "POST",
                "/api/v1/disks",
                Some(serde_json::json!({"base_image": "base.qcow2", "name": "vm-1.qcow2", "size": "20GB"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let path = body["path"].as_str().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"disk bytes");

        let (status, _) = h
            .send(
                "POST",
                "/api/v1/disks",
                Some(serde_json::json!({"base_image": "base.qcow2", "name": "vm-1.qcow2", "size": "20GB"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = h
            .send(
                "POST",
                "/api/v1/disks",
                Some(serde_json::json!({"base_image": "missing.qcow2", "name": "vm-2.qcow2", "size": "20GB"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_requests() {
        let h = harness();
        h.shutdown.cancel();

        let (status, body) = h
            .send(
                "POST",
                "/api/v1/vms",
                Some(serde_json::json!({"name": "late", "image": "x.raw", "cpu": 1, "memory": "1GB", "disk": "1GB"})),
            )
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "cancelled");
        assert!(h.state.lifecycle.list_vms(&CancellationToken::new()).await.unwrap().is_empty());
    }

    /// Backend whose reads block until cancelled.
    struct StalledBackend;

    #[async_trait]
    impl LifecycleManager for StalledBackend {
        fn backend_name(&self) -> &'static str {
            "stalled"
        }

        async fn create_vm(&self, _req: CreateVmRequest, _cancel: &CancellationToken) -> deusvm_hypervisor::Result<VmRecord> {
            Err(HypervisorError::Internal("unused".to_string()))
        }

        async fn delete_vm(&self, _id: &str, _cancel: &CancellationToken) -> deusvm_hypervisor::Result<()> {
            Ok(())
        }

        async fn start_vm(&self, _id: &str, _cancel: &CancellationToken) -> deusvm_hypervisor::Result<()> {
            Ok(())
        }

        async fn stop_vm(&self, _id: &str, _cancel: &CancellationToken) -> deusvm_hypervisor::Result<()> {
            Ok(())
        }

        async fn get_vm(&self, id: &str, cancel: &CancellationToken) -> deusvm_hypervisor::Result<VmRecord> {
            cancel.cancelled().await;
            Err(HypervisorError::Cancelled(format!("get {}", id)))
        }

        async fn list_vms(&self, cancel: &CancellationToken) -> deusvm_hypervisor::Result<Vec<VmRecord>> {
            cancel.cancelled().await;
            Err(HypervisorError::Cancelled("list".to_string()))
        }
    }

    #[tokio::test]
    async fn test_request_timeout_cancels_operation() {
        let h = harness_with(Arc::new(StalledBackend), None, Some(Duration::from_millis(50)));

        let (status, body) = h.send("GET", "/api/v1/vms/any", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "cancelled");
    }
}
