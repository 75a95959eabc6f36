//! HTTP API 服务器
use crate::config::{Config, ProviderConfig};
use crate::error::RelayError;
use crate::models::{
    all_features, ConfigStatus, ConfigureRequest, RunRequest, RunnableFeature, StreamEvent,
    UploadResponse, AVAILABLE_MODELS,
};
use crate::providers::{FoundryProvider, MessagesApi};
use crate::relay::{run_feature, PromptCacheState, RelayContext};
use crate::storage::{mime_type_for, OutputStore, StorageError, UploadStore};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

/// 已配置的上游连接
#[derive(Clone)]
struct ProviderSlot {
    settings: ProviderConfig,
    api: Arc<dyn MessagesApi>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    provider: Arc<RwLock<Option<ProviderSlot>>>,
    pub uploads: Arc<UploadStore>,
    pub outputs: Arc<OutputStore>,
    pub prompt_cache: Arc<PromptCacheState>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StorageError> {
        let uploads = UploadStore::with_base_dir(config.storage.upload_dir.clone())?;
        let outputs = OutputStore::with_base_dir(config.storage.output_dir.clone())?;
        let prompt_cache = PromptCacheState::load(&config.prompt_cache);

        let preset = config.provider.clone().map(|settings| {
            tracing::info!("[CONFIG] 使用预置 Provider: {} ({})", settings.endpoint, settings.model);
            ProviderSlot {
                api: Arc::new(FoundryProvider::new(settings.clone(), &config.upstream)),
                settings,
            }
        });

        Ok(Self {
            config: Arc::new(config),
            provider: Arc::new(RwLock::new(preset)),
            uploads: Arc::new(uploads),
            outputs: Arc::new(outputs),
            prompt_cache: Arc::new(prompt_cache),
        })
    }

    /// 以 Foundry Provider 替换当前上游连接
    pub async fn configure(&self, settings: ProviderConfig) {
        let api = Arc::new(FoundryProvider::new(settings.clone(), &self.config.upstream));
        self.set_provider(settings, api).await;
    }

    pub async fn set_provider(&self, settings: ProviderConfig, api: Arc<dyn MessagesApi>) {
        tracing::info!("[CONFIG] Provider 已配置: {} ({})", settings.endpoint, settings.model);
        *self.provider.write().await = Some(ProviderSlot { settings, api });
    }

    pub async fn config_status(&self) -> ConfigStatus {
        match self.provider.read().await.as_ref() {
            Some(slot) => ConfigStatus {
                configured: true,
                model: Some(slot.settings.model.clone()),
                endpoint: Some(slot.settings.endpoint.clone()),
            },
            None => ConfigStatus::default(),
        }
    }

    async fn api(&self) -> Option<Arc<dyn MessagesApi>> {
        self.provider.read().await.as_ref().map(|slot| slot.api.clone())
    }

    /// 当前运行上下文；未配置 Provider 时为 `None`
    pub async fn relay_context(&self) -> Option<RelayContext> {
        self.api().await.map(|provider| RelayContext {
            provider,
            uploads: self.uploads.clone(),
            outputs: self.outputs.clone(),
            prompt_cache: self.prompt_cache.clone(),
            upstream: self.config.upstream.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub host: String,
    pub port: u16,
    pub uptime_secs: u64,
}

pub struct ServerState {
    pub config: Config,
    pub running: bool,
    pub start_time: Option<std::time::Instant>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_task: Option<tokio::task::JoinHandle<()>>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            running: false,
            start_time: None,
            shutdown_tx: None,
            server_task: None,
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            running: self.running,
            host: self.config.server.host.clone(),
            port: self.config.server.port,
            uptime_secs: self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        }
    }

    /// 绑定端口并在后台运行服务器；绑定失败直接返回错误
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.running {
            return Ok(());
        }

        let state = AppState::new(self.config.clone())?;
        let addr: std::net::SocketAddr =
            format!("{}:{}", self.config.server.host, self.config.server.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);

        let (tx, rx) = oneshot::channel();
        self.shutdown_tx = Some(tx);
        let app = build_router(state);

        self.server_task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        }));

        self.running = true;
        self.start_time = Some(std::time::Instant::now());
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.server_task.take() {
            let _ = task.await;
        }
        self.running = false;
        self.start_time = None;
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_mb * 1024 * 1024;
    let static_dir = state
        .config
        .server
        .static_dir
        .clone()
        .filter(|dir| dir.is_dir());

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/configure", post(configure))
        .route("/api/config-status", get(config_status))
        .route("/api/features", get(list_features))
        .route("/api/upload", post(upload_file))
        .route("/api/run", post(run))
        .route("/api/download/:filename", get(download_file));

    if let Some(dir) = static_dir {
        tracing::info!("[RELAY] 提供静态站点: {:?}", dir);
        let index = dir.join("index.html");
        app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.config_status().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "configured": status.configured,
    }))
}

async fn list_models() -> impl IntoResponse {
    Json(AVAILABLE_MODELS)
}

async fn configure(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Response, RelayError> {
    let settings = ProviderConfig::validated(&request.endpoint, &request.api_key, &request.model)?;
    let model = settings.model.clone();
    state.configure(settings).await;
    Ok(Json(serde_json::json!({ "ok": true, "model": model })).into_response())
}

async fn config_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config_status().await)
}

async fn list_features() -> impl IntoResponse {
    Json(all_features())
}

async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().unwrap_or("").to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        file = Some((filename, bytes));
                        break;
                    }
                    Err(e) => return RelayError::Upload(e.to_string()).into_response(),
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return RelayError::Upload(e.to_string()).into_response(),
        }
    }

    let Some((filename, content)) = file else {
        return json_error(StatusCode::BAD_REQUEST, "No file provided");
    };
    if filename.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Empty filename");
    }

    let mime_type = mime_type_for(&filename);
    tracing::info!(
        "[UPLOAD] 收到文件: {} ({}, {} bytes)",
        filename,
        mime_type,
        content.len()
    );

    let local_path = match state.uploads.save_local(&filename, &content).await {
        Ok(path) => path,
        Err(StorageError::InvalidName(name)) => {
            return json_error(StatusCode::BAD_REQUEST, format!("Invalid filename: {name}"))
        }
        Err(e) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let Some(api) = state.api().await else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::NotConfigured.to_string(),
        );
    };
    match api.upload_file(&filename, mime_type, content.to_vec()).await {
        Ok(file_id) => {
            let record = state.uploads.register(file_id, filename, local_path);
            Json(UploadResponse {
                upload_key: record.upload_key,
                filename: record.filename,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("[UPLOAD] 上传到 Files API 失败: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Response, RelayError> {
    let feature: RunnableFeature = request
        .feature_id
        .parse()
        .map_err(RelayError::UnknownFeature)?;
    let ctx = state.relay_context().await;
    Ok(sse_response(run_feature(feature, ctx, request)))
}

/// 将事件流编码为 `text/event-stream` 响应
fn sse_response(events: impl Stream<Item = StreamEvent> + Send + 'static) -> Response {
    let body_stream = events.map(|event| Ok::<_, std::convert::Infallible>(event.to_frame()));
    let body = Body::from_stream(body_stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build SSE response: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap_or_default()
        })
}

async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, RelayError> {
    let content = state.outputs.read(&filename).await.map_err(|e| match e {
        StorageError::NotFound(_) => RelayError::NotFound,
        other => RelayError::Storage(other),
    })?;
    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (header::CONTENT_TYPE, mime_type_for(&filename).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}
