//! Relay 客户端
//!
//! 发起运行请求并增量解析 SSE 响应体，会话状态通过 `watch` 通道对外广播。

use super::session::{RunRejected, SessionState};
use crate::models::{
    ConfigStatus, ConfigureRequest, FeatureDescriptor, RunRequest, StreamEvent, UploadResponse,
};
use crate::sse::{RawFrame, SseDecoder};
use crate::storage::is_safe_filename;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rejected(#[from] RunRejected),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Stream interrupted: {0}")]
    Stream(String),
    #[error("Refusing to save unsafe filename: {0}")]
    UnsafeFilename(String),
    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),
}

pub struct StreamClient {
    http: reqwest::Client,
    base_url: String,
    state: watch::Sender<SessionState>,
    cancel: Mutex<CancellationToken>,
}

impl StreamClient {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("[CLIENT] 构建 HTTP 客户端失败，使用默认配置: {}", e);
                reqwest::Client::new()
            });
        let (state, _) = watch::channel(SessionState::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            state,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn select_feature(&self, feature_id: &str) -> Result<(), RunRejected> {
        self.update(|s| s.select_feature(feature_id))
    }

    pub fn select_sub_feature(&self, sub_feature_id: &str) -> Result<(), RunRejected> {
        self.update(|s| s.select_sub_feature(sub_feature_id))
    }

    /// 在 watch 通道内原子地执行可能被拒绝的转换；被拒绝时不通知订阅者
    fn update(
        &self,
        f: impl FnOnce(&mut SessionState) -> Result<(), RunRejected>,
    ) -> Result<(), RunRejected> {
        let mut result = Ok(());
        self.state.send_if_modified(|s| {
            result = f(s);
            result.is_ok()
        });
        result
    }

    /// 刷新耗时与缓存倒计时
    pub fn tick(&self) {
        self.state.send_modify(|s| s.tick(Instant::now()));
    }

    /// 中止当前运行的网络流
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// 进入运行状态并安装新的取消令牌，两者在同一次状态更新内完成
    fn begin(&self) -> Result<CancellationToken, ClientError> {
        let token = CancellationToken::new();
        let now = Instant::now();
        self.update(|s| {
            if s.running {
                return Err(RunRejected::AlreadyRunning);
            }
            *self.cancel.lock() = token.clone();
            s.begin_run(now)
        })?;
        Ok(token)
    }

    /// 发起运行并消费整个事件流
    ///
    /// 已有运行中的流时返回 [`RunRejected::AlreadyRunning`]，不发送请求。
    pub async fn start_run(
        &self,
        feature_id: &str,
        input: &str,
        upload_key: Option<String>,
    ) -> Result<(), ClientError> {
        let token = self.begin()?;
        let mut request = RunRequest::new(feature_id, input);
        request.upload_key = upload_key;
        tracing::info!("[CLIENT] 运行 {}", feature_id);

        let send = self.http.post(self.url("/api/run")).json(&request).send();
        let response = tokio::select! {
            _ = token.cancelled() => {
                self.state.send_modify(|s| s.on_cancelled(Instant::now()));
                return Ok(());
            }
            response = send => response,
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let err = ClientError::Http(e);
                self.state.send_modify(|s| s.on_request_failed(err.to_string()));
                return Err(err);
            }
        };
        let response = match check_status(response).await {
            Ok(r) => r,
            Err(err) => {
                let message = match &err {
                    ClientError::Status { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                self.state.send_modify(|s| s.on_request_failed(message));
                return Err(err);
            }
        };

        self.consume(response.bytes_stream(), token).await
    }

    /// 增量解析响应体并更新状态
    pub(crate) async fn consume<S, E>(&self, body: S, token: CancellationToken) -> Result<(), ClientError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut decoder = SseDecoder::new();
        futures::pin_mut!(body);

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("[CLIENT] 运行已取消");
                    self.state.send_modify(|s| s.on_cancelled(Instant::now()));
                    return Ok(());
                }
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    let frames = decoder.feed(&bytes);
                    self.dispatch(frames);
                }
                Some(Err(e)) => {
                    let message = format!("Stream interrupted: {e}");
                    tracing::warn!("[CLIENT] {}", message);
                    self.state.send_modify(|s| {
                        s.on_error(message.clone());
                        s.on_stream_end(Instant::now());
                    });
                    return Err(ClientError::Stream(e.to_string()));
                }
                None => break,
            }
        }

        let frames = decoder.finish();
        self.dispatch(frames);
        self.state.send_modify(|s| s.on_stream_end(Instant::now()));
        Ok(())
    }

    fn dispatch(&self, frames: Vec<RawFrame>) {
        if frames.is_empty() {
            return;
        }
        let now = Instant::now();
        self.state.send_modify(|s| {
            for frame in frames {
                apply_frame(s, &frame, now);
            }
        });
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let response = self.http.get(self.url("/api/models")).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn list_features(&self) -> Result<Vec<FeatureDescriptor>, ClientError> {
        let response = self.http.get(self.url("/api/features")).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn config_status(&self) -> Result<ConfigStatus, ClientError> {
        let response = self.http.get(self.url("/api/config-status")).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// 配置 Relay 的上游连接，返回生效的模型名
    pub async fn configure(
        &self,
        endpoint: &str,
        api_key: &str,
        model: &str,
    ) -> Result<String, ClientError> {
        let body = ConfigureRequest {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        };
        let response = self
            .http
            .post(self.url("/api/configure"))
            .json(&body)
            .send()
            .await?;
        let data: serde_json::Value = check_status(response).await?.json().await?;
        Ok(data["model"].as_str().unwrap_or(model).to_string())
    }

    pub async fn upload(&self, path: &Path) -> Result<UploadResponse, ClientError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let content = tokio::fs::read(path).await?;
        tracing::info!("[CLIENT] 上传 {} ({} bytes)", filename, content.len());
        let part = reqwest::multipart::Part::bytes(content).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// 下载生成文件到目录，返回本地路径
    pub async fn download(&self, filename: &str, dest_dir: &Path) -> Result<PathBuf, ClientError> {
        if !is_safe_filename(filename) {
            tracing::warn!("[CLIENT] 拒绝保存不安全的文件名: {}", filename);
            return Err(ClientError::UnsafeFilename(filename.to_string()));
        }
        let path = format!("/api/download/{}", urlencoding::encode(filename));
        let response = self.http.get(self.url(&path)).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let target = dest_dir.join(filename);
        tokio::fs::write(&target, &bytes).await?;
        Ok(target)
    }
}

/// 解码一帧并应用到状态；无法解析的帧丢弃
pub fn apply_frame(state: &mut SessionState, frame: &RawFrame, now: Instant) {
    match StreamEvent::from_frame(&frame.event, &frame.data) {
        Ok(Some(event)) => state.apply(event, now),
        Ok(None) => tracing::debug!("[CLIENT] 忽略未知事件类型: {}", frame.event),
        Err(e) => tracing::debug!("[CLIENT] 忽略无法解析的帧 {}: {}", frame.event, e),
    }
}

/// 非 2xx 响应转换为错误，提取 `{error}` 消息
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::super::session::StatusKind;
    use super::*;
    use crate::config::Config;
    use crate::server::{build_router, AppState};
    use tempfile::TempDir;
    use futures::stream;
    use proptest::prelude::*;
    use std::convert::Infallible;

    const WEB_SEARCH_BODY: &str = "event: status\ndata: {\"message\":\"🔍 Claude is searching the web...\"}\n\n\
event: token\ndata: {\"text\":\"Foundry \"}\n\n\
event: token\ndata: {\"text\":\"is...\"}\n\n\
event: done\ndata: {\"message\":\"Complete\"}\n\n";

    fn chunks_of(body: &[u8], cuts: &[usize]) -> Vec<Result<Bytes, Infallible>> {
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();
        let mut out = Vec::new();
        let mut start = 0;
        for p in points.into_iter().chain(std::iter::once(body.len())) {
            if p > start {
                out.push(Ok(Bytes::copy_from_slice(&body[start..p])));
                start = p;
            }
        }
        out
    }

    async fn run_body(client: &StreamClient, chunks: Vec<Result<Bytes, Infallible>>) -> SessionState {
        let token = client.begin().unwrap();
        client.consume(stream::iter(chunks), token).await.unwrap();
        client.snapshot()
    }

    #[tokio::test]
    async fn test_web_search_example() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let state = run_body(&client, chunks_of(WEB_SEARCH_BODY.as_bytes(), &[])).await;
        assert_eq!(state.output, "Foundry is...");
        assert_eq!(state.status, "Complete");
        assert_eq!(state.status_kind, StatusKind::Success);
        assert!(!state.running);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let body = "event: token\ndata: {not json\n\n\
event: bogus\ndata: {}\n\n\
data: {\"text\":\"orphan\"}\n\n\
event: token\ndata: {\"text\":\"ok\"}\n\n";
        let state = run_body(&client, chunks_of(body.as_bytes(), &[7, 30])).await;
        assert_eq!(state.output, "ok");
        assert_eq!(state.status_kind, StatusKind::Success);
        assert!(!state.running);
    }

    #[tokio::test]
    async fn test_end_without_done_and_trailing_reads() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let mut chunks = chunks_of(b"event: token\ndata: {\"text\":\"a\"}\n\n", &[]);
        chunks.push(Ok(Bytes::new()));
        chunks.push(Ok(Bytes::new()));
        let state = run_body(&client, chunks).await;
        assert_eq!(state.output, "a");
        assert!(!state.running);
        assert_eq!(state.status_kind, StatusKind::Success);
    }

    #[tokio::test]
    async fn test_trailing_fragment_is_flushed() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let state = run_body(
            &client,
            chunks_of(b"event: done\ndata: {\"message\":\"Complete\"}", &[]),
        )
        .await;
        assert_eq!(state.status, "Complete");
    }

    #[tokio::test]
    async fn test_error_then_done() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let body = "event: error\ndata: {\"message\":\"Upstream error: Overloaded\"}\n\n\
event: done\ndata: {\"message\":\"❌ Error: Upstream error: Overloaded\"}\n\n";
        let state = run_body(&client, chunks_of(body.as_bytes(), &[])).await;
        assert_eq!(state.status_kind, StatusKind::Error);
        assert!(!state.running);
    }

    #[tokio::test]
    async fn test_start_run_rejected_while_running() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let _token = client.begin().unwrap();
        let mut rx = client.subscribe();
        rx.borrow_and_update();

        let err = client.start_run("web_search", "q", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(RunRejected::AlreadyRunning)));
        assert!(!rx.has_changed().unwrap());
        assert!(client.snapshot().running);
    }

    #[tokio::test]
    async fn test_cancel_stops_consumption() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let token = client.begin().unwrap();
        let body = stream::iter(vec![Ok::<_, Infallible>(Bytes::from_static(
            b"event: token\ndata: {\"text\":\"a\"}\n\n",
        ))])
        .chain(stream::pending());
        client.cancel();
        client.consume(body, token).await.unwrap();
        let state = client.snapshot();
        assert!(!state.running);
        assert_eq!(state.status, "Run cancelled.");
        assert_eq!(state.status_kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn test_connection_refused_ends_run() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let err = client.start_run("web_search", "q", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
        let state = client.snapshot();
        assert!(!state.running);
        assert_eq!(state.status_kind, StatusKind::Error);
    }

    async fn spawn_relay() -> (String, AppState, TempDir) {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.upload_dir = temp.path().join("uploads");
        config.storage.output_dir = temp.path().join("outputs");
        config.prompt_cache.document_path = temp.path().join("missing.html");
        let state = AppState::new(config).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), state, temp)
    }

    #[tokio::test]
    async fn test_rejected_run_reports_error_body() {
        let (base_url, _state, _temp) = spawn_relay().await;
        let client = StreamClient::new(&base_url);
        let err = client.start_run("skills", "q", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 400, .. }));

        let state = client.snapshot();
        assert_eq!(state.status, "Unknown feature: skills");
        assert_eq!(state.status_kind, StatusKind::Error);
        assert!(!state.running);
    }

    #[tokio::test]
    async fn test_download_saves_into_dest_dir() {
        let (base_url, state, temp) = spawn_relay().await;
        let name = state.outputs.save("pdf", b"%PDF-1.7").await.unwrap();
        let client = StreamClient::new(&base_url);
        let dest = temp.path().join("downloads");

        let path = client.download(&name, &dest).await.unwrap();
        assert_eq!(path, dest.join(&name));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_download_rejects_path_traversal() {
        let (base_url, _state, temp) = spawn_relay().await;
        let client = StreamClient::new(&base_url);
        let dest = temp.path().join("downloads");

        for name in ["../escaped.txt", "nested/a.pdf", ".hidden", ""] {
            let err = client.download(name, &dest).await.unwrap_err();
            assert!(matches!(err, ClientError::UnsafeFilename(_)), "{name}: {err}");
        }
        assert!(!temp.path().join("escaped.txt").exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_cancel_targets_token_installed_by_begin() {
        let client = StreamClient::new("http://127.0.0.1:9");
        let token = client.begin().unwrap();
        assert!(client.snapshot().running);

        let rejected = client.begin().unwrap_err();
        assert!(matches!(rejected, ClientError::Rejected(RunRejected::AlreadyRunning)));
        assert!(!token.is_cancelled());

        client.cancel();
        assert!(token.is_cancelled());
    }

    proptest! {
        #[test]
        fn prop_tokens_independent_of_chunking(cuts in proptest::collection::vec(0usize..512, 0..24)) {
            let body = "event: token\ndata: {\"text\":\"Héllo \"}\n\n\
event: token\ndata: {\"text\":\"wörld 🌍\"}\n\n\
event: metrics\ndata: {\"cache_type\":\"1-hour\",\"cache_status\":\"✅ Cache HIT\"}\n\n\
event: done\ndata: {\"message\":\"Complete\"}\n\n";
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let state = rt.block_on(async {
                let client = StreamClient::new("http://127.0.0.1:9");
                run_body(&client, chunks_of(body.as_bytes(), &cuts)).await
            });
            prop_assert_eq!(state.output.as_str(), "Héllo wörld 🌍");
            prop_assert_eq!(state.status.as_str(), "Complete");
            prop_assert_eq!(state.cache_remaining_secs, Some(3600));
            prop_assert!(!state.running);
        }
    }
}
