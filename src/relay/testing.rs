//! 测试用的内存 Provider 与辅助函数

use super::{PromptCacheState, RelayContext};
use crate::config::UpstreamConfig;
use crate::models::{EventKind, MessagesRequest, MessagesResponse, StreamEvent};
use crate::providers::{MessagesApi, ProviderError, UpstreamEvent, UpstreamStream};
use crate::storage::{OutputStore, UploadStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

type ScriptedStream = Vec<Result<UpstreamEvent, ProviderError>>;

#[derive(Default)]
struct Script {
    streams: VecDeque<ScriptedStream>,
    responses: VecDeque<MessagesResponse>,
    hang: bool,
    download: Vec<u8>,
    requests: Vec<(Value, Vec<String>)>,
    downloads: Vec<String>,
    uploads: Vec<(String, String, usize)>,
}

/// 按脚本返回响应的 Provider；未脚本化的调用返回 529 错误
#[derive(Clone, Default)]
pub struct FakeProvider {
    script: Arc<Mutex<Script>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, events: ScriptedStream) -> Self {
        self.script.lock().streams.push_back(events);
        self
    }

    pub fn with_response(self, response: MessagesResponse) -> Self {
        self.script.lock().responses.push_back(response);
        self
    }

    pub fn with_hanging_stream(self) -> Self {
        self.script.lock().hang = true;
        self
    }

    pub fn with_download(self, content: Vec<u8>) -> Self {
        self.script.lock().download = content;
        self
    }

    /// 第 `i` 次 Messages 请求的 JSON 体与 beta 列表
    pub fn request(&self, i: usize) -> (Value, Vec<String>) {
        self.script.lock().requests[i].clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().requests.len()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.script.lock().downloads.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String, usize)> {
        self.script.lock().uploads.clone()
    }

    fn record(&self, request: &MessagesRequest, betas: &[&str]) {
        let body = serde_json::to_value(request).unwrap_or(Value::Null);
        let betas = betas.iter().map(|b| b.to_string()).collect();
        self.script.lock().requests.push((body, betas));
    }

    fn overloaded() -> ProviderError {
        ProviderError::Status {
            status: 529,
            message: "Overloaded".to_string(),
        }
    }
}

#[async_trait]
impl MessagesApi for FakeProvider {
    fn model(&self) -> &str {
        "claude-sonnet-4-5"
    }

    async fn create_message(
        &self,
        request: &MessagesRequest,
        betas: &[&str],
    ) -> Result<MessagesResponse, ProviderError> {
        self.record(request, betas);
        self.script
            .lock()
            .responses
            .pop_front()
            .ok_or_else(Self::overloaded)
    }

    async fn stream_message(
        &self,
        request: &MessagesRequest,
        betas: &[&str],
    ) -> Result<UpstreamStream, ProviderError> {
        self.record(request, betas);
        let mut script = self.script.lock();
        if script.hang {
            return Ok(Box::pin(futures::stream::pending()));
        }
        let events = script.streams.pop_front().ok_or_else(Self::overloaded)?;
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, ProviderError> {
        let mut script = self.script.lock();
        script
            .uploads
            .push((filename.to_string(), mime_type.to_string(), content.len()));
        Ok(format!("file_{}", script.uploads.len()))
    }

    async fn download_file(&self, file_id: &str) -> Result<Bytes, ProviderError> {
        let mut script = self.script.lock();
        script.downloads.push(file_id.to_string());
        Ok(Bytes::from(script.download.clone()))
    }
}

pub fn response(
    stop_reason: &str,
    content: Value,
    container: Option<&str>,
    (input_tokens, output_tokens): (u64, u64),
) -> MessagesResponse {
    serde_json::from_value(serde_json::json!({
        "id": "msg_test",
        "content": content,
        "stop_reason": stop_reason,
        "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens},
        "container": container.map(|id| serde_json::json!({"id": id})),
    }))
    .unwrap()
}

/// 以临时目录构建运行上下文
pub fn context(provider: FakeProvider) -> (RelayContext, TempDir) {
    let temp = TempDir::new().unwrap();
    let ctx = RelayContext {
        provider: Arc::new(provider),
        uploads: Arc::new(UploadStore::with_base_dir(temp.path().join("uploads")).unwrap()),
        outputs: Arc::new(OutputStore::with_base_dir(temp.path().join("outputs")).unwrap()),
        prompt_cache: Arc::new(PromptCacheState::new(
            Some("<html>Microsoft FY2025 revenue $281.7 billion</html>".to_string()),
            Duration::from_secs(3600),
        )),
        upstream: UpstreamConfig::default(),
    };
    (ctx, temp)
}

pub async fn collect(stream: impl Stream<Item = StreamEvent>) -> Vec<StreamEvent> {
    stream.collect().await
}

pub fn kinds(events: &[StreamEvent]) -> Vec<EventKind> {
    events.iter().map(StreamEvent::kind).collect()
}
