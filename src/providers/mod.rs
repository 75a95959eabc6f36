//! 上游 Provider
//!
//! [`MessagesApi`] 是 Relay 与上游之间的接缝：生产环境使用 [`FoundryProvider`]，
//! 测试中替换为内存实现。
pub mod foundry;
pub mod stream;

use crate::models::{MessagesRequest, MessagesResponse};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

pub use foundry::FoundryProvider;
pub use stream::{decode_upstream, parse_upstream_frame, UpstreamEvent};

pub type UpstreamStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent, ProviderError>> + Send>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("Upstream error: {0}")]
    Stream(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait MessagesApi: Send + Sync {
    /// 当前部署的模型名称
    fn model(&self) -> &str;

    /// 非流式调用
    async fn create_message(
        &self,
        request: &MessagesRequest,
        betas: &[&str],
    ) -> Result<MessagesResponse, ProviderError>;

    /// 流式调用，返回上游事件流
    async fn stream_message(
        &self,
        request: &MessagesRequest,
        betas: &[&str],
    ) -> Result<UpstreamStream, ProviderError>;

    /// 上传文件到 Files API，返回 file_id
    async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, ProviderError>;

    /// 下载 Files API 中的文件内容
    async fn download_file(&self, file_id: &str) -> Result<Bytes, ProviderError>;
}
