//! 功能运行与事件转发
//!
//! 每次 `/api/run` 对应一个独立的事件流：runner 产生 `Result<StreamEvent, RelayError>`，
//! [`run_feature`] 负责把失败折叠为一个 `error` 事件加一个 `done` 事件并结束流。
//! 响应体被丢弃（客户端断开）时整个流随之丢弃，上游请求一并取消。

pub mod agent;
pub mod cache_baseline;
pub mod expense_tools;
pub mod runners;
pub mod skills;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::UpstreamConfig;
use crate::error::RelayError;
use crate::models::{RunRequest, RunnableFeature, StreamEvent};
use crate::providers::{MessagesApi, ProviderError, UpstreamEvent, UpstreamStream};
use crate::storage::{OutputStore, UploadStore};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub use cache_baseline::PromptCacheState;
pub use skills::DocumentSkill;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RelayError>> + Send>>;

/// 单次运行所需的共享资源
#[derive(Clone)]
pub struct RelayContext {
    pub provider: Arc<dyn MessagesApi>,
    pub uploads: Arc<UploadStore>,
    pub outputs: Arc<OutputStore>,
    pub prompt_cache: Arc<PromptCacheState>,
    pub upstream: UpstreamConfig,
}

impl RelayContext {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.idle_timeout_secs.max(1))
    }
}

/// 以空闲超时等待一次上游调用
pub(crate) async fn timed<T, F>(idle: Duration, fut: F) -> Result<T, RelayError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(idle, fut).await {
        Ok(result) => result.map_err(RelayError::from),
        Err(_) => Err(RelayError::IdleTimeout(idle.as_secs())),
    }
}

/// 以空闲超时读取下一个上游事件；流结束返回 `None`
pub(crate) async fn next_upstream(
    upstream: &mut UpstreamStream,
    idle: Duration,
) -> Result<Option<UpstreamEvent>, RelayError> {
    match tokio::time::timeout(idle, upstream.next()).await {
        Ok(Some(event)) => event.map(Some).map_err(RelayError::from),
        Ok(None) => Ok(None),
        Err(_) => Err(RelayError::IdleTimeout(idle.as_secs())),
    }
}

fn runner(feature: RunnableFeature, ctx: RelayContext, request: RunRequest) -> EventStream {
    let RunRequest {
        input, upload_key, ..
    } = request;
    match feature {
        RunnableFeature::WebSearch => runners::run_web_search(ctx, input),
        RunnableFeature::WebFetch => runners::run_web_fetch(ctx, input),
        RunnableFeature::FilesApi => runners::run_files_api(ctx, input, upload_key),
        RunnableFeature::CodeExecution => agent::run_code_execution(ctx, input),
        RunnableFeature::PromptCaching => runners::run_prompt_caching(ctx, input),
        RunnableFeature::GenerateDocx => skills::run_skill(ctx, DocumentSkill::Docx, input),
        RunnableFeature::GeneratePdf => skills::run_skill(ctx, DocumentSkill::Pdf, input),
    }
}

/// 运行功能并返回事件流
///
/// `ctx` 为 `None` 表示 Provider 尚未配置。任何失败都只产生一个 `error`
/// 和一个 `❌ Error: ...` 的 `done`，之后流结束。
pub fn run_feature(
    feature: RunnableFeature,
    ctx: Option<RelayContext>,
    request: RunRequest,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let inner: EventStream = match ctx {
        Some(ctx) => runner(feature, ctx, request),
        None => Box::pin(futures::stream::once(async { Err(RelayError::NotConfigured) })),
    };

    async_stream::stream! {
        tracing::info!("[RELAY] 开始运行: {}", feature);
        let mut inner = inner;
        while let Some(item) = inner.next().await {
            match item {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        tracing::info!("[RELAY] 运行结束: {}", feature);
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("[RELAY] 运行失败 {}: {}", feature, e);
                    yield StreamEvent::error(e.to_string());
                    yield StreamEvent::done(format!("❌ Error: {e}"));
                    return;
                }
            }
        }
        tracing::debug!("[RELAY] 事件流在 done 之前结束: {}", feature);
    }
}
