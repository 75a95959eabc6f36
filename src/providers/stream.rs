//! 上游 Messages API 流式事件解析
//!
//! 上游同样使用 `event:` / `data:` 帧格式，解码复用 [`crate::sse::SseDecoder`]。
//! 这里只关心文本增量、用量与停止原因，其他事件（ping、工具块等）忽略。
use super::ProviderError;
use crate::models::Usage;
use crate::sse::{RawFrame, SseDecoder};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    TextDelta(String),
    Usage(Usage),
    Stop(Option<String>),
    MessageStop,
}

/// 将一帧上游数据转换为零个或多个事件
pub fn parse_upstream_frame(frame: &RawFrame) -> Result<Vec<UpstreamEvent>, ProviderError> {
    let data: Value = match serde_json::from_str(&frame.data) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("[UPSTREAM] 忽略无法解析的帧 {}: {}", frame.event, e);
            return Ok(Vec::new());
        }
    };

    let events = match frame.event.as_str() {
        "message_start" => data
            .get("message")
            .and_then(|m| m.get("usage"))
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
            .map(UpstreamEvent::Usage)
            .into_iter()
            .collect(),
        "content_block_delta" => {
            let delta = data.get("delta");
            match delta.and_then(|d| d.get("type")).and_then(Value::as_str) {
                Some("text_delta") => delta
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .map(|t| vec![UpstreamEvent::TextDelta(t.to_string())])
                    .unwrap_or_default(),
                _ => Vec::new(),
            }
        }
        "message_delta" => {
            let mut events = Vec::new();
            if let Some(usage) = data
                .get("usage")
                .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
            {
                events.push(UpstreamEvent::Usage(usage));
            }
            let stop_reason = data
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(Value::as_str)
                .map(str::to_string);
            events.push(UpstreamEvent::Stop(stop_reason));
            events
        }
        "message_stop" => vec![UpstreamEvent::MessageStop],
        "error" => {
            let message = data
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown upstream error")
                .to_string();
            return Err(ProviderError::Stream(message));
        }
        _ => Vec::new(),
    };
    Ok(events)
}

/// 将上游响应字节流解码为事件流
pub fn decode_upstream<S, E>(body: S) -> impl Stream<Item = Result<UpstreamEvent, ProviderError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ProviderError> + Send + 'static,
{
    async_stream::try_stream! {
        let mut decoder = SseDecoder::new();
        futures::pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| -> ProviderError { e.into() })?;
            for frame in decoder.feed(&chunk) {
                for event in parse_upstream_frame(&frame)? {
                    yield event;
                }
            }
        }
        for frame in decoder.finish() {
            for event in parse_upstream_frame(&frame)? {
                yield event;
            }
        }
    }
}
