//! 流式事件数据模型
//!
//! Relay 与客户端之间的线协议：每个事件由一个 `event: <kind>` 行
//! 和一个 `data: <JSON>` 行组成，以空行结束。
//!
//! | kind    | payload                                   |
//! |---------|-------------------------------------------|
//! | token   | `{text}`                                  |
//! | status  | `{message}`                               |
//! | file    | `{filename, fileType}`                    |
//! | metrics | 对比表 / 缓存指标 / 其他 JSON 对象          |
//! | error   | `{message}`                               |
//! | done    | `{message}`                               |
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub text: String,
}

/// status / error / done 共用的消息负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message: String,
}

/// 生成文件描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    pub filename: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub metric: String,
    pub traditional: String,
    pub ptc: String,
}

/// 传统工具调用 vs 程序化工具调用（PTC）对比表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    pub comparison: bool,
    pub rows: Vec<ComparisonRow>,
}

/// Prompt Caching 指标
///
/// `response_time_seconds` 在首次（基线）运行时为 `null`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub cache_type: String,
    #[serde(default)]
    pub cache_status: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub response_time_seconds: Option<f64>,
    #[serde(default)]
    pub non_cached_time_seconds: Option<f64>,
    #[serde(default)]
    pub speedup: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricsPayload {
    Comparison(ComparisonMetrics),
    Cache(CacheMetrics),
    /// 未知结构的指标，原样保留用于展示
    Other(serde_json::Map<String, serde_json::Value>),
}

impl MetricsPayload {
    /// 若为缓存指标且带有缓存类型，返回该类型
    pub fn cache_type(&self) -> Option<&str> {
        match self {
            MetricsPayload::Cache(m) if !m.cache_type.is_empty() => Some(&m.cache_type),
            _ => None,
        }
    }
}

/// 事件类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Token,
    Status,
    File,
    Metrics,
    Error,
    Done,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Token => "token",
            EventKind::Status => "status",
            EventKind::File => "file",
            EventKind::Metrics => "metrics",
            EventKind::Error => "error",
            EventKind::Done => "done",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "token" => Some(EventKind::Token),
            "status" => Some(EventKind::Status),
            "file" => Some(EventKind::File),
            "metrics" => Some(EventKind::Metrics),
            "error" => Some(EventKind::Error),
            "done" => Some(EventKind::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个流式事件
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(TokenPayload),
    Status(MessagePayload),
    File(FilePayload),
    Metrics(MetricsPayload),
    Error(MessagePayload),
    Done(MessagePayload),
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        StreamEvent::Token(TokenPayload { text: text.into() })
    }

    pub fn status(message: impl Into<String>) -> Self {
        StreamEvent::Status(MessagePayload {
            message: message.into(),
        })
    }

    pub fn file(filename: impl Into<String>, file_type: impl Into<String>) -> Self {
        StreamEvent::File(FilePayload {
            filename: filename.into(),
            file_type: file_type.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error(MessagePayload {
            message: message.into(),
        })
    }

    pub fn done(message: impl Into<String>) -> Self {
        StreamEvent::Done(MessagePayload {
            message: message.into(),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Token(_) => EventKind::Token,
            StreamEvent::Status(_) => EventKind::Status,
            StreamEvent::File(_) => EventKind::File,
            StreamEvent::Metrics(_) => EventKind::Metrics,
            StreamEvent::Error(_) => EventKind::Error,
            StreamEvent::Done(_) => EventKind::Done,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_))
    }

    fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            StreamEvent::Token(p) => serde_json::to_string(p),
            StreamEvent::Status(p) | StreamEvent::Error(p) | StreamEvent::Done(p) => {
                serde_json::to_string(p)
            }
            StreamEvent::File(p) => serde_json::to_string(p),
            StreamEvent::Metrics(p) => serde_json::to_string(p),
        }
    }

    /// 编码为 SSE 帧：`event: <kind>\ndata: <JSON>\n\n`
    pub fn to_frame(&self) -> String {
        let data = self.payload_json().unwrap_or_else(|e| {
            tracing::error!("[RELAY] 事件序列化失败: {}", e);
            "{}".to_string()
        });
        format!("event: {}\ndata: {}\n\n", self.kind(), data)
    }

    /// 从帧的 kind 与 data 解码事件
    ///
    /// 未知 kind 返回 `Ok(None)`；JSON 不合法返回 `Err`。
    pub fn from_frame(kind: &str, data: &str) -> serde_json::Result<Option<Self>> {
        let Some(kind) = EventKind::parse(kind) else {
            return Ok(None);
        };
        let event = match kind {
            EventKind::Token => StreamEvent::Token(serde_json::from_str(data)?),
            EventKind::Status => StreamEvent::Status(serde_json::from_str(data)?),
            EventKind::File => StreamEvent::File(serde_json::from_str(data)?),
            EventKind::Metrics => StreamEvent::Metrics(serde_json::from_str(data)?),
            EventKind::Error => StreamEvent::Error(serde_json::from_str(data)?),
            EventKind::Done => StreamEvent::Done(serde_json::from_str(data)?),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_frame_format() {
        let frame = StreamEvent::token("Foundry ").to_frame();
        assert_eq!(frame, "event: token\ndata: {\"text\":\"Foundry \"}\n\n");
    }

    #[test]
    fn test_file_payload_uses_camel_case() {
        let frame = StreamEvent::file("ab12cd34.docx", "docx").to_frame();
        assert!(frame.contains("\"fileType\":\"docx\""));
    }

    #[test]
    fn test_metrics_union_comparison() {
        let data = r#"{"comparison":true,"rows":[{"metric":"API Calls","traditional":"4","ptc":"4"}]}"#;
        let event = StreamEvent::from_frame("metrics", data).unwrap().unwrap();
        match event {
            StreamEvent::Metrics(MetricsPayload::Comparison(m)) => {
                assert!(m.comparison);
                assert_eq!(m.rows[0].metric, "API Calls");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_metrics_union_cache() {
        let data = r#"{"cache_type":"1-hour","cache_status":"✅ Cache HIT","input_tokens":12,
            "output_tokens":30,"cache_creation_input_tokens":0,"cache_read_input_tokens":90000,
            "response_time_seconds":1.2,"non_cached_time_seconds":6.3,"speedup":"5.3x faster"}"#;
        let event = StreamEvent::from_frame("metrics", data).unwrap().unwrap();
        let StreamEvent::Metrics(metrics) = event else {
            panic!("expected metrics");
        };
        assert_eq!(metrics.cache_type(), Some("1-hour"));
    }

    #[test]
    fn test_metrics_union_other() {
        let event = StreamEvent::from_frame("metrics", r#"{"latency_ms":42}"#)
            .unwrap()
            .unwrap();
        let StreamEvent::Metrics(metrics) = event else {
            panic!("expected metrics");
        };
        assert!(matches!(metrics, MetricsPayload::Other(_)));
        assert_eq!(metrics.cache_type(), None);
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        assert_eq!(StreamEvent::from_frame("ping", "{}").unwrap(), None);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(StreamEvent::from_frame("token", "{not json").is_err());
        assert!(StreamEvent::from_frame("token", r#"{"message":"x"}"#).is_err());
    }
}
