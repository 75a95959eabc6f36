//! Anthropic Messages API 数据模型
//!
//! 只建模 Relay 需要读写的字段；响应中的内容块保持为原始 JSON，
//! 以便在工具调用循环中原样回传给上游。
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<Value>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn assistant_blocks(blocks: Vec<Value>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Messages 请求体
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl MessagesRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            messages,
            tools: Vec::new(),
            container: None,
            stream: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_container(mut self, container: Value) -> Self {
        self.container = Some(container);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
}

impl Usage {
    /// 合并流式增量中的用量（后到的非零值覆盖）
    pub fn merge(&mut self, other: &Usage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
        if other.cache_creation_input_tokens.is_some() {
            self.cache_creation_input_tokens = other.cache_creation_input_tokens;
        }
        if other.cache_read_input_tokens.is_some() {
            self.cache_read_input_tokens = other.cache_read_input_tokens;
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
}

/// Messages 响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub container: Option<ContainerInfo>,
}

/// 模型发起的工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
    /// 调用方类型：`direct` 或代码执行容器（如 `code_execution_20250825`）
    pub caller_type: String,
}

impl MessagesResponse {
    /// 所有文本块
    pub fn texts(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect()
    }

    /// 第一个文本块
    pub fn first_text(&self) -> Option<&str> {
        self.texts().into_iter().next()
    }

    /// 所有客户端工具调用块
    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|b| {
                Some(ToolUse {
                    id: b.get("id")?.as_str()?.to_string(),
                    name: b.get("name")?.as_str()?.to_string(),
                    input: b.get("input").cloned().unwrap_or(Value::Null),
                    caller_type: b
                        .get("caller")
                        .and_then(|c| c.get("type"))
                        .and_then(Value::as_str)
                        .unwrap_or("direct")
                        .to_string(),
                })
            })
            .collect()
    }

    /// 在代码执行结果中查找生成文件的 file_id
    pub fn generated_file_id(&self) -> Option<String> {
        self.content
            .iter()
            .filter(|b| {
                b.get("type").and_then(Value::as_str) == Some("bash_code_execution_tool_result")
            })
            .filter_map(|b| b.get("content")?.get("content")?.as_array())
            .flatten()
            .find(|output| {
                output.get("type").and_then(Value::as_str) == Some("bash_code_execution_output")
            })
            .and_then(|output| output.get("file_id")?.as_str().map(str::to_string))
    }
}
