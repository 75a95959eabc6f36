//! 配置类型定义
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 应用根目录：`~/.featurecast`
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".featurecast")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upstream: UpstreamConfig,
    pub prompt_cache: PromptCacheConfig,
    pub logging: LoggingConfig,
    /// 启动时预置的 Provider 连接（也可通过 /api/configure 设置）
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 前端构建产物目录，存在时作为静态站点提供（SPA 回退到 index.html）
    pub static_dir: Option<PathBuf>,
    /// 请求体大小上限（MB），主要限制上传文件
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: None,
            body_limit_mb: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 上传文件的本地副本目录
    pub upload_dir: PathBuf,
    /// 生成文件（docx/pdf）输出目录
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = app_data_dir();
        Self {
            upload_dir: base.join("uploads"),
            output_dir: base.join("outputs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub connect_timeout_secs: u64,
    /// 两次上游读取之间允许的最长空闲时间
    pub idle_timeout_secs: u64,
    /// PTC Agent 循环的最大轮数
    pub max_agent_turns: u32,
    pub anthropic_version: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            idle_timeout_secs: 300,
            max_agent_turns: 25,
            anthropic_version: "2023-06-01".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptCacheConfig {
    /// Prompt Caching 演示使用的参考文档
    pub document_path: PathBuf,
    /// 基线有效期（秒），与上游 1 小时缓存 TTL 对齐
    pub baseline_ttl_secs: u64,
}

impl Default for PromptCacheConfig {
    fn default() -> Self {
        Self {
            document_path: app_data_dir()
                .join("uploads")
                .join("Microsoft 2025 Annual Report.html"),
            baseline_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认日志级别（RUST_LOG 优先）
    pub level: String,
    /// 输出 JSON 格式日志
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Provider 连接参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

impl ProviderConfig {
    /// 校验并规范化 Provider 连接参数
    ///
    /// 三项均去除首尾空白；endpoint 去掉末尾的 `/` 且必须是 http(s) URL。
    pub fn validated(
        endpoint: &str,
        api_key: &str,
        model: &str,
    ) -> Result<Self, super::ConfigError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        let api_key = api_key.trim();
        let model = model.trim();

        if endpoint.is_empty() || api_key.is_empty() || model.is_empty() {
            return Err(super::ConfigError::Invalid(
                "endpoint, apiKey, and model are all required.".to_string(),
            ));
        }

        let parsed = url::Url::parse(endpoint).map_err(|e| {
            super::ConfigError::Invalid(format!("Configuration failed: invalid endpoint: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(super::ConfigError::Invalid(format!(
                "Configuration failed: unsupported endpoint scheme '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}
