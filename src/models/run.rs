//! 运行请求模型
use serde::{Deserialize, Serialize};

/// `POST /api/run` 请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub feature_id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_key: Option<String>,
}

impl RunRequest {
    pub fn new(feature_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            input: input.into(),
            upload_key: None,
        }
    }

    pub fn with_upload_key(mut self, upload_key: impl Into<String>) -> Self {
        self.upload_key = Some(upload_key.into());
        self
    }
}

/// `POST /api/configure` 请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

/// `GET /api/config-status` 响应体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigStatus {
    pub configured: bool,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

/// `POST /api/upload` 成功响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_key: String,
    pub filename: String,
}
