//! Foundry Provider - 托管在 Foundry 上的 Anthropic Messages API
use super::{decode_upstream, MessagesApi, ProviderError, UpstreamStream};
use crate::config::{ProviderConfig, UpstreamConfig};
use crate::models::{MessagesRequest, MessagesResponse};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

pub const FILES_API_BETA: &str = "files-api-2025-04-14";

pub struct FoundryProvider {
    pub settings: ProviderConfig,
    pub client: Client,
    anthropic_version: String,
}

impl FoundryProvider {
    pub fn new(settings: ProviderConfig, upstream: &UpstreamConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(upstream.connect_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("[UPSTREAM] 构建 HTTP 客户端失败，使用默认配置: {}", e);
                Client::new()
            });
        Self {
            settings,
            client,
            anthropic_version: upstream.anthropic_version.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.endpoint, path)
    }

    fn authorize(&self, builder: RequestBuilder, betas: &[&str]) -> RequestBuilder {
        let builder = builder
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", &self.anthropic_version);
        if betas.is_empty() {
            builder
        } else {
            builder.header("anthropic-beta", betas.join(","))
        }
    }

    /// 非 2xx 响应转换为错误，尽量提取上游的错误消息
    async fn check_status(resp: Response) -> Result<Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .and_then(|m| m.as_str().map(str::to_string))
            })
            .unwrap_or(body);
        tracing::warn!("[UPSTREAM] 请求失败: {} - {}", status, message);
        Err(ProviderError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn post_messages(
        &self,
        request: &MessagesRequest,
        betas: &[&str],
    ) -> Result<Response, ProviderError> {
        tracing::debug!(
            "[UPSTREAM] POST /v1/messages model={} stream={} betas={:?}",
            request.model,
            request.stream,
            betas
        );
        let resp = self
            .authorize(self.client.post(self.url("/v1/messages")), betas)
            .json(request)
            .send()
            .await?;
        Self::check_status(resp).await
    }
}

#[async_trait]
impl MessagesApi for FoundryProvider {
    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn create_message(
        &self,
        request: &MessagesRequest,
        betas: &[&str],
    ) -> Result<MessagesResponse, ProviderError> {
        let resp = self.post_messages(request, betas).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn stream_message(
        &self,
        request: &MessagesRequest,
        betas: &[&str],
    ) -> Result<UpstreamStream, ProviderError> {
        let mut request = request.clone();
        request.stream = true;
        let resp = self.post_messages(&request, betas).await?;
        Ok(Box::pin(decode_upstream(resp.bytes_stream())))
    }

    async fn upload_file(
        &self,
        filename: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<String, ProviderError> {
        let part = reqwest::multipart::Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .authorize(self.client.post(self.url("/v1/files")), &[FILES_API_BETA])
            .multipart(form)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let data: serde_json::Value = resp.json().await?;
        let file_id = data["id"]
            .as_str()
            .ok_or_else(|| ProviderError::Decode("No id in Files API response".to_string()))?;
        tracing::info!("[UPSTREAM] 文件已上传: {} -> {}", filename, file_id);
        Ok(file_id.to_string())
    }

    async fn download_file(&self, file_id: &str) -> Result<Bytes, ProviderError> {
        let path = format!("/v1/files/{}/content", urlencoding::encode(file_id));
        let resp = self
            .authorize(self.client.get(self.url(&path)), &[FILES_API_BETA])
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> FoundryProvider {
        FoundryProvider::new(
            ProviderConfig {
                endpoint: "https://example.services.ai.azure.com/anthropic".to_string(),
                api_key: "secret".to_string(),
                model: "claude-sonnet-4-5".to_string(),
            },
            &UpstreamConfig::default(),
        )
    }

    #[test]
    fn test_url_joins_endpoint() {
        assert_eq!(
            provider().url("/v1/messages"),
            "https://example.services.ai.azure.com/anthropic/v1/messages"
        );
    }

    #[test]
    fn test_headers() {
        let p = provider();
        let req = p
            .authorize(p.client.post(p.url("/v1/messages")), &["a-1", "b-2"])
            .build()
            .unwrap();
        assert_eq!(req.headers()["x-api-key"], "secret");
        assert_eq!(req.headers()["anthropic-version"], "2023-06-01");
        assert_eq!(req.headers()["anthropic-beta"], "a-1,b-2");

        let req = p
            .authorize(p.client.get(p.url("/v1/files")), &[])
            .build()
            .unwrap();
        assert!(req.headers().get("anthropic-beta").is_none());
    }

    #[test]
    fn test_model() {
        assert_eq!(provider().model(), "claude-sonnet-4-5");
    }
}
