//! Agent Skills 文档生成（docx / pdf）

use super::{timed, EventStream, RelayContext};
use crate::models::{Message, MessagesRequest, StreamEvent};
use serde_json::json;

const BETAS: &[&str] = &["code-execution-2025-08-25", "skills-2025-10-02"];
const MAX_TOKENS: u32 = 16384;

/// Skill 与输出扩展名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSkill {
    Docx,
    Pdf,
}

impl DocumentSkill {
    pub fn skill_id(&self) -> &'static str {
        match self {
            DocumentSkill::Docx => "docx",
            DocumentSkill::Pdf => "pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.skill_id()
    }

    fn request(&self, model: &str, input: String) -> MessagesRequest {
        MessagesRequest::new(model, MAX_TOKENS, vec![Message::user(input)])
            .with_tools(vec![json!({
                "type": "code_execution_20250825",
                "name": "code_execution",
            })])
            .with_container(json!({
                "skills": [
                    {"type": "anthropic", "skill_id": self.skill_id(), "version": "latest"}
                ]
            }))
    }
}

pub fn run_skill(ctx: RelayContext, skill: DocumentSkill, input: String) -> EventStream {
    Box::pin(async_stream::try_stream! {
        let ext = skill.extension();
        let upper = ext.to_uppercase();
        yield StreamEvent::status(format!("⏳ Claude is generating your {upper} file..."));

        let idle = ctx.idle_timeout();
        let request = skill.request(ctx.provider.model(), input);
        let response = timed(idle, ctx.provider.create_message(&request, BETAS)).await?;

        for text in response.texts() {
            yield StreamEvent::token(format!("{text}\n"));
        }

        yield StreamEvent::status("📥 Extracting generated file...");

        match response.generated_file_id() {
            Some(file_id) => {
                tracing::info!("[RELAY] 下载生成文件: {}", file_id);
                let content = timed(idle, ctx.provider.download_file(&file_id)).await?;
                let filename = ctx.outputs.save(ext, &content).await?;
                yield StreamEvent::file(filename, ext);
                yield StreamEvent::done(format!("✅ {upper} file generated successfully!"));
            }
            None => {
                tracing::warn!("[RELAY] 响应中没有生成文件 (stop_reason={:?})", response.stop_reason);
                yield StreamEvent::error("Could not extract file from response.");
                yield StreamEvent::done("⚠️ No file was produced.");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_request_shape() {
        let request = DocumentSkill::Pdf.request("claude-sonnet-4-5", "invoice".to_string());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["max_tokens"], 16384);
        assert_eq!(body["container"]["skills"][0]["skill_id"], "pdf");
        assert_eq!(body["tools"][0]["type"], "code_execution_20250825");
        assert!(body.get("stream").is_none());
    }
}
