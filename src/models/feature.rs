//! 功能注册表
//!
//! 前端下拉框展示的功能描述，以及 Relay 可运行的功能集合。
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubFeature {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_placeholder: Option<String>,
}

/// 功能描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default)]
    pub has_input: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_file_upload: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub input_read_only: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclusive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_features: Vec<SubFeature>,
}

impl FeatureDescriptor {
    fn new(id: &str, name: &str, category: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            available_on: None,
            scenario: None,
            has_input: true,
            has_file_upload: false,
            input_read_only: false,
            exclusive: true,
            input_label: None,
            input_placeholder: None,
            sub_features: Vec::new(),
        }
    }

    fn input(mut self, label: &str, placeholder: &str) -> Self {
        self.input_label = Some(label.to_string());
        self.input_placeholder = Some(placeholder.to_string());
        self
    }

    /// 查找子功能
    pub fn sub_feature(&self, id: &str) -> Option<&SubFeature> {
        self.sub_features.iter().find(|s| s.id == id)
    }
}

static FEATURES: Lazy<Vec<FeatureDescriptor>> = Lazy::new(|| {
    let mut web_search = FeatureDescriptor::new(
        "web_search",
        "🔍 Web Search",
        "Tools",
        "Ask Claude a question and it will search the web for up-to-date information before answering.",
    )
    .input("Ask a question", "What is Microsoft Foundry?");
    web_search.exclusive = false;
    web_search.available_on = Some("Available on Microsoft Foundry and Google Vertex only".to_string());

    let web_fetch = FeatureDescriptor::new(
        "web_fetch",
        "🌐 Web Fetch",
        "Tools",
        "Retrieve full content from web pages and PDF documents for in-depth analysis without custom scraping infrastructure.",
    )
    .input(
        "Enter a URL to analyze",
        "Please analyze the content at https://learn.microsoft.com/en-us/azure/ai-foundry/what-is-foundry",
    );

    let mut files_api = FeatureDescriptor::new(
        "files_api",
        "📎 Files API",
        "Core",
        "Upload files once and reference across unlimited API calls. Reduces bandwidth costs by up to 90% for document-heavy applications.",
    )
    .input(
        "Ask a question about the uploaded file",
        "Please summarize this document for me.",
    );
    files_api.has_file_upload = true;

    let mut code_execution = FeatureDescriptor::new(
        "code_execution",
        "💻 Code Execution and Programmatic Tool Calling",
        "Tools",
        "Run Python in sandboxed environments for data analysis without external infrastructure. With PTC, Claude calls tools directly from code containers, reducing token use and latency.",
    )
    .input(
        "Ask a question about team expenses. Click on the scenario button to understand more on the context.",
        "Which engineering team members exceeded their Q3 travel budget? Standard quarterly travel budget is $5,000. However, some employees have custom budget limits. For anyone who exceeded the $5,000 standard budget, check if they have a custom budget exception.",
    );
    code_execution.input_read_only = true;
    code_execution.scenario = Some(
        "We need to analyze team expenses and identify which employees have exceeded their budgets. \
         Instead of pulling expense reports by hand, Claude uses the available tools to retrieve team data, \
         fetch expense line items with rich metadata, and determine who has gone over budget."
            .to_string(),
    );

    let mut prompt_caching = FeatureDescriptor::new(
        "prompt_caching",
        "⚡ Prompt Caching",
        "Core",
        "See how 1-hour prompt caching reduces latency and cost on repeated queries. Extended cache duration supports intermittent workloads (6-60 minute intervals).",
    )
    .input(
        "Question",
        "Revenue in 2025? Only return the value using Microsoft Annual report 2025",
    );
    prompt_caching.input_read_only = true;

    let mut skills = FeatureDescriptor::new(
        "skills",
        "🛠️ Document Generation",
        "Agent Skills",
        "Build agents that create Word documents and PDFs programmatically through API calls.",
    )
    .input(
        "Describe the document you want",
        "Write a 2-page report on the benefits of agentic AI architecture",
    );
    skills.sub_features = vec![
        SubFeature {
            id: "generate_docx".to_string(),
            name: "📄 Word Document".to_string(),
            description: "Generate a .docx file".to_string(),
            input_placeholder: Some(
                "Write a 2-page report on the benefits of agentic AI architecture".to_string(),
            ),
        },
        SubFeature {
            id: "generate_pdf".to_string(),
            name: "📕 PDF Document".to_string(),
            description: "Generate a .pdf file".to_string(),
            input_placeholder: Some("Generate a PDF invoice template".to_string()),
        },
    ];

    vec![
        web_search,
        web_fetch,
        files_api,
        code_execution,
        prompt_caching,
        skills,
    ]
});

/// 全部功能描述
pub fn all_features() -> &'static [FeatureDescriptor] {
    &FEATURES
}

/// 按 ID 查找功能描述
pub fn find_feature(id: &str) -> Option<&'static FeatureDescriptor> {
    FEATURES.iter().find(|f| f.id == id)
}

/// 可配置的模型部署名称
pub const AVAILABLE_MODELS: &[&str] = &[
    "claude-opus-4-5",
    "claude-sonnet-4-5",
    "claude-opus-4-6",
    "claude-haiku-4-5",
    "claude-opus-4-1",
];

/// Relay 可运行的功能
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnableFeature {
    WebSearch,
    WebFetch,
    FilesApi,
    CodeExecution,
    PromptCaching,
    GenerateDocx,
    GeneratePdf,
}

impl RunnableFeature {
    pub const ALL: [RunnableFeature; 7] = [
        RunnableFeature::WebSearch,
        RunnableFeature::WebFetch,
        RunnableFeature::FilesApi,
        RunnableFeature::CodeExecution,
        RunnableFeature::PromptCaching,
        RunnableFeature::GenerateDocx,
        RunnableFeature::GeneratePdf,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            RunnableFeature::WebSearch => "web_search",
            RunnableFeature::WebFetch => "web_fetch",
            RunnableFeature::FilesApi => "files_api",
            RunnableFeature::CodeExecution => "code_execution",
            RunnableFeature::PromptCaching => "prompt_caching",
            RunnableFeature::GenerateDocx => "generate_docx",
            RunnableFeature::GeneratePdf => "generate_pdf",
        }
    }
}

impl FromStr for RunnableFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunnableFeature::ALL
            .into_iter()
            .find(|f| f.id() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for RunnableFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids_are_unique() {
        let mut ids: Vec<&str> = all_features().iter().map(|f| f.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), all_features().len());
    }

    #[test]
    fn test_every_runnable_is_reachable_from_registry() {
        for runnable in RunnableFeature::ALL {
            let direct = find_feature(runnable.id()).is_some();
            let nested = all_features()
                .iter()
                .any(|f| f.sub_feature(runnable.id()).is_some());
            assert!(direct || nested, "{runnable} missing from registry");
        }
    }

    #[test]
    fn test_skills_is_not_runnable() {
        assert!("skills".parse::<RunnableFeature>().is_err());
        assert_eq!(
            "generate_pdf".parse::<RunnableFeature>(),
            Ok(RunnableFeature::GeneratePdf)
        );
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let json = serde_json::to_value(find_feature("files_api").unwrap()).unwrap();
        assert_eq!(json["hasFileUpload"], true);
        assert_eq!(json["hasInput"], true);
        assert!(json.get("inputReadOnly").is_none());
    }
}
