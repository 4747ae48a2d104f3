use async_trait::async_trait;
use interview_core::Clock;
use interview_core::analysis::AnalysisContext;
use interview_core::model::PromptVariant;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{AnalysisService, Completion, SynthesisService, TokenUsage};
use crate::config::WorkflowConfig;
use crate::error::AiError;

const PROVIDER: &str = "workflow";
const MODEL: &str = "workflow";
const USER: &str = "interview";

/// Client for a hosted workflow runner exposing `POST /workflows/run`.
///
/// Analysis and wiki synthesis are separate workflows, each addressed by its
/// own API key. Wiki workflows receive the prompt id and keep their own prompts.
#[derive(Clone)]
pub struct WorkflowClient {
    client: Client,
    config: WorkflowConfig,
    clock: Clock,
}

impl WorkflowClient {
    /// # Errors
    ///
    /// Returns `AiError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: WorkflowConfig,
        timeout: std::time::Duration,
        clock: Clock,
    ) -> Result<Self, AiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            clock,
        })
    }

    async fn run(&self, key: Option<&str>, inputs: Value) -> Result<WorkflowData, AiError> {
        let key = key.ok_or(AiError::Disabled)?;
        let url = format!(
            "{}/workflows/run",
            self.config.base_url.as_str().trim_end_matches('/')
        );
        let payload = WorkflowRequest {
            response_mode: "blocking",
            user: USER,
            inputs,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::HttpStatus(response.status()));
        }

        let body: WorkflowResponse = response.json().await?;
        Ok(body.data)
    }
}

fn bullet_lines(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn completion(data: WorkflowData, field: &str) -> Result<Completion, AiError> {
    let content = data
        .outputs
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(AiError::EmptyResponse)?;
    Ok(Completion {
        content: content.to_string(),
        model: MODEL.to_string(),
        usage: data.total_tokens.map(|total| TokenUsage {
            total_tokens: total,
            ..TokenUsage::default()
        }),
    })
}

#[async_trait]
impl AnalysisService for WorkflowClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        MODEL
    }

    async fn analyse(&self, context: &AnalysisContext) -> Result<Completion, AiError> {
        let inputs = json!({
            "business_segment": context.business_segment,
            "question": context.current_question,
            "message": context.answer,
            "history": context.history.join("\n"),
            "mandatory_upcoming_questions": bullet_lines(&context.unanswered_mandatory),
            "optional_upcoming_questions": bullet_lines(&context.unanswered_optional),
            "skipped_questions": bullet_lines(&context.skipped),
        });
        let data = self
            .run(self.config.analysis_key.as_deref(), inputs)
            .await?;
        completion(data, "text")
    }
}

#[async_trait]
impl SynthesisService for WorkflowClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        MODEL
    }

    async fn synthesize(
        &self,
        prompt: &PromptVariant,
        business_segment: &str,
        conversation: &str,
    ) -> Result<Completion, AiError> {
        let inputs = json!({
            "interview": conversation,
            "prompt_id": prompt.id.as_str(),
            "business_segment": business_segment,
            "date": self.clock.now().format("%Y-%m-%dT%H:%M").to_string(),
        });
        let data = self.run(self.config.wiki_key.as_deref(), inputs).await?;
        completion(data, "markdown")
    }
}

#[derive(Debug, Serialize)]
struct WorkflowRequest {
    response_mode: &'static str,
    user: &'static str,
    inputs: Value,
}

#[derive(Debug, Deserialize)]
struct WorkflowResponse {
    data: WorkflowData,
}

#[derive(Debug, Deserialize)]
struct WorkflowData {
    #[serde(default)]
    outputs: serde_json::Map<String, Value>,
    total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(raw: &str) -> WorkflowData {
        serde_json::from_str::<WorkflowResponse>(raw).unwrap().data
    }

    #[test]
    fn reads_named_output_and_tokens() {
        let parsed = completion(
            data(r#"{"data":{"outputs":{"text":" {\"a\":1} "},"total_tokens":42}}"#),
            "text",
        )
        .unwrap();
        assert_eq!(parsed.content, "{\"a\":1}");
        assert_eq!(parsed.usage.map(|u| u.total_tokens), Some(42));
    }

    #[test]
    fn missing_output_is_empty_response() {
        let result = completion(data(r#"{"data":{"outputs":{}}}"#), "markdown");
        assert!(matches!(result, Err(AiError::EmptyResponse)));
    }
}
