use std::path::{Path, PathBuf};

use async_trait::async_trait;
use interview_core::model::AudioRef;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Completion, CompletionRequest, CompletionService, SpeechToText, TextToSpeech, TokenUsage,
};
use crate::config::AiConfig;
use crate::error::AiError;

pub(crate) const PROVIDER: &str = "openai";

/// Client for OpenAI-compatible chat, transcription and speech endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: AiConfig,
    audio_root: PathBuf,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns `AiError::Http` if the HTTP client cannot be built.
    pub fn new(config: AiConfig, audio_root: impl Into<PathBuf>) -> Result<Self, AiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            audio_root: audio_root.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{path}",
            self.config.base_url.as_str().trim_end_matches('/')
        )
    }

    fn audio_path(&self, audio: &AudioRef) -> PathBuf {
        self.audio_root.join(audio.as_str())
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, AiError> {
        let payload = ChatRequest {
            model: request.model,
            messages: vec![ChatMessage {
                role: request.role.as_str(),
                content: request.content,
            }],
            temperature: 0.2,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AiError::EmptyResponse)?;

        Ok(Completion {
            content: content.trim().to_string(),
            model: body.model,
            usage: body.usage.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(&self, audio: &AudioRef) -> Result<String, AiError> {
        let path = self.audio_path(audio);
        let bytes = tokio::fs::read(&path).await?;
        let file_name = file_name(&path);

        let form = Form::new()
            .text("model", self.config.transcribe_model.clone())
            .text("response_format", "text")
            .text("language", self.config.language.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::HttpStatus(response.status()));
        }

        let text = response.text().await?;
        debug!(audio = %audio, chars = text.len(), "transcribed audio");
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl TextToSpeech for OpenAiClient {
    async fn synthesize_speech(&self, text: &str, target: &AudioRef) -> Result<AudioRef, AiError> {
        let payload = SpeechRequest {
            model: &self.config.speech_model,
            input: text,
            voice: &self.config.speech_voice,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(self.endpoint("audio/speech"))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::HttpStatus(response.status()));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(AiError::EmptyResponse);
        }

        let path = self.audio_path(target);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!(audio = %target, bytes = bytes.len(), "stored synthesized audio");
        Ok(target.clone())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("audio.mp3")
        .to_string()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}
