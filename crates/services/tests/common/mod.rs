#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use interview_core::analysis::AnalysisContext;
use interview_core::model::{AudioRef, PromptVariant};
use interview_core::time::fixed_clock;
use services::ai::{AnalysisService, Completion, SpeechToText, SynthesisService, TextToSpeech, TokenUsage};
use services::prompt_assignment::PromptPool;
use services::{AiClients, AiError, AppServices, Job, JobDispatcher, JobError, RetryPolicy, ServiceConfig};
use storage::repository::Storage;

pub const EMPTY_ANALYSIS: &str =
    r#"{"concepts":[],"additional_questions":[],"removed_optional_questions":[],"notes":""}"#;

pub fn analysis_json(additions: &[&str], removals: &[&str]) -> String {
    serde_json::json!({
        "concepts": ["team"],
        "additional_questions": additions,
        "removed_optional_questions": removals,
        "notes": "",
    })
    .to_string()
}

/// Returns queued outputs in order, then an empty analysis.
#[derive(Default)]
pub struct ScriptedAnalysis {
    outputs: Mutex<VecDeque<String>>,
    pub contexts: Mutex<Vec<AnalysisContext>>,
}

impl ScriptedAnalysis {
    pub fn push(&self, raw: impl Into<String>) {
        self.outputs.lock().unwrap().push_back(raw.into());
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysis {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-analysis"
    }

    async fn analyse(&self, context: &AnalysisContext) -> Result<Completion, AiError> {
        self.contexts.lock().unwrap().push(context.clone());
        let content = self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| EMPTY_ANALYSIS.to_string());
        Ok(Completion {
            content,
            model: "fake-analysis".into(),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

/// Produces a fenced markdown wiki per prompt; listed prompt ids fail.
#[derive(Default)]
pub struct FakeSynthesis {
    pub failing: Mutex<HashSet<String>>,
    pub conversations: Mutex<Vec<String>>,
}

impl FakeSynthesis {
    pub fn fail_for(&self, prompt_id: &str) {
        self.failing.lock().unwrap().insert(prompt_id.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl SynthesisService for FakeSynthesis {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-wiki"
    }

    async fn synthesize(
        &self,
        prompt: &PromptVariant,
        business_segment: &str,
        conversation: &str,
    ) -> Result<Completion, AiError> {
        self.conversations
            .lock()
            .unwrap()
            .push(conversation.to_string());
        if self.failing.lock().unwrap().contains(prompt.id.as_str()) {
            return Err(AiError::EmptyResponse);
        }
        Ok(Completion {
            content: format!(
                "```markdown\n# Wiki {} ({business_segment})\n\n{conversation}\n```",
                prompt.id
            ),
            model: "fake-wiki".into(),
            usage: None,
        })
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    pub rendered: Mutex<Vec<AudioRef>>,
}

#[async_trait]
impl TextToSpeech for FakeSpeech {
    async fn synthesize_speech(&self, _text: &str, target: &AudioRef) -> Result<AudioRef, AiError> {
        self.rendered.lock().unwrap().push(target.clone());
        Ok(target.clone())
    }
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<String, AiError> {
        Ok("spoken words".into())
    }
}

/// Collects enqueued jobs without running them.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub jobs: Mutex<Vec<Job>>,
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn enqueue(&self, job: Job) -> Result<(), JobError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

pub struct Harness {
    pub app: AppServices,
    pub storage: Storage,
    pub analysis: Arc<ScriptedAnalysis>,
    pub synthesis: Arc<FakeSynthesis>,
    pub speech: Arc<FakeSpeech>,
}

pub fn config() -> ServiceConfig {
    let mut config = ServiceConfig::from_lookup(|_| None).unwrap();
    config.jobs.retry = RetryPolicy::immediate(1);
    config
}

pub fn harness(pool_size: usize) -> Harness {
    let storage = Storage::in_memory();
    let analysis = Arc::new(ScriptedAnalysis::default());
    let synthesis = Arc::new(FakeSynthesis::default());
    let speech = Arc::new(FakeSpeech::default());
    let clients = AiClients {
        analysis: analysis.clone(),
        synthesis: synthesis.clone(),
        transcriber: speech.clone(),
        speech: speech.clone(),
    };
    let app = AppServices::assemble(
        storage.clone(),
        clients,
        PromptPool::numbered("wiki", pool_size),
        &config(),
        fixed_clock(),
    );
    Harness {
        app,
        storage,
        analysis,
        synthesis,
        speech,
    }
}
