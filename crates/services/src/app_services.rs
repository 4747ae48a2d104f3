use std::sync::{Arc, Mutex, PoisonError};

use storage::repository::Storage;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::Clock;
use crate::ai::{
    AiUsageService, AnalysisService, CompletionAnalysis, CompletionService, CompletionSynthesis,
    DisabledAi, OpenAiClient, SpeechToText, SynthesisService, TextToSpeech, WorkflowClient,
    openai,
};
use crate::config::ServiceConfig;
use crate::error::{AiError, AppServicesError};
use crate::interview_service::InterviewService;
use crate::jobs::{FailedJob, JobDispatcher, TokioJobQueue};
use crate::locks::InterviewLocks;
use crate::pipelines::{AudioPipeline, FollowupPipeline, PipelineRouter, WikiPipeline};
use crate::prompt_assignment::{PromptAssignment, PromptPool};
use crate::template_service::TemplateService;
use crate::wiki_service::WikiService;

/// Provider handles the pipelines and services run against.
#[derive(Clone)]
pub struct AiClients {
    pub analysis: Arc<dyn AnalysisService>,
    pub synthesis: Arc<dyn SynthesisService>,
    pub transcriber: Arc<dyn SpeechToText>,
    pub speech: Arc<dyn TextToSpeech>,
}

impl AiClients {
    /// Every call fails as disabled.
    #[must_use]
    pub fn disabled() -> Self {
        let completion: Arc<dyn CompletionService> = Arc::new(DisabledAi);
        Self {
            analysis: Arc::new(CompletionAnalysis::new(Arc::clone(&completion), "disabled")),
            synthesis: Arc::new(CompletionSynthesis::new(completion, "disabled")),
            transcriber: Arc::new(DisabledAi),
            speech: Arc::new(DisabledAi),
        }
    }

    /// OpenAI-compatible clients when an API key is set, with analysis and
    /// wiki synthesis moved to the workflow runner for each configured key.
    ///
    /// # Errors
    ///
    /// Returns `AiError` if an HTTP client cannot be built.
    pub fn from_config(config: &ServiceConfig, clock: Clock) -> Result<Self, AiError> {
        let mut clients = match &config.ai {
            Some(ai) => {
                let client = Arc::new(OpenAiClient::new(ai.clone(), &config.audio_root)?);
                let completion: Arc<dyn CompletionService> = client.clone();
                info!(base_url = %ai.base_url, "AI provider configured");
                Self {
                    analysis: Arc::new(CompletionAnalysis::new(
                        Arc::clone(&completion),
                        ai.analysis_model.clone(),
                    )),
                    synthesis: Arc::new(CompletionSynthesis::new(
                        completion,
                        ai.wiki_model.clone(),
                    )),
                    transcriber: client.clone(),
                    speech: client,
                }
            }
            None => {
                warn!("no AI API key set, AI-backed steps are disabled");
                Self::disabled()
            }
        };

        if let Some(workflow) = &config.workflow {
            let client = Arc::new(WorkflowClient::new(
                workflow.clone(),
                config.ai_timeout,
                clock,
            )?);
            if workflow.analysis_key.is_some() {
                clients.analysis = client.clone();
            }
            if workflow.wiki_key.is_some() {
                clients.synthesis = client;
            }
            info!(base_url = %workflow.base_url, "workflow runner configured");
        }

        Ok(clients)
    }
}

/// Wiki prompts from the configured directory, else a numbered pool.
///
/// # Errors
///
/// Returns `std::io::Error` if the prompt directory cannot be read.
pub async fn prompt_pool(config: &ServiceConfig) -> Result<PromptPool, std::io::Error> {
    if let Some(dir) = &config.prompt_dir {
        return PromptPool::load_dir("local", dir).await;
    }
    let workflow_wiki = config
        .workflow
        .as_ref()
        .is_some_and(|w| w.wiki_key.is_some());
    let label = if workflow_wiki { "workflow" } else { "numbered" };
    Ok(PromptPool::numbered(label, config.prompt_pool_size))
}

/// Composition root: owns storage, the job queue and every service.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    queue: TokioJobQueue,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    usage: AiUsageService,
    templates: Arc<TemplateService>,
    interviews: Arc<InterviewService>,
    wikis: Arc<WikiService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage, AI clients or prompts cannot be
    /// initialized.
    pub async fn from_config(
        config: &ServiceConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.db_url).await?;
        let clients = AiClients::from_config(config, clock)?;
        let pool = prompt_pool(config).await?;
        let services = Self::assemble(storage, clients, pool, config, clock);
        if let Some(ai) = &config.ai {
            let added = services
                .usage
                .price_book()
                .seed_missing(openai::PROVIDER, &ai.prices)
                .await?;
            if added > 0 {
                info!(added, "seeded model prices");
            }
        }
        Ok(services)
    }

    /// Wire services over existing parts and start the job worker.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn assemble(
        storage: Storage,
        clients: AiClients,
        pool: PromptPool,
        config: &ServiceConfig,
        clock: Clock,
    ) -> Self {
        let locks = InterviewLocks::new();
        let (queue, worker) = TokioJobQueue::new(config.jobs.clone());
        let dispatcher: Arc<dyn JobDispatcher> = Arc::new(queue.clone());

        let usage = AiUsageService::new(
            clock,
            Arc::clone(&storage.ai_usage),
            Arc::clone(&storage.ai_price_book),
        );
        let prompts = Arc::new(PromptAssignment::new(
            pool,
            Arc::clone(&storage.prompt_usage),
        ));

        let followup = FollowupPipeline::new(
            storage.clone(),
            clients.analysis,
            usage.clone(),
            Arc::clone(&dispatcher),
            locks.clone(),
            clock,
        );
        let audio = AudioPipeline::new(storage.clone(), clients.speech);
        let wiki_pipeline = WikiPipeline::new(
            storage.clone(),
            clients.synthesis,
            usage.clone(),
            prompts,
            config.wiki_variants,
            clock,
        );
        let handle = worker.spawn(Arc::new(PipelineRouter::new(followup, audio)));

        let templates = Arc::new(TemplateService::new(
            clock,
            Arc::clone(&storage.templates),
            Arc::clone(&dispatcher),
        ));
        let interviews = Arc::new(InterviewService::new(
            storage.clone(),
            clients.transcriber,
            dispatcher,
            wiki_pipeline,
            locks.clone(),
            clock,
        ));
        let wikis = Arc::new(WikiService::new(storage.clone(), locks, clock));

        Self {
            storage,
            queue,
            worker: Arc::new(Mutex::new(Some(handle))),
            usage,
            templates,
            interviews,
            wikis,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn templates(&self) -> Arc<TemplateService> {
        Arc::clone(&self.templates)
    }

    #[must_use]
    pub fn interviews(&self) -> Arc<InterviewService> {
        Arc::clone(&self.interviews)
    }

    #[must_use]
    pub fn wikis(&self) -> Arc<WikiService> {
        Arc::clone(&self.wikis)
    }

    #[must_use]
    pub fn usage(&self) -> &AiUsageService {
        &self.usage
    }

    #[must_use]
    pub fn queue(&self) -> &TokioJobQueue {
        &self.queue
    }

    /// Jobs that exhausted their retries or failed terminally.
    #[must_use]
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.queue.failed_jobs()
    }

    /// Stop the queue and wait for running jobs to finish.
    pub async fn shutdown(&self) {
        self.queue.shutdown();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "job worker ended abnormally");
            }
        }
    }
}
