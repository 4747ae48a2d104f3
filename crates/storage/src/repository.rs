use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interview_core::ProgressTracker;
use interview_core::model::{
    ADDITIONAL_ORDER_START, AdditionalQuestion, AdditionalQuestionId, AudioRef, Category,
    InterviewId, NewAdditionalQuestion, NewRating, NewResponse, NewWiki, PromptId, Question,
    QuestionId, Rating, RatingId, Response, ResponseId, RunningInterview, Template, TemplateDraft,
    TemplateId, Wiki, WikiId, select_least_used,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── AI USAGE RECORDS ──────────────────────────────────────────────────────────
//

/// What a provider call was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsagePurpose {
    Analysis,
    Wiki,
    Transcription,
    Speech,
}

impl UsagePurpose {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UsagePurpose::Analysis => "analysis",
            UsagePurpose::Wiki => "wiki",
            UsagePurpose::Transcription => "transcription",
            UsagePurpose::Speech => "speech",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "analysis" => Some(UsagePurpose::Analysis),
            "wiki" => Some(UsagePurpose::Wiki),
            "transcription" => Some(UsagePurpose::Transcription),
            "speech" => Some(UsagePurpose::Speech),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiUsageStatus {
    Started,
    Succeeded,
    Failed,
}

impl AiUsageStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AiUsageStatus::Started => "started",
            AiUsageStatus::Succeeded => "succeeded",
            AiUsageStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "started" => Some(AiUsageStatus::Started),
            "succeeded" => Some(AiUsageStatus::Succeeded),
            "failed" => Some(AiUsageStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAiUsageRecord {
    pub interview_id: Option<InterviewId>,
    pub purpose: UsagePurpose,
    pub provider: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AiUsageCompletion {
    pub status: AiUsageStatus,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub cost_micro_usd: Option<u64>,
    pub raw_output: Option<String>,
}

impl AiUsageCompletion {
    #[must_use]
    pub fn failed(raw_output: Option<String>) -> Self {
        Self {
            status: AiUsageStatus::Failed,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            cost_micro_usd: None,
            raw_output,
        }
    }
}

/// Persisted usage row for one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiUsageRecord {
    pub id: i64,
    pub interview_id: Option<InterviewId>,
    pub purpose: UsagePurpose,
    pub provider: String,
    pub model: String,
    pub status: AiUsageStatus,
    pub total_tokens: Option<u32>,
    pub cost_micro_usd: Option<u64>,
    pub raw_output: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiPriceBookEntry {
    pub provider: String,
    pub model: String,
    pub input_micro_usd_per_million: u64,
    pub output_micro_usd_per_million: u64,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Persist a draft, assigning ids, category positions and a running question order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the template cannot be stored.
    async fn create_template(
        &self,
        draft: &TemplateDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Template, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist.
    async fn set_question_audio(
        &self,
        question_id: QuestionId,
        audio: &AudioRef,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait InterviewRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the interview cannot be stored.
    async fn create_interview(
        &self,
        template_id: TemplateId,
        tracker: &ProgressTracker,
        created_at: DateTime<Utc>,
    ) -> Result<RunningInterview, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn get_interview(&self, id: InterviewId)
    -> Result<Option<RunningInterview>, StorageError>;

    /// Store title, selected wiki and tracker of an existing interview.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the interview does not exist.
    async fn save_interview(&self, interview: &RunningInterview) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AdditionalQuestionRepository: Send + Sync {
    /// Insert with the next order number of the interview.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn insert_additional(
        &self,
        question: NewAdditionalQuestion,
    ) -> Result<AdditionalQuestion, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn get_additional(
        &self,
        id: AdditionalQuestionId,
    ) -> Result<Option<AdditionalQuestion>, StorageError>;

    /// All additional questions of an interview ordered by sequence number.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn list_additional(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<AdditionalQuestion>, StorageError>;

    /// Questions created from one triggering response, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn list_for_response(
        &self,
        response_id: ResponseId,
    ) -> Result<Vec<AdditionalQuestion>, StorageError>;

    /// First additional question of the interview whose text equals `text` exactly.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn find_by_text(
        &self,
        interview_id: InterviewId,
        text: &str,
    ) -> Result<Option<AdditionalQuestion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist.
    async fn set_additional_audio(
        &self,
        id: AdditionalQuestionId,
        audio: &AudioRef,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a non-skipped response already exists
    /// for the same question and the new one is not skipped.
    async fn insert_response(&self, response: NewResponse) -> Result<Response, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn get_response(&self, id: ResponseId) -> Result<Option<Response>, StorageError>;

    /// Responses of an interview in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn list_responses(&self, interview_id: InterviewId)
    -> Result<Vec<Response>, StorageError>;

    /// Keep the raw analysis output produced for a response.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the response does not exist.
    async fn record_analysis(&self, id: ResponseId, raw_output: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn analysis_output(&self, id: ResponseId) -> Result<Option<String>, StorageError>;
}

#[async_trait]
pub trait WikiRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the wiki cannot be stored.
    async fn insert_wiki(&self, wiki: NewWiki) -> Result<Wiki, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn get_wiki(&self, id: WikiId) -> Result<Option<Wiki>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the wiki does not exist.
    async fn update_content(&self, id: WikiId, content: &str) -> Result<(), StorageError>;

    /// Wikis of an interview, newest first then highest version first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn list_wikis(&self, interview_id: InterviewId) -> Result<Vec<Wiki>, StorageError>;

    /// Mark `wiki_id` as the only selected wiki of its interview.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the wiki does not belong to the interview.
    async fn select_wiki(
        &self,
        interview_id: InterviewId,
        wiki_id: WikiId,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the rating cannot be stored.
    async fn insert_rating(&self, rating: NewRating) -> Result<Rating, StorageError>;

    /// Ratings of an interview, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn list_ratings(&self, interview_id: InterviewId) -> Result<Vec<Rating>, StorageError>;
}

#[async_trait]
pub trait AiUsageRepository: Send + Sync {
    /// Open a usage row before the provider call.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn insert_started(&self, record: NewAiUsageRecord) -> Result<i64, StorageError>;

    /// Close a usage row with the call outcome.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row does not exist.
    async fn update_completion(
        &self,
        id: i64,
        completion: AiUsageCompletion,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn list_usage(&self, interview_id: InterviewId)
    -> Result<Vec<AiUsageRecord>, StorageError>;
}

#[async_trait]
pub trait AiPriceBookRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn get_entry(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<Option<AiPriceBookEntry>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn upsert_entry(&self, entry: &AiPriceBookEntry) -> Result<(), StorageError>;
}

#[async_trait]
pub trait PromptUsageRepository: Send + Sync {
    /// Select the `n` least-used candidates of `pool` and increment their counters.
    ///
    /// Read, selection and increment happen in one critical section.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn take_least_used(
        &self,
        pool: &str,
        candidates: &[PromptId],
        n: usize,
    ) -> Result<Vec<PromptId>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    async fn usage_counts(&self, pool: &str) -> Result<HashMap<PromptId, u64>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone)]
pub struct InMemoryRepository {
    next_id: Arc<AtomicU64>,
    templates: Arc<Mutex<HashMap<TemplateId, Template>>>,
    interviews: Arc<Mutex<HashMap<InterviewId, RunningInterview>>>,
    additional: Arc<Mutex<Vec<AdditionalQuestion>>>,
    responses: Arc<Mutex<Vec<Response>>>,
    analyses: Arc<Mutex<HashMap<ResponseId, String>>>,
    wikis: Arc<Mutex<Vec<Wiki>>>,
    ratings: Arc<Mutex<Vec<Rating>>>,
    usage: Arc<Mutex<Vec<AiUsageRecord>>>,
    prices: Arc<Mutex<Vec<AiPriceBookEntry>>>,
    prompt_usage: Arc<Mutex<HashMap<String, HashMap<PromptId, u64>>>>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            templates: Arc::default(),
            interviews: Arc::default(),
            additional: Arc::default(),
            responses: Arc::default(),
            analyses: Arc::default(),
            wikis: Arc::default(),
            ratings: Arc::default(),
            usage: Arc::default(),
            prices: Arc::default(),
            prompt_usage: Arc::default(),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl TemplateRepository for InMemoryRepository {
    async fn create_template(
        &self,
        draft: &TemplateDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Template, StorageError> {
        let template_id = TemplateId::new(self.allocate());
        let mut order = 0_u32;
        let mut categories = Vec::with_capacity(draft.categories().len());
        for (position, (name, texts)) in draft.categories().iter().enumerate() {
            let mut questions = Vec::with_capacity(texts.len());
            for text in texts {
                order += 1;
                questions.push(Question {
                    id: QuestionId::new(self.allocate()),
                    template_id,
                    text: text.clone(),
                    category: name.clone(),
                    order,
                    audio: None,
                });
            }
            categories.push(Category {
                name: name.clone(),
                position: u32::try_from(position)
                    .map_err(|_| StorageError::Serialization("too many categories".into()))?,
                questions,
            });
        }

        let template = Template::from_persisted(
            template_id,
            draft.title().map(str::to_owned),
            draft.business_segment().map(str::to_owned),
            categories,
            created_at,
        );
        self.templates
            .lock()
            .map_err(lock_err)?
            .insert(template_id, template.clone());
        Ok(template)
    }

    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>, StorageError> {
        let guard = self.templates.lock().map_err(lock_err)?;
        Ok(guard.get(&id).cloned())
    }

    async fn set_question_audio(
        &self,
        question_id: QuestionId,
        audio: &AudioRef,
    ) -> Result<(), StorageError> {
        let mut guard = self.templates.lock().map_err(lock_err)?;
        let template = guard
            .values()
            .find(|t| t.questions().any(|q| q.id == question_id))
            .ok_or(StorageError::NotFound)?;

        let mut categories = template.categories().to_vec();
        for question in categories.iter_mut().flat_map(|c| c.questions.iter_mut()) {
            if question.id == question_id {
                question.audio = Some(audio.clone());
            }
        }
        let updated = Template::from_persisted(
            template.id(),
            template.title().map(str::to_owned),
            Some(template.business_segment().to_owned()),
            categories,
            template.created_at(),
        );
        guard.insert(updated.id(), updated);
        Ok(())
    }
}

#[async_trait]
impl InterviewRepository for InMemoryRepository {
    async fn create_interview(
        &self,
        template_id: TemplateId,
        tracker: &ProgressTracker,
        created_at: DateTime<Utc>,
    ) -> Result<RunningInterview, StorageError> {
        let interview = RunningInterview {
            id: InterviewId::new(self.allocate()),
            template_id,
            title: None,
            selected_wiki: None,
            created_at,
            tracker: tracker.clone(),
        };
        self.interviews
            .lock()
            .map_err(lock_err)?
            .insert(interview.id, interview.clone());
        Ok(interview)
    }

    async fn get_interview(
        &self,
        id: InterviewId,
    ) -> Result<Option<RunningInterview>, StorageError> {
        let guard = self.interviews.lock().map_err(lock_err)?;
        Ok(guard.get(&id).cloned())
    }

    async fn save_interview(&self, interview: &RunningInterview) -> Result<(), StorageError> {
        let mut guard = self.interviews.lock().map_err(lock_err)?;
        let slot = guard.get_mut(&interview.id).ok_or(StorageError::NotFound)?;
        *slot = interview.clone();
        Ok(())
    }
}

#[async_trait]
impl AdditionalQuestionRepository for InMemoryRepository {
    async fn insert_additional(
        &self,
        question: NewAdditionalQuestion,
    ) -> Result<AdditionalQuestion, StorageError> {
        let mut guard = self.additional.lock().map_err(lock_err)?;
        let order = guard
            .iter()
            .filter(|q| q.interview_id == question.interview_id)
            .map(|q| q.order + 1)
            .max()
            .unwrap_or(ADDITIONAL_ORDER_START);
        let stored = AdditionalQuestion {
            id: AdditionalQuestionId::new(self.allocate()),
            interview_id: question.interview_id,
            text: question.text,
            category: question.category,
            order,
            triggering_response_id: question.triggering_response_id,
            audio: None,
        };
        guard.push(stored.clone());
        Ok(stored)
    }

    async fn get_additional(
        &self,
        id: AdditionalQuestionId,
    ) -> Result<Option<AdditionalQuestion>, StorageError> {
        let guard = self.additional.lock().map_err(lock_err)?;
        Ok(guard.iter().find(|q| q.id == id).cloned())
    }

    async fn list_additional(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<AdditionalQuestion>, StorageError> {
        let guard = self.additional.lock().map_err(lock_err)?;
        let mut found: Vec<AdditionalQuestion> = guard
            .iter()
            .filter(|q| q.interview_id == interview_id)
            .cloned()
            .collect();
        found.sort_by_key(|q| q.order);
        Ok(found)
    }

    async fn list_for_response(
        &self,
        response_id: ResponseId,
    ) -> Result<Vec<AdditionalQuestion>, StorageError> {
        let guard = self.additional.lock().map_err(lock_err)?;
        let mut found: Vec<AdditionalQuestion> = guard
            .iter()
            .filter(|q| q.triggering_response_id == response_id)
            .cloned()
            .collect();
        found.sort_by_key(|q| q.order);
        Ok(found)
    }

    async fn find_by_text(
        &self,
        interview_id: InterviewId,
        text: &str,
    ) -> Result<Option<AdditionalQuestion>, StorageError> {
        let guard = self.additional.lock().map_err(lock_err)?;
        Ok(guard
            .iter()
            .filter(|q| q.interview_id == interview_id && q.text == text)
            .min_by_key(|q| q.order)
            .cloned())
    }

    async fn set_additional_audio(
        &self,
        id: AdditionalQuestionId,
        audio: &AudioRef,
    ) -> Result<(), StorageError> {
        let mut guard = self.additional.lock().map_err(lock_err)?;
        let question = guard
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(StorageError::NotFound)?;
        question.audio = Some(audio.clone());
        Ok(())
    }
}

#[async_trait]
impl ResponseRepository for InMemoryRepository {
    async fn insert_response(&self, response: NewResponse) -> Result<Response, StorageError> {
        let mut guard = self.responses.lock().map_err(lock_err)?;
        let duplicate = !response.skipped
            && guard.iter().any(|r| {
                r.interview_id == response.interview_id
                    && r.question_ref == response.question_ref
                    && !r.skipped
            });
        if duplicate {
            return Err(StorageError::Conflict);
        }
        let stored = Response::from_new(ResponseId::new(self.allocate()), response);
        guard.push(stored.clone());
        Ok(stored)
    }

    async fn get_response(&self, id: ResponseId) -> Result<Option<Response>, StorageError> {
        let guard = self.responses.lock().map_err(lock_err)?;
        Ok(guard.iter().find(|r| r.id == id).cloned())
    }

    async fn list_responses(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<Response>, StorageError> {
        let guard = self.responses.lock().map_err(lock_err)?;
        Ok(guard
            .iter()
            .filter(|r| r.interview_id == interview_id)
            .cloned()
            .collect())
    }

    async fn record_analysis(&self, id: ResponseId, raw_output: &str) -> Result<(), StorageError> {
        if !self
            .responses
            .lock()
            .map_err(lock_err)?
            .iter()
            .any(|r| r.id == id)
        {
            return Err(StorageError::NotFound);
        }
        self.analyses
            .lock()
            .map_err(lock_err)?
            .insert(id, raw_output.to_owned());
        Ok(())
    }

    async fn analysis_output(&self, id: ResponseId) -> Result<Option<String>, StorageError> {
        Ok(self.analyses.lock().map_err(lock_err)?.get(&id).cloned())
    }
}

#[async_trait]
impl WikiRepository for InMemoryRepository {
    async fn insert_wiki(&self, wiki: NewWiki) -> Result<Wiki, StorageError> {
        let stored = Wiki {
            id: WikiId::new(self.allocate()),
            interview_id: wiki.interview_id,
            content: wiki.content,
            version: wiki.version,
            prompt_id: wiki.prompt_id,
            selected: wiki.selected,
            created_at: wiki.created_at,
        };
        self.wikis.lock().map_err(lock_err)?.push(stored.clone());
        Ok(stored)
    }

    async fn get_wiki(&self, id: WikiId) -> Result<Option<Wiki>, StorageError> {
        let guard = self.wikis.lock().map_err(lock_err)?;
        Ok(guard.iter().find(|w| w.id == id).cloned())
    }

    async fn update_content(&self, id: WikiId, content: &str) -> Result<(), StorageError> {
        let mut guard = self.wikis.lock().map_err(lock_err)?;
        let wiki = guard
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(StorageError::NotFound)?;
        content.clone_into(&mut wiki.content);
        Ok(())
    }

    async fn list_wikis(&self, interview_id: InterviewId) -> Result<Vec<Wiki>, StorageError> {
        let guard = self.wikis.lock().map_err(lock_err)?;
        let mut found: Vec<Wiki> = guard
            .iter()
            .filter(|w| w.interview_id == interview_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.version.cmp(&a.version))
                .then(b.id.cmp(&a.id))
        });
        Ok(found)
    }

    async fn select_wiki(
        &self,
        interview_id: InterviewId,
        wiki_id: WikiId,
    ) -> Result<(), StorageError> {
        let mut guard = self.wikis.lock().map_err(lock_err)?;
        if !guard
            .iter()
            .any(|w| w.id == wiki_id && w.interview_id == interview_id)
        {
            return Err(StorageError::NotFound);
        }
        for wiki in guard.iter_mut().filter(|w| w.interview_id == interview_id) {
            wiki.selected = wiki.id == wiki_id;
        }
        Ok(())
    }
}

#[async_trait]
impl RatingRepository for InMemoryRepository {
    async fn insert_rating(&self, rating: NewRating) -> Result<Rating, StorageError> {
        let stored = Rating {
            id: RatingId::new(self.allocate()),
            interview_id: rating.interview_id,
            score: rating.score,
            feedback: rating.feedback,
            created_at: rating.created_at,
        };
        self.ratings.lock().map_err(lock_err)?.push(stored.clone());
        Ok(stored)
    }

    async fn list_ratings(&self, interview_id: InterviewId) -> Result<Vec<Rating>, StorageError> {
        let guard = self.ratings.lock().map_err(lock_err)?;
        Ok(guard
            .iter()
            .filter(|r| r.interview_id == interview_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AiUsageRepository for InMemoryRepository {
    async fn insert_started(&self, record: NewAiUsageRecord) -> Result<i64, StorageError> {
        let id = i64::try_from(self.allocate())
            .map_err(|_| StorageError::Serialization("usage id overflow".into()))?;
        self.usage.lock().map_err(lock_err)?.push(AiUsageRecord {
            id,
            interview_id: record.interview_id,
            purpose: record.purpose,
            provider: record.provider,
            model: record.model,
            status: AiUsageStatus::Started,
            total_tokens: None,
            cost_micro_usd: None,
            raw_output: None,
            created_at: record.created_at,
        });
        Ok(id)
    }

    async fn update_completion(
        &self,
        id: i64,
        completion: AiUsageCompletion,
    ) -> Result<(), StorageError> {
        let mut guard = self.usage.lock().map_err(lock_err)?;
        let record = guard
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StorageError::NotFound)?;
        record.status = completion.status;
        record.total_tokens = completion.total_tokens;
        record.cost_micro_usd = completion.cost_micro_usd;
        record.raw_output = completion.raw_output;
        Ok(())
    }

    async fn list_usage(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<AiUsageRecord>, StorageError> {
        let guard = self.usage.lock().map_err(lock_err)?;
        Ok(guard
            .iter()
            .filter(|r| r.interview_id == Some(interview_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AiPriceBookRepository for InMemoryRepository {
    async fn get_entry(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<Option<AiPriceBookEntry>, StorageError> {
        let guard = self.prices.lock().map_err(lock_err)?;
        Ok(guard
            .iter()
            .find(|e| e.provider == provider && e.model == model)
            .cloned())
    }

    async fn upsert_entry(&self, entry: &AiPriceBookEntry) -> Result<(), StorageError> {
        let mut guard = self.prices.lock().map_err(lock_err)?;
        guard.retain(|e| !(e.provider == entry.provider && e.model == entry.model));
        guard.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl PromptUsageRepository for InMemoryRepository {
    async fn take_least_used(
        &self,
        pool: &str,
        candidates: &[PromptId],
        n: usize,
    ) -> Result<Vec<PromptId>, StorageError> {
        let mut guard = self.prompt_usage.lock().map_err(lock_err)?;
        let counts = guard.entry(pool.to_owned()).or_default();
        let chosen = select_least_used(candidates, counts, n);
        for id in &chosen {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        Ok(chosen)
    }

    async fn usage_counts(&self, pool: &str) -> Result<HashMap<PromptId, u64>, StorageError> {
        let guard = self.prompt_usage.lock().map_err(lock_err)?;
        Ok(guard.get(pool).cloned().unwrap_or_default())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub templates: Arc<dyn TemplateRepository>,
    pub interviews: Arc<dyn InterviewRepository>,
    pub additional_questions: Arc<dyn AdditionalQuestionRepository>,
    pub responses: Arc<dyn ResponseRepository>,
    pub wikis: Arc<dyn WikiRepository>,
    pub ratings: Arc<dyn RatingRepository>,
    pub ai_usage: Arc<dyn AiUsageRepository>,
    pub ai_price_book: Arc<dyn AiPriceBookRepository>,
    pub prompt_usage: Arc<dyn PromptUsageRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every repository to one backend.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: TemplateRepository
            + InterviewRepository
            + AdditionalQuestionRepository
            + ResponseRepository
            + WikiRepository
            + RatingRepository
            + AiUsageRepository
            + AiPriceBookRepository
            + PromptUsageRepository
            + Clone
            + 'static,
    {
        Self {
            templates: Arc::new(repo.clone()),
            interviews: Arc::new(repo.clone()),
            additional_questions: Arc::new(repo.clone()),
            responses: Arc::new(repo.clone()),
            wikis: Arc::new(repo.clone()),
            ratings: Arc::new(repo.clone()),
            ai_usage: Arc::new(repo.clone()),
            ai_price_book: Arc::new(repo.clone()),
            prompt_usage: Arc::new(repo),
        }
    }
}
