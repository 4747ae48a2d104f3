mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{FakeSpeech, FakeSynthesis, RecordingDispatcher, ScriptedAnalysis, analysis_json};
use interview_core::ProgressTracker;
use interview_core::model::{
    InterviewId, NewAdditionalQuestion, NewResponse, QuestionRef, Response, ResponseId,
    RunningInterview, TemplateDraft,
};
use interview_core::time::{fixed_clock, fixed_now};
use services::ai::AiUsageService;
use services::locks::InterviewLocks;
use services::pipelines::{FollowupPipeline, WikiPipeline};
use services::{InterviewService, Job, JobError, PromptAssignment, PromptPool};
use storage::repository::{ResponseRepository, Storage, StorageError};

/// Fails the n-th `list_responses` call and delegates everything else.
struct FlakyResponses {
    inner: Arc<dyn ResponseRepository>,
    calls: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl ResponseRepository for FlakyResponses {
    async fn insert_response(&self, response: NewResponse) -> Result<Response, StorageError> {
        self.inner.insert_response(response).await
    }

    async fn get_response(&self, id: ResponseId) -> Result<Option<Response>, StorageError> {
        self.inner.get_response(id).await
    }

    async fn list_responses(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<Response>, StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(StorageError::Connection("transient".into()));
        }
        self.inner.list_responses(interview_id).await
    }

    async fn record_analysis(&self, id: ResponseId, raw_output: &str) -> Result<(), StorageError> {
        self.inner.record_analysis(id, raw_output).await
    }

    async fn analysis_output(&self, id: ResponseId) -> Result<Option<String>, StorageError> {
        self.inner.analysis_output(id).await
    }
}

struct Setup {
    storage: Storage,
    analysis: Arc<ScriptedAnalysis>,
    dispatcher: Arc<RecordingDispatcher>,
    locks: InterviewLocks,
    pipeline: FollowupPipeline,
}

fn setup() -> Setup {
    setup_with(Storage::in_memory())
}

fn setup_with(storage: Storage) -> Setup {
    let analysis = Arc::new(ScriptedAnalysis::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let usage = AiUsageService::new(
        fixed_clock(),
        Arc::clone(&storage.ai_usage),
        Arc::clone(&storage.ai_price_book),
    );
    let locks = InterviewLocks::new();
    let pipeline = FollowupPipeline::new(
        storage.clone(),
        analysis.clone(),
        usage,
        dispatcher.clone(),
        locks.clone(),
        fixed_clock(),
    );
    Setup {
        storage,
        analysis,
        dispatcher,
        locks,
        pipeline,
    }
}

/// An interview service sharing the pipeline's storage and locks.
fn interview_service(s: &Setup) -> InterviewService {
    let usage = AiUsageService::new(
        fixed_clock(),
        Arc::clone(&s.storage.ai_usage),
        Arc::clone(&s.storage.ai_price_book),
    );
    let prompts = Arc::new(PromptAssignment::new(
        PromptPool::numbered("wiki", 2),
        Arc::clone(&s.storage.prompt_usage),
    ));
    let wikis = WikiPipeline::new(
        s.storage.clone(),
        Arc::new(FakeSynthesis::default()),
        usage,
        prompts,
        2,
        fixed_clock(),
    );
    InterviewService::new(
        s.storage.clone(),
        Arc::new(FakeSpeech::default()),
        s.dispatcher.clone(),
        wikis,
        s.locks.clone(),
        fixed_clock(),
    )
}

async fn answered_first_question(storage: &Storage) -> (RunningInterview, Response) {
    answered_first_of(storage, r#"{"general":["Q1","Q2"],"later":["Q3"]}"#).await
}

async fn answered_first_of(storage: &Storage, raw: &str) -> (RunningInterview, Response) {
    let draft = TemplateDraft::from_json(raw).unwrap();
    let template = storage
        .templates
        .create_template(&draft, fixed_now())
        .await
        .unwrap();
    let tracker = ProgressTracker::from_template(&template);
    let interview = storage
        .interviews
        .create_interview(template.id(), &tracker, fixed_now())
        .await
        .unwrap();
    let first = tracker.current_question().unwrap().question_ref;
    let response = storage
        .responses
        .insert_response(NewResponse {
            interview_id: interview.id,
            question_ref: first,
            text: "Developer".into(),
            audio: None,
            transcript: String::new(),
            skipped: false,
            by_user: true,
            created_at: fixed_now(),
        })
        .await
        .unwrap();
    (interview, response)
}

async fn question_texts(storage: &Storage, interview: &RunningInterview) -> Vec<String> {
    storage
        .interviews
        .get_interview(interview.id)
        .await
        .unwrap()
        .unwrap()
        .tracker
        .questions()
        .iter()
        .map(|q| q.text.clone())
        .collect()
}

#[tokio::test]
async fn additions_inherit_active_category_and_queue_audio() {
    let s = setup();
    let (interview, response) = answered_first_question(&s.storage).await;
    s.analysis.push(analysis_json(&["Q1a", "Q1b"], &[]));

    let outcome = s.pipeline.run(interview.id, response.id).await.unwrap();

    assert_eq!(outcome.added.len(), 2);
    assert_eq!(
        question_texts(&s.storage, &interview).await,
        vec!["Q1", "Q1a", "Q1b", "Q2", "Q3"]
    );
    let stored = s
        .storage
        .additional_questions
        .list_additional(interview.id)
        .await
        .unwrap();
    assert!(stored.iter().all(|q| q.category == "general"));
    assert!(stored.iter().all(|q| q.triggering_response_id == response.id));
    assert!(stored[0].order < stored[1].order);

    let jobs = s.dispatcher.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| matches!(job, Job::AdditionalAudio { .. })));
}

#[tokio::test]
async fn rerun_reuses_stored_additions() {
    let s = setup();
    let (interview, response) = answered_first_question(&s.storage).await;
    s.analysis.push(analysis_json(&["Q1a"], &[]));

    let first = s.pipeline.run(interview.id, response.id).await.unwrap();
    let second = s.pipeline.run(interview.id, response.id).await.unwrap();

    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(first.added, second.added);
    assert_eq!(s.analysis.calls(), 1);
    assert_eq!(
        question_texts(&s.storage, &interview).await,
        vec!["Q1", "Q1a", "Q2", "Q3"]
    );
}

#[tokio::test]
async fn retry_after_failed_removal_applies_both_lists() {
    let mut storage = Storage::in_memory();
    storage.responses = Arc::new(FlakyResponses {
        inner: Arc::clone(&storage.responses),
        calls: AtomicUsize::new(0),
        fail_on: 2,
    });
    let s = setup_with(storage);
    let (interview, response) = answered_first_question(&s.storage).await;
    let old = s
        .storage
        .additional_questions
        .insert_additional(NewAdditionalQuestion {
            interview_id: interview.id,
            text: "Old?".into(),
            category: "general".into(),
            triggering_response_id: response.id,
        })
        .await
        .unwrap();
    s.analysis.push(analysis_json(&["New?"], &["Old?"]));

    let first = s.pipeline.run(interview.id, response.id).await;
    assert!(matches!(first, Err(JobError::Storage(_))));

    let retry = s.pipeline.run(interview.id, response.id).await.unwrap();

    assert!(retry.reused);
    assert_eq!(retry.retired, vec![old.id]);
    assert_eq!(s.analysis.calls(), 1);
    let responses = s
        .storage
        .responses
        .list_responses(interview.id)
        .await
        .unwrap();
    assert!(
        responses
            .iter()
            .any(|r| r.question_ref == QuestionRef::Additional(old.id) && r.skipped && !r.by_user)
    );
    let new_count = s
        .storage
        .additional_questions
        .list_additional(interview.id)
        .await
        .unwrap()
        .iter()
        .filter(|q| q.text == "New?")
        .count();
    assert_eq!(new_count, 1);
    assert_eq!(
        question_texts(&s.storage, &interview).await,
        vec!["Q1", "New?", "Q2", "Q3"]
    );
    let stored = s
        .storage
        .interviews
        .get_interview(interview.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.tracker.skipped(), &[QuestionRef::Additional(old.id)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn followups_stay_contiguous_while_the_interview_advances() {
    let s = setup();
    let (interview, response) =
        answered_first_of(&s.storage, r#"{"general":["Q1","Q2","Q3","Q4","Q5"]}"#).await;
    let interviews = Arc::new(interview_service(&s));
    s.analysis.push(analysis_json(&["F1", "F2"], &[]));

    let walker = {
        let interviews = Arc::clone(&interviews);
        let id = interview.id;
        tokio::spawn(async move {
            let mut seen = vec!["Q1".to_string()];
            while let Some(next) = interviews.next_question(id).await.unwrap() {
                seen.push(next.text);
                tokio::task::yield_now().await;
            }
            seen
        })
    };
    let followup = {
        let pipeline = s.pipeline.clone();
        let id = interview.id;
        tokio::spawn(async move { pipeline.run(id, response.id).await })
    };

    followup.await.unwrap().unwrap();
    let mut seen = walker.await.unwrap();
    while let Some(next) = interviews.next_question(interview.id).await.unwrap() {
        seen.push(next.text);
    }

    let order = question_texts(&s.storage, &interview).await;
    assert_eq!(seen, order);
    let at = order.iter().position(|t| t == "F1").unwrap();
    assert_eq!(order[at + 1], "F2");
    let template: Vec<&str> = order
        .iter()
        .map(String::as_str)
        .filter(|t| t.starts_with('Q'))
        .collect();
    assert_eq!(template, vec!["Q1", "Q2", "Q3", "Q4", "Q5"]);
    assert_eq!(order.len(), 7);
}

#[tokio::test]
async fn removal_skips_answered_and_unknown_questions() {
    let s = setup();
    let (interview, response) = answered_first_question(&s.storage).await;
    s.analysis.push(analysis_json(&["Q1a", "Q1b"], &[]));
    let added = s.pipeline.run(interview.id, response.id).await.unwrap().added;

    let answer = s
        .storage
        .responses
        .insert_response(NewResponse {
            interview_id: interview.id,
            question_ref: QuestionRef::Additional(added[0]),
            text: "Because".into(),
            audio: None,
            transcript: String::new(),
            skipped: false,
            by_user: true,
            created_at: fixed_now(),
        })
        .await
        .unwrap();
    s.analysis
        .push(analysis_json(&[], &["Q1a", "Q1b", "Unknown"]));

    let outcome = s.pipeline.run(interview.id, answer.id).await.unwrap();

    assert_eq!(outcome.retired, vec![added[1]]);
    let stored = s
        .storage
        .interviews
        .get_interview(interview.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.tracker.skipped(), &[QuestionRef::Additional(added[1])]);
}

#[tokio::test]
async fn invalid_output_is_a_validation_error() {
    let s = setup();
    let (interview, response) = answered_first_question(&s.storage).await;
    s.analysis
        .push(r#"{"concepts":[],"additional_questions":["x"]}"#);

    let result = s.pipeline.run(interview.id, response.id).await;

    assert!(matches!(result, Err(JobError::Validation(_))));
    assert!(
        s.storage
            .additional_questions
            .list_additional(interview.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn fenced_output_is_accepted() {
    let s = setup();
    let (interview, response) = answered_first_question(&s.storage).await;
    s.analysis.push(format!(
        "Sure!\n```json\n{}\n```",
        analysis_json(&["Q1a"], &[])
    ));

    let outcome = s.pipeline.run(interview.id, response.id).await.unwrap();

    assert_eq!(outcome.added.len(), 1);
}

#[tokio::test]
async fn unknown_response_is_not_found() {
    let s = setup();
    let (interview, _) = answered_first_question(&s.storage).await;

    let result = s
        .pipeline
        .run(interview.id, interview_core::model::ResponseId::new(999))
        .await;

    assert!(matches!(result, Err(JobError::NotFound(_))));
}
