use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::{Job, JobDispatcher, JobHandler, RetryPolicy};
use crate::config::JobSettings;
use crate::error::JobError;

/// A job that exhausted its attempts or failed terminally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedJob {
    pub job: Job,
    pub key: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Idempotency keys; completed keys are forgotten oldest first past `capacity`.
struct Keys {
    in_flight: HashSet<String>,
    completed: HashSet<String>,
    completed_order: VecDeque<String>,
    capacity: usize,
}

impl Keys {
    fn new(capacity: usize) -> Self {
        Self {
            in_flight: HashSet::new(),
            completed: HashSet::new(),
            completed_order: VecDeque::new(),
            capacity,
        }
    }

    fn complete(&mut self, key: &str) {
        self.in_flight.remove(key);
        if self.capacity == 0 || !self.completed.insert(key.to_string()) {
            return;
        }
        self.completed_order.push_back(key.to_string());
        while self.completed_order.len() > self.capacity {
            if let Some(oldest) = self.completed_order.pop_front() {
                self.completed.remove(&oldest);
            }
        }
    }
}

struct QueueState {
    keys: Mutex<Keys>,
    failed: Mutex<Vec<FailedJob>>,
    pending: AtomicUsize,
    idle: Notify,
    shutdown: watch::Sender<bool>,
}

impl QueueState {
    fn keys(&self) -> MutexGuard<'_, Keys> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// In-process queue running jobs on a bounded set of tokio tasks.
///
/// Delivery is at-least-once: a job is dropped when its idempotency key is
/// queued or already completed, and retried per [`RetryPolicy`] otherwise.
#[derive(Clone)]
pub struct TokioJobQueue {
    sender: mpsc::UnboundedSender<Job>,
    state: Arc<QueueState>,
}

/// Receiving half of a [`TokioJobQueue`]; spawn it once a handler exists.
pub struct QueueWorker {
    receiver: mpsc::UnboundedReceiver<Job>,
    shutdown: watch::Receiver<bool>,
    state: Arc<QueueState>,
    settings: JobSettings,
}

impl TokioJobQueue {
    #[must_use]
    pub fn new(settings: JobSettings) -> (Self, QueueWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = Arc::new(QueueState {
            keys: Mutex::new(Keys::new(settings.completed_keys)),
            failed: Mutex::new(Vec::new()),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            shutdown,
        });
        let worker = QueueWorker {
            receiver,
            shutdown: shutdown_rx,
            state: Arc::clone(&state),
            settings,
        };
        (Self { sender, state }, worker)
    }

    /// Jobs accepted but not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Wait until every accepted job, including jobs they enqueue, has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    #[must_use]
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.state
            .failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop accepting jobs; running jobs finish, queued ones are dropped.
    pub fn shutdown(&self) {
        self.state.shutdown.send_replace(true);
    }
}

#[async_trait]
impl JobDispatcher for TokioJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), JobError> {
        if *self.state.shutdown.borrow() {
            return Err(JobError::Closed);
        }

        let key = job.idempotency_key();
        {
            let mut keys = self.state.keys();
            if keys.completed.contains(&key) || keys.in_flight.contains(&key) {
                debug!(%key, "dropping duplicate job");
                return Ok(());
            }
            keys.in_flight.insert(key.clone());
        }

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.state.keys().in_flight.remove(&key);
            self.state.finish_one();
            return Err(JobError::Closed);
        }
        debug!(%key, "job enqueued");
        Ok(())
    }
}

impl QueueWorker {
    /// Start the dispatch loop with `handler` on the current runtime.
    pub fn spawn(self, handler: Arc<dyn JobHandler>) -> JoinHandle<()> {
        tokio::spawn(self.run(handler))
    }

    async fn run(mut self, handler: Arc<dyn JobHandler>) {
        let permits = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut tasks = JoinSet::new();
        info!(workers = self.settings.workers, "job queue started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                job = self.receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };

            let handler = Arc::clone(&handler);
            let state = Arc::clone(&self.state);
            let retry = self.settings.retry.clone();
            tasks.spawn(async move {
                run_job(handler.as_ref(), &state, &retry, job).await;
                drop(permit);
            });
            while tasks.try_join_next().is_some() {}
        }

        let dropped = self.receiver.len();
        if dropped > 0 {
            warn!(dropped, "job queue stopped with queued jobs");
        }
        while tasks.join_next().await.is_some() {}
        info!("job queue stopped");
    }
}

async fn run_job(handler: &dyn JobHandler, state: &QueueState, retry: &RetryPolicy, job: Job) {
    let key = job.idempotency_key();
    let mut attempt = 1;
    loop {
        match handler.handle(&job).await {
            Ok(()) => {
                state.keys().complete(&key);
                debug!(%key, attempt, "job completed");
                break;
            }
            Err(err) if err.is_retryable() && retry.allows_retry(attempt) => {
                let delay = retry.delay_for(attempt);
                warn!(%key, attempt, ?delay, error = %err, "job failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(%key, attempt, error = %err, "job failed permanently");
                state.keys().in_flight.remove(&key);
                state
                    .failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(FailedJob {
                        job: job.clone(),
                        key: key.clone(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                break;
            }
        }
    }
    state.finish_one();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use interview_core::model::{InterviewId, ResponseId};

    use super::*;
    use crate::error::AiError;

    struct FlakyHandler {
        calls: AtomicU32,
        failures: u32,
        terminal: bool,
    }

    impl FlakyHandler {
        fn new(failures: u32, terminal: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
                terminal,
            })
        }
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        async fn handle(&self, _job: &Job) -> Result<(), JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call > self.failures {
                return Ok(());
            }
            if self.terminal {
                Err(JobError::Validation("bad payload".into()))
            } else {
                Err(JobError::ExternalService(AiError::EmptyResponse))
            }
        }
    }

    fn settings(max_attempts: u32) -> JobSettings {
        JobSettings {
            workers: 2,
            retry: RetryPolicy::immediate(max_attempts),
            completed_keys: 16,
        }
    }

    fn followup(response: u64) -> Job {
        Job::Followup {
            interview_id: InterviewId::new(1),
            response_id: ResponseId::new(response),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let (queue, worker) = TokioJobQueue::new(settings(3));
        let handler = FlakyHandler::new(2, false);
        worker.spawn(handler.clone());

        queue.enqueue(followup(1)).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(queue.failed_jobs().is_empty());
    }

    #[tokio::test]
    async fn exhausted_jobs_are_registered() {
        let (queue, worker) = TokioJobQueue::new(settings(2));
        let handler = FlakyHandler::new(5, false);
        worker.spawn(handler.clone());

        queue.enqueue(followup(1)).await.unwrap();
        queue.wait_idle().await;

        let failed = queue.failed_jobs();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 2);
        assert_eq!(failed[0].key, "followup:1");
    }

    #[tokio::test]
    async fn validation_failures_are_not_retried() {
        let (queue, worker) = TokioJobQueue::new(settings(3));
        let handler = FlakyHandler::new(1, true);
        worker.spawn(handler.clone());

        queue.enqueue(followup(1)).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.failed_jobs()[0].attempts, 1);
    }

    #[tokio::test]
    async fn completed_keys_are_not_run_twice() {
        let (queue, worker) = TokioJobQueue::new(settings(1));
        let handler = FlakyHandler::new(0, false);
        worker.spawn(handler.clone());

        queue.enqueue(followup(1)).await.unwrap();
        queue.wait_idle().await;
        queue.enqueue(followup(1)).await.unwrap();
        queue.enqueue(followup(2)).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oldest_completed_keys_are_forgotten() {
        let mut settings = settings(1);
        settings.completed_keys = 2;
        let (queue, worker) = TokioJobQueue::new(settings);
        let handler = FlakyHandler::new(0, false);
        worker.spawn(handler.clone());

        for response in 1..=3 {
            queue.enqueue(followup(response)).await.unwrap();
            queue.wait_idle().await;
        }
        assert_eq!(queue.state.keys().completed.len(), 2);

        queue.enqueue(followup(3)).await.unwrap();
        queue.enqueue(followup(1)).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_jobs() {
        let (queue, worker) = TokioJobQueue::new(settings(1));
        let handle = worker.spawn(FlakyHandler::new(0, false));

        queue.shutdown();
        handle.await.unwrap();

        assert!(matches!(
            queue.enqueue(followup(1)).await,
            Err(JobError::Closed)
        ));
    }
}
