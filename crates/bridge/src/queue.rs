// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-destination FIFO work queues: bounded concurrency, token-bucket rate
//! limiting, exponential-backoff retries, dead-letter, job-id idempotency.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::context::CorrelationContext;
use crate::envelope::Envelope;
use crate::error::BridgeError;

const DEFAULT_CONCURRENCY: usize = 5;
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
const DEFAULT_RETAINED_COMPLETED: usize = 100;
const DEFAULT_RETAINED_FAILED: usize = 500;

/// Token-bucket rate limit: at most `max` jobs started per `duration`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max: u32,
    pub duration: Duration,
}

impl RateLimit {
    pub fn new(max: u32, duration_ms: u64) -> Self {
        Self { max, duration: Duration::from_millis(duration_ms) }
    }
}

/// Tunables for a [`Queue`].
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    pub concurrency: usize,
    pub rate_limit: Option<RateLimit>,
    pub attempts: u32,
    pub backoff_base_ms: u64,
    pub retained_completed: usize,
    pub retained_failed: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit: None,
            attempts: DEFAULT_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            retained_completed: DEFAULT_RETAINED_COMPLETED,
            retained_failed: DEFAULT_RETAINED_FAILED,
        }
    }
}

/// A unit of work enqueued for a destination platform.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub envelope: Envelope,
    pub attempt: u32,
}

/// Outcome of a completed job, retained for observability and auto-trim.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub attempt: u32,
    pub error: Option<String>,
}

/// Result a processor returns for a single job attempt.
pub type ProcessResult = Result<(), BridgeError>;

/// The async processor function a consumer registers for a queue.
pub type Processor =
    Arc<dyn Fn(Job, CorrelationContext) -> futures_util::future::BoxFuture<'static, ProcessResult> + Send + Sync>;

struct State {
    pending_ids: IndexSet<String>,
    completed: VecDeque<JobRecord>,
    failed: VecDeque<JobRecord>,
}

/// A single destination platform's FIFO work queue.
pub struct Queue {
    name: String,
    options: QueueOptions,
    sender: mpsc::UnboundedSender<Job>,
    state: Arc<Mutex<State>>,
    processor: Mutex<Option<Processor>>,
}

impl Queue {
    pub fn new(name: impl Into<String>, options: QueueOptions) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(State {
            pending_ids: IndexSet::new(),
            completed: VecDeque::new(),
            failed: VecDeque::new(),
        }));

        let queue = Arc::new(Self {
            name: name.into(),
            options,
            sender,
            state,
            processor: Mutex::new(None),
        });

        queue.clone().spawn_dispatcher(receiver);
        queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the single consumer for this queue. Double registration is
    /// refused (a warning, not an error) — the first processor wins.
    pub async fn process(&self, processor: Processor) {
        let mut slot = self.processor.lock().await;
        if slot.is_some() {
            tracing::warn!(queue = %self.name, "processor already registered, ignoring");
            return;
        }
        *slot = Some(processor);
    }

    /// Enqueue `envelope` under `job_id`. A job id collision on this queue is
    /// a no-op (idempotent enqueue).
    pub async fn enqueue(&self, job_id: impl Into<String>, envelope: Envelope) {
        let job_id = job_id.into();
        {
            let mut state = self.state.lock().await;
            if state.pending_ids.contains(&job_id) {
                tracing::debug!(queue = %self.name, job_id, "duplicate job id, skipping enqueue");
                return;
            }
            state.pending_ids.insert(job_id.clone());
        }

        let job = Job { id: job_id, envelope, attempt: 0 };
        if self.sender.send(job).is_err() {
            tracing::error!(queue = %self.name, "dispatcher channel closed, job dropped");
        }
    }

    fn spawn_dispatcher(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<Job>) {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let bucket = self.options.rate_limit.map(SharedTokenBucket::new).map(Arc::new);

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Some(bucket) = &bucket {
                    bucket.acquire().await;
                }

                let permit = Arc::clone(&semaphore).acquire_owned().await;
                let queue = Arc::clone(&self);
                tokio::spawn(async move {
                    let _permit = permit;
                    queue.run_job(job).await;
                });
            }
        });
    }

    async fn run_job(self: Arc<Self>, mut job: Job) {
        let processor = { self.processor.lock().await.clone() };
        let Some(processor) = processor else {
            tracing::warn!(queue = %self.name, job_id = %job.id, "no processor registered, dropping job");
            self.state.lock().await.pending_ids.shift_remove(&job.id);
            return;
        };

        if let Err(e) = job.envelope.ensure_valid() {
            tracing::warn!(queue = %self.name, job_id = %job.id, err = %e, "invalid envelope, not retrying");
            self.record_failed(job, Some(e.to_string())).await;
            return;
        }

        let context = CorrelationContext::new(
            job.envelope.head.correlation_id.clone(),
            Some(job.envelope.head.source.clone()),
        );

        loop {
            job.attempt += 1;
            let result = processor(job.clone(), context.clone()).await;

            match result {
                Ok(()) => {
                    self.record_completed(job).await;
                    return;
                }
                Err(e) if e.is_retryable() && job.attempt < self.options.attempts => {
                    let delay = self.retry_delay(&e, job.attempt);
                    tracing::debug!(
                        queue = %self.name, job_id = %job.id, attempt = job.attempt, err = %e,
                        delay_ms = delay.as_millis() as u64, "job failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(queue = %self.name, job_id = %job.id, attempt = job.attempt, err = %e, "job failed permanently");
                    self.record_failed(job, Some(e.to_string())).await;
                    return;
                }
            }
        }
    }

    fn retry_delay(&self, error: &BridgeError, attempt: u32) -> Duration {
        if let BridgeError::RateLimited { retry_after_ms } = error {
            let backoff = self.options.backoff_base_ms * 2u64.pow(attempt.saturating_sub(1));
            return Duration::from_millis((*retry_after_ms).max(backoff));
        }
        Duration::from_millis(self.options.backoff_base_ms * 2u64.pow(attempt.saturating_sub(1)))
    }

    async fn record_completed(&self, job: Job) {
        let mut state = self.state.lock().await;
        state.pending_ids.shift_remove(&job.id);
        state.completed.push_back(JobRecord { id: job.id, attempt: job.attempt, error: None });
        while state.completed.len() > self.options.retained_completed {
            state.completed.pop_front();
        }
    }

    async fn record_failed(&self, job: Job, error: Option<String>) {
        let mut state = self.state.lock().await;
        state.pending_ids.shift_remove(&job.id);
        state.failed.push_back(JobRecord { id: job.id, attempt: job.attempt, error });
        while state.failed.len() > self.options.retained_failed {
            state.failed.pop_front();
        }
    }

    pub async fn completed_count(&self) -> usize {
        self.state.lock().await.completed.len()
    }

    pub async fn failed_count(&self) -> usize {
        self.state.lock().await.failed.len()
    }

    pub async fn is_pending(&self, job_id: &str) -> bool {
        self.state.lock().await.pending_ids.contains(job_id)
    }
}

/// Per-queue shared token bucket counting starts within the current window.
pub struct SharedTokenBucket {
    limit: RateLimit,
    window_start: Mutex<std::time::Instant>,
    count: Mutex<u32>,
}

impl SharedTokenBucket {
    pub fn new(limit: RateLimit) -> Self {
        Self { limit, window_start: Mutex::new(std::time::Instant::now()), count: Mutex::new(0) }
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window_start = self.window_start.lock().await;
                let mut count = self.count.lock().await;
                let elapsed = window_start.elapsed();
                if elapsed >= self.limit.duration {
                    *window_start = std::time::Instant::now();
                    *count = 0;
                }
                if *count < self.limit.max {
                    *count += 1;
                    None
                } else {
                    Some(self.limit.duration.saturating_sub(elapsed))
                }
            };

            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}

/// Owns one [`Queue`] per destination platform, keyed by `queue_<platform>_out`.
pub struct QueueManager {
    queues: Mutex<HashMap<String, Arc<Queue>>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self { queues: Mutex::new(HashMap::new()) }
    }

    /// The queue name for a destination platform, per spec's naming scheme.
    pub fn queue_name(platform: &str) -> String {
        format!("queue_{}_out", platform.to_lowercase())
    }

    pub async fn get_or_create(&self, platform: &str, options: QueueOptions) -> Arc<Queue> {
        let name = Self::queue_name(platform);
        let mut queues = self.queues.lock().await;
        queues.entry(name.clone()).or_insert_with(|| Queue::new(name, options)).clone()
    }

    pub async fn get(&self, platform: &str) -> Option<Arc<Queue>> {
        self.queues.lock().await.get(&Self::queue_name(platform)).cloned()
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
