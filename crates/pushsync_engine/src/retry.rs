//! Retryable jobs.
//!
//! A [`RetryableJob`] wraps one attempt of network-backed work. A job value
//! runs once; when its attempt fails with a retryable error,
//! [`RetryableJob::next_job`] consumes it and builds a fresh job carrying
//! the attempt counter forward. [`RetryRunner`] is the loop that drives a
//! job through its attempts.
//!
//! ## Retry rule
//!
//! A new attempt is made iff all hold:
//! - the attempt ended with an error
//! - the error is retryable (decoding errors only when opted in)
//! - `attempt < retry_limit`
//! - the job has not been cancelled
//!
//! So a job with `retry_limit = 3` runs at most four times.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared cancellation flag.
///
/// Cancelling never interrupts running work; it only stops further
/// attempts, and makes an attempt that has not started yet complete with
/// [`SyncError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the job as cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observes the attempts of a single job value.
///
/// Observers are dropped after the attempt they watched; a retry starts
/// with none.
pub trait AttemptObserver: Send + Sync {
    /// Called before the work runs.
    fn attempt_did_start(&self, _attempt: u32) {}

    /// Called after the attempt finished.
    fn attempt_did_finish(&self, _attempt: u32, _error: Option<&SyncError>) {}
}

/// Counts attempts across jobs.
#[derive(Debug, Default)]
pub struct AttemptCounter {
    started: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

impl AttemptCounter {
    /// Creates a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts started.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Attempts that ended with an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Attempts that were not a job's first.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::SeqCst)
    }
}

impl AttemptObserver for AttemptCounter {
    fn attempt_did_start(&self, attempt: u32) {
        self.started.fetch_add(1, Ordering::SeqCst);
        if attempt > 0 {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn attempt_did_finish(&self, _attempt: u32, error: Option<&SyncError>) {
        if error.is_some() {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Attempt bookkeeping of a job, carried from one job value to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempt: Option<u32>,
    retry_limit: u32,
    retry_decoding: bool,
    last_error: Option<SyncError>,
}

impl RetryState {
    /// Creates state for a job that has not run yet.
    pub fn new(retry_limit: u32) -> Self {
        Self {
            attempt: None,
            retry_limit,
            retry_decoding: false,
            last_error: None,
        }
    }

    /// Index of the current attempt; `None` before the first run.
    pub fn attempt(&self) -> Option<u32> {
        self.attempt
    }

    /// Retries allowed after the first attempt.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Error of the latest attempt.
    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    fn begin_attempt(&mut self) -> u32 {
        let next = self.attempt.map_or(0, |a| a + 1);
        self.attempt = Some(next);
        self.last_error = None;
        next
    }

    fn is_retryable(&self, error: &SyncError) -> bool {
        error.is_retryable() || (self.retry_decoding && matches!(error, SyncError::Decoding(_)))
    }

    /// Applies the retry rule to the latest attempt.
    pub fn allows_retry(&self, cancelled: bool) -> bool {
        match &self.last_error {
            Some(error) if self.is_retryable(error) => {
                self.attempt.unwrap_or(0) < self.retry_limit && !cancelled
            }
            _ => false,
        }
    }

    fn carry_forward(&self) -> Self {
        Self {
            attempt: self.attempt,
            retry_limit: self.retry_limit,
            retry_decoding: self.retry_decoding,
            last_error: None,
        }
    }
}

type JobWork<'a, T> = Box<dyn FnMut(u32) -> SyncResult<T> + Send + 'a>;
type JobCompletion<'a, T> = Box<dyn FnOnce(SyncResult<T>) + Send + 'a>;

/// One attempt of retryable work plus the completion it reports to.
///
/// The completion runs exactly once over the whole chain of job values:
/// after the attempt that will not be retried, or from
/// [`RetryableJob::next_job`] if a planned retry is called off by
/// cancellation.
pub struct RetryableJob<'a, T> {
    state: RetryState,
    work: JobWork<'a, T>,
    completion: Option<JobCompletion<'a, T>>,
    observers: Vec<Arc<dyn AttemptObserver>>,
    cancel: CancelHandle,
}

impl<'a, T> RetryableJob<'a, T> {
    /// Creates a job. `work` receives the attempt index.
    pub fn new(
        retry_limit: u32,
        work: impl FnMut(u32) -> SyncResult<T> + Send + 'a,
        completion: impl FnOnce(SyncResult<T>) + Send + 'a,
    ) -> Self {
        Self {
            state: RetryState::new(retry_limit),
            work: Box::new(work),
            completion: Some(Box::new(completion)),
            observers: Vec::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Lets decoding errors be retried.
    pub fn with_decoding_retries(mut self, retry: bool) -> Self {
        self.state.retry_decoding = retry;
        self
    }

    /// Shares an existing cancellation flag.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the cancellation flag.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the attempt bookkeeping.
    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Adds an observer for the next attempt.
    pub fn add_observer(&mut self, observer: Arc<dyn AttemptObserver>) {
        self.observers.push(observer);
    }

    /// Returns true if the latest attempt should be followed by another.
    pub fn should_retry(&self) -> bool {
        self.state.allows_retry(self.cancel.is_cancelled())
    }

    /// Runs one attempt.
    pub fn execute(&mut self) {
        let attempt = self.state.begin_attempt();
        for observer in &self.observers {
            observer.attempt_did_start(attempt);
        }

        let result = if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            (self.work)(attempt)
        };
        self.state.last_error = result.as_ref().err().cloned();

        if !self.should_retry() {
            if let Some(completion) = self.completion.take() {
                completion(result);
            }
        }

        for observer in self.observers.drain(..) {
            observer.attempt_did_finish(attempt, self.state.last_error.as_ref());
        }
    }

    /// Builds the job for the next attempt, or `None` if there is none.
    pub fn next_job(previous: Self) -> Option<Self> {
        let RetryableJob {
            state,
            work,
            completion,
            cancel,
            ..
        } = previous;

        if !state.allows_retry(cancel.is_cancelled()) {
            // A retry was planned but cancellation called it off
            if let Some(completion) = completion {
                completion(Err(state.last_error.unwrap_or(SyncError::Cancelled)));
            }
            return None;
        }

        Some(Self {
            state: state.carry_forward(),
            work,
            completion,
            observers: Vec::new(),
            cancel,
        })
    }
}

/// Drives jobs through their attempts.
#[derive(Clone)]
pub struct RetryRunner {
    pacing: RetryConfig,
    observers: Vec<Arc<dyn AttemptObserver>>,
}

impl RetryRunner {
    /// Creates a runner that waits between attempts per `pacing`.
    pub fn new(pacing: RetryConfig) -> Self {
        Self {
            pacing,
            observers: Vec::new(),
        }
    }

    /// Attaches `observer` to every attempt this runner drives.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Runs `job` until it completes.
    pub fn run<T>(&self, mut job: RetryableJob<'_, T>) {
        loop {
            for observer in &self.observers {
                job.add_observer(Arc::clone(observer));
            }
            job.execute();

            let failed_attempt = job.state().attempt().unwrap_or(0);
            let error = job.state().last_error().map(ToString::to_string);
            match RetryableJob::next_job(job) {
                Some(next) => {
                    let delay = self.pacing.delay_for_attempt(failed_attempt + 1);
                    warn!(
                        attempt = failed_attempt,
                        error = error.as_deref().unwrap_or_default(),
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    job = next;
                }
                None => {
                    debug!(attempts = failed_attempt + 1, "job finished");
                    break;
                }
            }
        }
    }

    /// Runs `work` with the given retry policy and returns its final result.
    pub fn call<T: Send>(
        &self,
        retry_limit: u32,
        retry_decoding: bool,
        cancel: CancelHandle,
        work: impl FnMut(u32) -> SyncResult<T> + Send,
    ) -> SyncResult<T> {
        let mut outcome = None;
        {
            let job = RetryableJob::new(retry_limit, work, |result| outcome = Some(result))
                .with_decoding_retries(retry_decoding)
                .with_cancel_handle(cancel);
            self.run(job);
        }
        outcome.unwrap_or(Err(SyncError::Cancelled))
    }
}

impl Default for RetryRunner {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
