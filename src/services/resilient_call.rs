//! Resilient call layer.
//!
//! Runs named external steps with a hard per-attempt timeout, bounded
//! retries with exponential backoff plus jitter, and an external
//! cancellation token. Only transient failures are retried; cancellation is
//! always terminal.

use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::models::{CallError, ResilienceConfig};

/// Options shared by every step of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    /// Hard timeout for one attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base
    pub base_delay: Duration,
    /// Upper bound of the additive jitter
    pub jitter_max: Duration,
    /// Skip remaining steps after a failed one
    pub abort_on_chain_failure: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for TaskOptions {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            abort_on_chain_failure: config.abort_on_chain_failure,
        }
    }
}

impl TaskOptions {
    /// Attempts including the first
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set whether a failed step aborts the chain
    #[must_use]
    pub const fn with_chain_abort(mut self, abort: bool) -> Self {
        self.abort_on_chain_failure = abort;
        self
    }
}

/// Deterministic part of the delay before attempt `attempt` (1-based, >= 2).
pub fn backoff_floor(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(2).min(20);
    base.saturating_mul(1u32 << exponent)
}

/// Full delay before attempt `attempt`: the floor plus uniform jitter in
/// `[0, jitter_max]`.
pub fn backoff_delay(base: Duration, attempt: u32, jitter_max: Duration) -> Duration {
    let jitter_ms = u64::try_from(jitter_max.as_millis()).unwrap_or(u64::MAX);
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };
    backoff_floor(base, attempt).saturating_add(Duration::from_millis(jitter))
}

/// Status of a finished step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step produced data
    Success,
    /// The step failed after its attempts
    Failed,
}

/// Result record for one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult<T> {
    /// Step id
    pub id: String,
    /// Final status
    pub status: StepStatus,
    /// Data from the successful attempt
    pub data: Option<T>,
    /// Error from the last attempt
    pub error: Option<CallError>,
    /// Summary for logs and operators
    pub message: String,
    /// Attempts actually issued; zero when cancelled before starting
    pub attempts: u32,
}

impl<T> StepResult<T> {
    fn success(id: &str, data: T, attempts: u32) -> Self {
        Self {
            id: id.to_string(),
            status: StepStatus::Success,
            data: Some(data),
            error: None,
            message: format!("succeeded after {attempts} attempt(s)"),
            attempts,
        }
    }

    fn failure(id: &str, error: CallError, attempts: u32) -> Self {
        Self {
            id: id.to_string(),
            status: StepStatus::Failed,
            data: None,
            message: error.to_string(),
            error: Some(error),
            attempts,
        }
    }

    /// Whether the step succeeded
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Collapse into a `Result`, keeping the step's error.
    pub fn into_result(self) -> Result<T, CallError> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(err)) => Err(err),
            (None, None) => Err(CallError::parse(format!("step {} produced no data", self.id))),
        }
    }
}

/// Aggregate outcome of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Every step succeeded
    Success,
    /// Some steps succeeded
    Partial,
    /// No step succeeded
    Failed,
}

/// Derive the task outcome from step results alone.
pub fn classify_outcome<T>(results: &[StepResult<T>]) -> TaskOutcome {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    if succeeded == results.len() {
        TaskOutcome::Success
    } else if succeeded == 0 {
        TaskOutcome::Failed
    } else {
        TaskOutcome::Partial
    }
}

/// Results of a chain of steps. Skipped steps have no record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport<T> {
    /// Step records in execution order
    pub results: Vec<StepResult<T>>,
}

impl<T> TaskReport<T> {
    /// Outcome derived from the records
    pub fn outcome(&self) -> TaskOutcome {
        classify_outcome(&self.results)
    }
}

type StepFn<'a, T> =
    Box<dyn FnMut(CancellationToken) -> BoxFuture<'a, Result<T, CallError>> + Send + 'a>;

/// A named step. The closure is invoked once per attempt with a token that
/// fires on timeout or external cancellation.
pub struct Step<'a, T> {
    /// Step id used in results and logs
    pub id: String,
    run: StepFn<'a, T>,
}

impl<'a, T> Step<'a, T> {
    /// A step running `f` on each attempt
    pub fn new<F, Fut>(id: impl Into<String>, mut f: F) -> Self
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, CallError>> + Send + 'a,
    {
        Self {
            id: id.into(),
            run: Box::new(move |token| Box::pin(f(token))),
        }
    }
}

/// Run one step with timeout, retry and cancellation.
pub async fn run_step<T, F, Fut>(
    id: &str,
    options: &TaskOptions,
    cancel: &CancellationToken,
    mut op: F,
) -> StepResult<T>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let max_attempts = options.max_attempts();
    let mut attempts = 0;
    let mut last_error = CallError::cancelled(format!("step {id} cancelled before start"));

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = backoff_delay(options.base_delay, attempt, options.jitter_max);
            debug!(step = id, attempt, delay_ms = delay.as_millis(), "backing off before retry");
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    last_error = CallError::cancelled(format!("step {id} cancelled during backoff"));
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        if cancel.is_cancelled() {
            last_error = CallError::cancelled(format!("step {id} cancelled"));
            break;
        }

        attempts = attempt;
        let started = Instant::now();
        let attempt_token = cancel.child_token();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CallError::cancelled(format!("step {id} cancelled in flight"))),
            () = tokio::time::sleep(options.timeout) => {
                attempt_token.cancel();
                Err(CallError::timeout(options.timeout))
            }
            res = op(attempt_token.clone()) => res,
        };
        let duration_ms = started.elapsed().as_millis();

        match result {
            Ok(data) => {
                info!(step = id, attempt, duration_ms, "step succeeded");
                return StepResult::success(id, data, attempts);
            }
            Err(err) => {
                let retry = err.is_transient() && attempt < max_attempts;
                warn!(
                    step = id,
                    attempt,
                    duration_ms,
                    error_class = %err.class,
                    retry,
                    error = %err.message,
                    "step attempt failed"
                );
                last_error = err;
                if !retry {
                    break;
                }
            }
        }
    }

    StepResult::failure(id, last_error, attempts)
}

/// Run steps in order. With chain abort on, the first failure skips the rest
/// without creating result records.
pub async fn run_chain<T>(
    steps: Vec<Step<'_, T>>,
    options: &TaskOptions,
    cancel: &CancellationToken,
) -> TaskReport<T> {
    let total = steps.len();
    let mut results: Vec<StepResult<T>> = Vec::with_capacity(total);

    for mut step in steps {
        if options.abort_on_chain_failure && results.iter().any(|r| !r.is_success()) {
            info!(skipped = total - results.len(), "chain aborted after failed step");
            break;
        }
        if cancel.is_cancelled() {
            results.push(StepResult::failure(
                &step.id,
                CallError::cancelled(format!("step {} cancelled before start", step.id)),
                0,
            ));
            continue;
        }
        let result = run_step(&step.id, options, cancel, &mut step.run).await;
        results.push(result);
    }

    TaskReport { results }
}
