//! Waiting for tasks to finish
//!
//! The service has no push channel, so completion is detected by re-reading a
//! task until it reaches `succeeded` or `failed`.
//!
//! ## Default Policy
//!
//! | Setting | Default Value | Description |
//! |---------|--------------|-------------|
//! | `interval` | 500 ms | Wait between fetches |
//! | `jitter` | Disabled | Add up to 25% random delay to each wait |
//! | `deadline` | None | Give up after this much wall time |
//! | `max_attempts` | None | Give up after this many fetches |
//! | `on_missing` | `Fail` | What an absent task means |
//! | `tolerated_errors` | 0 | Consecutive retryable errors absorbed |
//! | `require_healthy` | true | Check `/ping` before the first fetch |
//!
//! With the defaults the loop runs until the task is terminal or the caller
//! cancels; there is no backoff.
//!
//! ## Example
//!
//! ```no_run
//! use npd_client::{NpdClient, PollPolicy, TaskKind};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NpdClient::from_env()?;
//! let task = client.start_training().dataset_id("demo").call().await?;
//!
//! let poller = client.poller(
//!     PollPolicy::builder()
//!         .deadline(Duration::from_secs(120))
//!         .build(),
//! );
//! let finished = poller
//!     .wait(TaskKind::Train, &task.task_id, &CancellationToken::new())
//!     .await?;
//! println!("{} -> {}", finished.task_id, finished.state);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use bon::Builder;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::NpdClient;
use crate::error::{Error, Result};
use crate::health::HealthStatus;
use crate::registry::ModelVersion;
use crate::tasks::{Task, TaskKind, TaskState};

/// Default wait between fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What an absent (`404`) read means while polling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingTaskPolicy {
    /// Stop with [`Error::NotFound`]
    #[default]
    Fail,
    /// Treat it as "not ready yet" and keep polling
    Retry,
}

/// Limits and pacing for a polling loop
#[derive(Debug, Clone, Builder)]
pub struct PollPolicy {
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    pub interval: Duration,
    #[builder(default)]
    pub jitter: bool,
    pub deadline: Option<Duration>,
    pub max_attempts: Option<u32>,
    #[builder(default)]
    pub on_missing: MissingTaskPolicy,
    #[builder(default)]
    pub tolerated_errors: u32,
    #[builder(default = true)]
    pub require_healthy: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PollPolicy {
    fn next_delay(&self) -> Duration {
        if !self.jitter {
            return self.interval;
        }
        // 25% jitter
        let jitter_range = self.interval.as_millis() as u64 / 4;
        let jitter = rand::rng().random_range(0..=jitter_range);
        self.interval + Duration::from_millis(jitter)
    }
}

/// Anything with a task-style lifecycle the poller can wait on
pub trait Trackable {
    fn state(&self) -> TaskState;
}

impl Trackable for Task {
    fn state(&self) -> TaskState {
        self.state
    }
}

impl Trackable for ModelVersion {
    fn state(&self) -> TaskState {
        self.state
    }
}

/// Re-reads a task until it reaches a terminal state
#[derive(Debug, Clone)]
pub struct TaskPoller {
    client: NpdClient,
    policy: PollPolicy,
}

impl NpdClient {
    /// A poller sharing this client's connection pool
    pub fn poller(&self, policy: PollPolicy) -> TaskPoller {
        TaskPoller::new(self.clone(), policy)
    }

    /// Wait for a task with the default policy
    pub async fn wait_for_task(
        &self,
        kind: TaskKind,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Task> {
        self.poller(PollPolicy::default())
            .wait(kind, task_id, cancel)
            .await
    }
}

impl TaskPoller {
    pub fn new(client: NpdClient, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Wait until the task is `succeeded` or `failed` and return that snapshot
    pub async fn wait(
        &self,
        kind: TaskKind,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Task> {
        self.wait_with_progress(kind, task_id, cancel, |_| {}).await
    }

    /// Like [`wait`](Self::wait), calling `on_update` with every snapshot fetched
    pub async fn wait_with_progress<F>(
        &self,
        kind: TaskKind,
        task_id: &str,
        cancel: &CancellationToken,
        on_update: F,
    ) -> Result<Task>
    where
        F: FnMut(&Task),
    {
        let client = &self.client;
        let target = format!("{} task {}", kind, task_id);
        self.drive(&target, cancel, move || client.get_task(kind, task_id), on_update).await
    }

    /// Wait for a model version started with `train_model`
    pub async fn wait_for_model_version(
        &self,
        model_id: &str,
        version_id: i64,
        cancel: &CancellationToken,
    ) -> Result<ModelVersion> {
        let client = &self.client;
        let target = format!("model {} version {}", model_id, version_id);
        self.drive(
            &target,
            cancel,
            move || client.get_model_version(model_id, version_id),
            |_| {},
        )
        .await
    }

    async fn drive<T, F, Fut, U>(
        &self,
        target: &str,
        cancel: &CancellationToken,
        mut fetch: F,
        mut on_update: U,
    ) -> Result<T>
    where
        T: Trackable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
        U: FnMut(&T),
    {
        let started = Instant::now();
        let expires_at = self.policy.deadline.map(|deadline| started + deadline);
        let timed_out = |last_state: Option<TaskState>| Error::PollTimeout {
            target: target.to_string(),
            elapsed: started.elapsed(),
            last_state,
        };

        if self.policy.require_healthy {
            let health = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = expired(expires_at) => return Err(timed_out(None)),
                result = self.client.ping() => result,
            };
            check_health(health)?;
        }

        let mut attempts: u32 = 0;
        let mut consecutive_errors: u32 = 0;
        let mut last_state: Option<TaskState> = None;

        loop {
            attempts += 1;

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = expired(expires_at) => return Err(timed_out(last_state)),
                result = fetch() => result,
            };

            match fetched {
                Ok(Some(snapshot)) => {
                    consecutive_errors = 0;
                    let state = snapshot.state();
                    if let Some(previous) = last_state {
                        if state.rank() < previous.rank() {
                            warn!(
                                task = %target,
                                %previous,
                                current = %state,
                                "task state went backwards"
                            );
                        }
                    }
                    last_state = Some(state);
                    on_update(&snapshot);

                    if state.is_terminal() {
                        debug!(task = %target, %state, attempts, "polling finished");
                        return Ok(snapshot);
                    }
                }
                Ok(None) => match self.policy.on_missing {
                    MissingTaskPolicy::Fail => return Err(Error::NotFound(target.to_string())),
                    MissingTaskPolicy::Retry => {
                        debug!(task = %target, attempts, "task not visible yet");
                    }
                },
                Err(e) if e.is_retryable() && consecutive_errors < self.policy.tolerated_errors => {
                    consecutive_errors += 1;
                    warn!(
                        task = %target,
                        error = %e,
                        consecutive_errors,
                        "transient error while polling"
                    );
                }
                Err(e) => return Err(e),
            }

            if let Some(max_attempts) = self.policy.max_attempts {
                if attempts >= max_attempts {
                    return Err(Error::PollExhausted {
                        target: target.to_string(),
                        attempts,
                        last_state,
                    });
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = expired(expires_at) => return Err(timed_out(last_state)),
                _ = tokio::time::sleep(self.policy.next_delay()) => {}
            }
        }
    }
}

/// Resolves once `at` has passed; never resolves without a deadline
async fn expired(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn check_health(health: Result<Option<HealthStatus>>) -> Result<()> {
    match health {
        Ok(Some(status)) if status.is_ok() => Ok(()),
        Ok(Some(_)) => Err(Error::ServiceUnavailable(
            "service reported ok=false".to_string(),
        )),
        Ok(None) => Err(Error::ServiceUnavailable(
            "health endpoint not found".to_string(),
        )),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => Err(Error::ServiceUnavailable(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert!(!policy.jitter);
        assert!(policy.deadline.is_none());
        assert!(policy.max_attempts.is_none());
        assert_eq!(policy.on_missing, MissingTaskPolicy::Fail);
        assert_eq!(policy.tolerated_errors, 0);
        assert!(policy.require_healthy);
    }

    #[test]
    fn test_health_check_outcomes() {
        let mut healthy = serde_json::Map::new();
        healthy.insert("ok".to_string(), true.into());
        assert!(check_health(Ok(Some(HealthStatus(healthy)))).is_ok());
        assert!(check_health(Ok(Some(HealthStatus::default()))).is_ok());

        let mut unhealthy = serde_json::Map::new();
        unhealthy.insert("ok".to_string(), false.into());
        let unhealthy = HealthStatus(unhealthy);
        assert!(matches!(
            check_health(Ok(Some(unhealthy))),
            Err(Error::ServiceUnavailable(_))
        ));
        assert!(matches!(check_health(Ok(None)), Err(Error::ServiceUnavailable(_))));
        assert!(matches!(check_health(Err(Error::Cancelled)), Err(Error::Cancelled)));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = PollPolicy::builder()
            .interval(Duration::from_millis(400))
            .jitter(true)
            .build();
        for _ in 0..50 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(500));
        }

        let steady = PollPolicy::builder().interval(Duration::from_millis(400)).build();
        assert_eq!(steady.next_delay(), Duration::from_millis(400));
    }
}
