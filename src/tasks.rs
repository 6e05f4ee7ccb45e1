//! Training and evaluation tasks
//!
//! Starting a task returns a snapshot in state [`TaskState::Queued`]; the service
//! then moves it through `running` to `succeeded` or `failed`. Use
//! [`TaskPoller`](crate::poller::TaskPoller) to wait for the terminal state.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use bon::{bon, Builder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{ApiPath, NpdClient};
use crate::error::{Error, Result};

/// Model tag the service falls back to when none is given
pub const DEFAULT_MODEL_TAG: &str = "baseline_stub_v0";

const DEFAULT_LR: f64 = 1e-4;
const DEFAULT_BATCH_SIZE: u32 = 16;
const DEFAULT_EPOCHS: u32 = 5;
const DEFAULT_SEED: i64 = 42;

/// Kind of asynchronous work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Train,
    Evaluate,
}

impl TaskKind {
    /// Route prefix the service uses for this kind
    pub fn route(self) -> &'static str {
        match self {
            TaskKind::Train => "training",
            TaskKind::Evaluate => "evaluation",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Train => f.write_str("train"),
            TaskKind::Evaluate => f.write_str("evaluate"),
        }
    }
}

/// Lifecycle state of a task or model version.
///
/// Transitions are monotone: `queued -> running -> succeeded | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    // Older service builds emit the misspelled form
    #[serde(alias = "succeded")]
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    /// Position in the lifecycle; both terminal states share the last rank
    pub fn rank(self) -> u8 {
        match self {
            TaskState::Queued => 0,
            TaskState::Running => 1,
            TaskState::Succeeded | TaskState::Failed => 2,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.pad(name)
    }
}

/// Training hyperparameters
///
/// ```
/// use npd_client::tasks::Hyperparameters;
///
/// let hp = Hyperparameters::builder().lr(1e-3).batch_size(32).build();
/// assert_eq!(hp.epochs, 5);
/// assert_eq!(hp.seed, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct Hyperparameters {
    #[builder(default = DEFAULT_LR)]
    pub lr: f64,
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: u32,
    #[builder(default = DEFAULT_EPOCHS)]
    pub epochs: u32,
    #[builder(default = DEFAULT_SEED)]
    pub seed: i64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            lr: DEFAULT_LR,
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            seed: DEFAULT_SEED,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<()> {
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(Error::Validation(format!(
                "learning rate must be a positive number, got {}",
                self.lr
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Validation("batch_size must be at least 1".to_string()));
        }
        if self.epochs == 0 {
            return Err(Error::Validation("epochs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Metrics an evaluation can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMetric {
    Loss,
    Accuracy,
    Perplexity,
    StyleScore,
}

impl EvalMetric {
    /// Metrics requested when the caller does not choose any
    pub fn defaults() -> Vec<EvalMetric> {
        vec![EvalMetric::Loss, EvalMetric::Accuracy]
    }
}

/// Snapshot of a task as last reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "job_id")]
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub state: TaskState,
    pub created_at: f64,
    #[serde(default)]
    pub started_at: Option<f64>,
    #[serde(default)]
    pub ended_at: Option<f64>,
    /// Fraction complete in `[0, 1]`
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    pub model_tag: String,
    #[serde(default)]
    pub dataset_id: Option<String>,
    /// Submitted hyperparameters (training only)
    #[serde(default, alias = "Hyperparameters")]
    pub hyperparameters: Option<Hyperparameters>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// One entry per observed checkpoint, oldest first
    #[serde(default)]
    pub history: Vec<BTreeMap<String, f64>>,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Succeeded
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Most recent checkpoint in the history
    pub fn latest_checkpoint(&self) -> Option<&BTreeMap<String, f64>> {
        self.history.last()
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        epoch_seconds_to_utc(self.created_at)
    }

    pub fn started_at_utc(&self) -> Option<DateTime<Utc>> {
        self.started_at.and_then(epoch_seconds_to_utc)
    }

    pub fn ended_at_utc(&self) -> Option<DateTime<Utc>> {
        self.ended_at.and_then(epoch_seconds_to_utc)
    }

    /// Wall time between start and end, once both are known
    pub fn run_time(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.ended_at?);
        Duration::try_from_secs_f64(end - start).ok()
    }
}

/// Convert fractional epoch seconds as sent by the service
pub fn epoch_seconds_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

#[derive(Debug, Serialize)]
struct TrainRequest<'a> {
    model_tag: &'a str,
    dataset_id: &'a str,
    hyperparameters: Hyperparameters,
}

#[derive(Debug, Serialize)]
struct EvaluationRequest<'a> {
    model_tag: &'a str,
    dataset_id: &'a str,
    metrics: &'a [EvalMetric],
}

pub(crate) fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[bon]
impl NpdClient {
    /// Submit a training task; the returned snapshot is `queued`
    #[builder]
    pub async fn start_training(
        &self,
        #[builder(into)] dataset_id: String,
        #[builder(into, default = DEFAULT_MODEL_TAG.to_string())] model_tag: String,
        #[builder(default)] hyperparameters: Hyperparameters,
    ) -> Result<Task> {
        require_id("dataset_id", &dataset_id)?;
        require_id("model_tag", &model_tag)?;
        hyperparameters.validate()?;

        let request = TrainRequest {
            model_tag: &model_tag,
            dataset_id: &dataset_id,
            hyperparameters,
        };

        self.create(&ApiPath::new(["training", "start"]), &request).await
    }

    /// Submit an evaluation task; the returned snapshot is `queued`
    #[builder]
    pub async fn start_evaluation(
        &self,
        #[builder(into)] model_tag: String,
        #[builder(into)] dataset_id: String,
        #[builder(default = EvalMetric::defaults())] metrics: Vec<EvalMetric>,
    ) -> Result<Task> {
        require_id("dataset_id", &dataset_id)?;
        require_id("model_tag", &model_tag)?;
        if metrics.is_empty() {
            return Err(Error::Validation(
                "at least one evaluation metric is required".to_string(),
            ));
        }

        let request = EvaluationRequest {
            model_tag: &model_tag,
            dataset_id: &dataset_id,
            metrics: &metrics,
        };

        self.create(&ApiPath::new(["evaluation", "start"]), &request).await
    }
}

impl NpdClient {
    /// Fetch a task snapshot; `Ok(None)` if the service does not know the id
    pub async fn get_task(&self, kind: TaskKind, task_id: &str) -> Result<Option<Task>> {
        require_id("task_id", task_id)?;
        self.read(&ApiPath::new([kind.route(), task_id])).await
    }

    pub async fn get_training_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.get_task(TaskKind::Train, task_id).await
    }

    pub async fn get_evaluation_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.get_task(TaskKind::Evaluate, task_id).await
    }
}
