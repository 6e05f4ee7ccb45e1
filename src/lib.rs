//! Rust client for the NPD dataset and training service
//!
//! This crate provides typed access to datasets, samples, training and evaluation
//! tasks, text generation, and the model registry, using builder patterns powered by
//! the `bon` crate. Long-running tasks are driven to completion with [`TaskPoller`].
//!
//! ```no_run
//! use npd_client::{NewSample, NpdClient, TaskKind};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> npd_client::Result<()> {
//! let client = NpdClient::builder().base_url("http://127.0.0.1:8000").build()?;
//!
//! client.create_dataset().dataset_id("demo").call().await?;
//! client
//!     .create_sample("demo", NewSample::new("guard", "stern", "Halt!"))
//!     .await?;
//!
//! let task = client.start_training().dataset_id("demo").call().await?;
//! let done = client
//!     .wait_for_task(TaskKind::Train, &task.task_id, &CancellationToken::new())
//!     .await?;
//! println!("training {}: {}", done.state, done.message);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod datasets;
pub mod error;
pub mod generate;
pub mod health;
pub mod poller;
pub mod registry;
pub mod tasks;

pub use client::{ApiPath, NpdClient};
pub use datasets::{AddSamplesResponse, Dataset, DatasetUpdate, NewSample, Sample, SampleUpdate};
pub use error::{Error, Result};
pub use generate::{Candidate, GenerateResponse};
pub use health::HealthStatus;
pub use poller::{MissingTaskPolicy, PollPolicy, TaskPoller, Trackable};
pub use registry::{ModelRecord, ModelVersion};
pub use tasks::{EvalMetric, Hyperparameters, Task, TaskKind, TaskState};
pub use tokio_util::sync::CancellationToken;
