//! Dataset and sample management

use std::collections::BTreeSet;

use bon::bon;
use serde::de::{Deserializer, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::client::{ApiPath, NpdClient};
use crate::error::Result;
use crate::tasks::require_id;

/// A named collection of labeled dialogue samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Internal primary key assigned by the service
    #[serde(default)]
    pub id: Option<i64>,
    /// External identifier chosen at creation; never changes
    pub dataset_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One labeled example stored under a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: i64,
    pub persona: String,
    pub emotion: String,
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeSet<String>,
}

/// Sample contents submitted on creation; the service assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSample {
    pub persona: String,
    pub emotion: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl NewSample {
    pub fn new(
        persona: impl Into<String>,
        emotion: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            persona: persona.into(),
            emotion: emotion.into(),
            text: text.into(),
            tags: None,
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// Drops the local id; the service always assigns its own
impl From<Sample> for NewSample {
    fn from(sample: Sample) -> Self {
        Self {
            persona: sample.persona,
            emotion: sample.emotion,
            text: sample.text,
            tags: Some(sample.tags),
        }
    }
}

/// Partial sample update; only fields that are set are sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl SampleUpdate {
    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Partial dataset update; omitted fields keep their server-side value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Result of appending samples in bulk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSamplesResponse {
    pub added: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
struct CreateDatasetRequest<'a> {
    dataset_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<&'a [NewSample]>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn dataset_path(dataset_id: &str) -> ApiPath {
    ApiPath::new(["datasets", dataset_id])
}

fn samples_path(dataset_id: &str) -> ApiPath {
    ApiPath::new(["datasets", dataset_id, "samples"])
}

fn sample_path(dataset_id: &str, sample_id: i64) -> ApiPath {
    ApiPath::new([
        "datasets".to_string(),
        dataset_id.to_string(),
        "samples".to_string(),
        sample_id.to_string(),
    ])
}

#[bon]
impl NpdClient {
    /// Create a dataset, optionally seeded with samples
    ///
    /// The service rejects an existing `dataset_id` with `409`, surfaced as
    /// [`Error::RemoteCallFailed`](crate::Error::RemoteCallFailed).
    #[builder]
    pub async fn create_dataset(
        &self,
        #[builder(into)] dataset_id: String,
        #[builder(into)] description: Option<String>,
        #[builder(default)] samples: Vec<NewSample>,
    ) -> Result<Dataset> {
        require_id("dataset_id", &dataset_id)?;

        let request = CreateDatasetRequest {
            dataset_id: &dataset_id,
            description: description.as_deref(),
            samples: (!samples.is_empty()).then_some(samples.as_slice()),
        };

        self.create(&ApiPath::new(["datasets"]), &request).await
    }
}

impl NpdClient {
    /// Get a dataset by its external identifier; `Ok(None)` if unknown
    pub async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>> {
        require_id("dataset_id", dataset_id)?;
        self.read(&dataset_path(dataset_id)).await
    }

    /// List all datasets
    ///
    /// A `404` here means the base URL does not point at the service, so it is
    /// an error rather than an empty list.
    pub async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        self.fetch(&ApiPath::new(["datasets"])).await
    }

    /// Apply a partial update to a dataset
    pub async fn update_dataset(
        &self,
        dataset_id: &str,
        update: &DatasetUpdate,
    ) -> Result<Dataset> {
        require_id("dataset_id", dataset_id)?;
        self.replace(&dataset_path(dataset_id), update).await
    }

    /// Replace a dataset's description
    pub async fn update_dataset_description(
        &self,
        dataset_id: &str,
        description: impl Into<String>,
    ) -> Result<Dataset> {
        let update = DatasetUpdate {
            description: Some(description.into()),
        };
        self.update_dataset(dataset_id, &update).await
    }

    /// Delete a dataset
    ///
    /// Repeated deletes are forwarded unchanged; how the service answers a
    /// second delete is up to the service.
    pub async fn delete_dataset(&self, dataset_id: &str) -> Result<()> {
        require_id("dataset_id", dataset_id)?;
        self.remove::<IgnoredAny>(&dataset_path(dataset_id))
            .await
            .map(|_| ())
    }

    /// List the samples of a dataset; `Ok(None)` if the dataset is unknown
    pub async fn list_samples(&self, dataset_id: &str) -> Result<Option<Vec<Sample>>> {
        require_id("dataset_id", dataset_id)?;
        self.read(&samples_path(dataset_id)).await
    }

    /// Create one sample; the returned sample carries the service-assigned id
    pub async fn create_sample(
        &self,
        dataset_id: &str,
        sample: impl Into<NewSample>,
    ) -> Result<Sample> {
        require_id("dataset_id", dataset_id)?;
        let sample = sample.into();
        let path = ApiPath::new(["datasets", dataset_id, "samples", "new"]);
        self.create(&path, &sample).await
    }

    /// Append several samples at once
    pub async fn add_samples(
        &self,
        dataset_id: &str,
        samples: &[NewSample],
    ) -> Result<AddSamplesResponse> {
        require_id("dataset_id", dataset_id)?;
        self.create(&samples_path(dataset_id), samples).await
    }

    /// Apply a partial update to a sample
    pub async fn update_sample(
        &self,
        dataset_id: &str,
        sample_id: i64,
        update: &SampleUpdate,
    ) -> Result<Sample> {
        require_id("dataset_id", dataset_id)?;
        self.replace(&sample_path(dataset_id, sample_id), update).await
    }

    /// Delete a sample
    pub async fn delete_sample(&self, dataset_id: &str, sample_id: i64) -> Result<()> {
        require_id("dataset_id", dataset_id)?;
        self.remove::<IgnoredAny>(&sample_path(dataset_id, sample_id))
            .await
            .map(|_| ())
    }
}
