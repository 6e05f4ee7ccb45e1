//! Model registry: registered models, their trained versions, and promotion

use std::collections::BTreeMap;

use bon::bon;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::{ApiPath, NpdClient};
use crate::error::Result;
use crate::tasks::{require_id, Hyperparameters, TaskState};

/// A registered model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: i64,
    /// External identifier, unique across the registry
    pub model_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub active_version_id: Option<i64>,
    pub created_at: f64,
    pub updated_at: f64,
}

/// One trained version of a registered model
///
/// Follows the same `queued -> running -> succeeded | failed` lifecycle as a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: i64,
    pub model_fk: i64,
    #[serde(default)]
    pub version_tag: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    pub state: TaskState,
    pub created_at: f64,
    #[serde(default)]
    pub started_at: Option<f64>,
    #[serde(default)]
    pub ended_at: Option<f64>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub artifact_path: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ModelVersion {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Debug, Serialize)]
struct ModelRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    model_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_version_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct TrainModelRequest<'a> {
    dataset_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version_tag: Option<&'a str>,
    hyperparameters: Hyperparameters,
}

fn model_path(model_id: &str) -> ApiPath {
    ApiPath::new(["models", model_id])
}

fn version_path(model_id: &str, version_id: i64) -> ApiPath {
    ApiPath::new([
        "models".to_string(),
        model_id.to_string(),
        "versions".to_string(),
        version_id.to_string(),
    ])
}

#[bon]
impl NpdClient {
    /// Register a model
    #[builder]
    pub async fn create_model(
        &self,
        #[builder(into)] model_id: String,
        #[builder(into)] description: Option<String>,
        #[builder(into)] model_type: Option<String>,
        config: Option<Map<String, Value>>,
        active_version_id: Option<i64>,
    ) -> Result<ModelRecord> {
        require_id("model_id", &model_id)?;

        let request = ModelRequest {
            model_id: Some(&model_id),
            description: description.as_deref(),
            model_type: model_type.as_deref(),
            config: config.as_ref(),
            active_version_id,
        };

        self.create(&ApiPath::new(["models"]), &request).await
    }

    /// Partially update a registered model; unset fields are left alone
    #[builder]
    pub async fn update_model(
        &self,
        #[builder(into)] model_id: String,
        #[builder(into)] description: Option<String>,
        #[builder(into)] model_type: Option<String>,
        config: Option<Map<String, Value>>,
        active_version_id: Option<i64>,
    ) -> Result<ModelRecord> {
        require_id("model_id", &model_id)?;

        let request = ModelRequest {
            model_id: None,
            description: description.as_deref(),
            model_type: model_type.as_deref(),
            config: config.as_ref(),
            active_version_id,
        };

        self.replace(&model_path(&model_id), &request).await
    }

    /// Train a new version of a registered model; the version starts `queued`
    #[builder]
    pub async fn train_model(
        &self,
        #[builder(into)] model_id: String,
        #[builder(into)] dataset_id: String,
        #[builder(into)] version_tag: Option<String>,
        #[builder(default)] hyperparameters: Hyperparameters,
    ) -> Result<ModelVersion> {
        require_id("model_id", &model_id)?;
        require_id("dataset_id", &dataset_id)?;
        hyperparameters.validate()?;

        let request = TrainModelRequest {
            dataset_id: &dataset_id,
            version_tag: version_tag.as_deref(),
            hyperparameters,
        };

        let path = ApiPath::new(["models", model_id.as_str(), "train"]);
        self.create(&path, &request).await
    }
}

impl NpdClient {
    /// List registered models; a `404` is an error, not an empty registry
    pub async fn list_models(&self) -> Result<Vec<ModelRecord>> {
        self.fetch(&ApiPath::new(["models"])).await
    }

    /// Get a registered model; `Ok(None)` if unknown
    pub async fn get_model(&self, model_id: &str) -> Result<Option<ModelRecord>> {
        require_id("model_id", model_id)?;
        self.read(&model_path(model_id)).await
    }

    /// Delete a model together with all of its versions
    pub async fn delete_model(&self, model_id: &str) -> Result<()> {
        require_id("model_id", model_id)?;
        self.remove::<IgnoredAny>(&model_path(model_id))
            .await
            .map(|_| ())
    }

    /// List versions of a model; `Ok(None)` if the model is unknown
    pub async fn list_model_versions(&self, model_id: &str) -> Result<Option<Vec<ModelVersion>>> {
        require_id("model_id", model_id)?;
        self.read(&ApiPath::new(["models", model_id, "versions"])).await
    }

    pub async fn get_model_version(
        &self,
        model_id: &str,
        version_id: i64,
    ) -> Result<Option<ModelVersion>> {
        require_id("model_id", model_id)?;
        self.read(&version_path(model_id, version_id)).await
    }

    /// Make `version_id` the model's active version
    pub async fn promote_model_version(
        &self,
        model_id: &str,
        version_id: i64,
    ) -> Result<ModelRecord> {
        require_id("model_id", model_id)?;
        let path = ApiPath::new([
            "models".to_string(),
            model_id.to_string(),
            "versions".to_string(),
            version_id.to_string(),
            "promote".to_string(),
        ]);
        self.replace(&path, &Map::new()).await
    }
}
