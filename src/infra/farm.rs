//! Remote build-farm client
//!
//! Small submit/poll/inspect surface over the remote build system,
//! consumed by the farm backend. The HTTP implementation speaks the
//! farm's JSON API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FarmError;

/// Identifier of a farm build task.
pub type TaskId = u64;

/// Lifecycle state of a farm task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    /// Still running
    Open,
    /// Failed
    Failed,
    /// Canceled by an operator
    Canceled,
    /// Completed successfully
    Closed,
}

/// Snapshot of one farm task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskInfo {
    /// Current state
    pub state: TaskState,
    /// Display label (method, arch, host)
    pub label: String,
}

/// One tagged build in a farm repository tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaggedBuild {
    /// Name-version-release of the build
    pub nvr: String,
    /// Repository event created when the build was tagged
    pub create_event: Option<i64>,
}

/// Client for the remote build farm.
#[async_trait]
pub trait FarmClient: Send + Sync {
    /// Submit a source reference for building against `target`.
    async fn submit(&self, source_ref: &str, target: &str) -> Result<TaskId, FarmError>;

    /// Fetch the current state of a task.
    async fn get_task_info(&self, task: TaskId) -> Result<TaskInfo, FarmError>;

    /// Fetch the current state of a task's children.
    async fn get_task_children(&self, task: TaskId) -> Result<Vec<TaskInfo>, FarmError>;

    /// List builds of `package` tagged into `tag`.
    async fn list_tagged(
        &self,
        tag: &str,
        package: &str,
        latest: bool,
    ) -> Result<Vec<TaggedBuild>, FarmError>;

    /// Current repository regeneration event for `tag`, if the tag has
    /// a generated repository at all.
    async fn get_repo_create_event(&self, tag: &str) -> Result<Option<i64>, FarmError>;

    /// Web link for a task, for human diagnosis.
    fn task_url(&self, task: TaskId) -> String;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: TaskId,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    create_event: Option<i64>,
}

/// Farm client over the HTTP JSON API.
#[derive(Debug, Clone)]
pub struct HttpFarmClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFarmClient {
    /// Create a client against `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, FarmError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FarmError::Network {
                url: url.clone(),
                error: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(FarmError::Http {
                status: response.status().as_u16(),
                url,
            });
        }
        response.json().await.map_err(|e| FarmError::Decode {
            url,
            error: e.to_string(),
        })
    }
}

#[async_trait]
impl FarmClient for HttpFarmClient {
    async fn submit(&self, source_ref: &str, target: &str) -> Result<TaskId, FarmError> {
        let url = format!("{}/build", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "source": source_ref, "target": target }))
            .send()
            .await
            .map_err(|e| FarmError::Network {
                url: url.clone(),
                error: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(FarmError::Http {
                status: response.status().as_u16(),
                url,
            });
        }
        let submitted: SubmitResponse =
            response.json().await.map_err(|e| FarmError::Decode {
                url,
                error: e.to_string(),
            })?;
        Ok(submitted.task_id)
    }

    async fn get_task_info(&self, task: TaskId) -> Result<TaskInfo, FarmError> {
        self.get_json(format!("{}/tasks/{task}", self.base_url)).await
    }

    async fn get_task_children(&self, task: TaskId) -> Result<Vec<TaskInfo>, FarmError> {
        self.get_json(format!("{}/tasks/{task}/children", self.base_url))
            .await
    }

    async fn list_tagged(
        &self,
        tag: &str,
        package: &str,
        latest: bool,
    ) -> Result<Vec<TaggedBuild>, FarmError> {
        self.get_json(format!(
            "{}/tags/{tag}/builds?package={package}&latest={latest}",
            self.base_url
        ))
        .await
    }

    async fn get_repo_create_event(&self, tag: &str) -> Result<Option<i64>, FarmError> {
        let repo: RepoResponse = self
            .get_json(format!("{}/tags/{tag}/repo", self.base_url))
            .await?;
        Ok(repo.create_event)
    }

    fn task_url(&self, task: TaskId) -> String {
        format!("{}/taskinfo?taskID={task}", self.base_url)
    }
}
