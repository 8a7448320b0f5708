use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::model::{NewNode, NewTag, Node, NodeId, NodePatch, Tag};

const DEFAULT_BASE_URL: &str = "https://api.taskfold.app";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// True for connectivity-level failures that never reached the server.
    /// These route callers to the offline path instead of surfacing as
    /// operation failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Request(err) if err.is_connect() || err.is_timeout())
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(token: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_all_nodes(&self) -> Result<Vec<Node>, ApiError> {
        let url = self.endpoint("/v1/nodes/all")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_nodes(&self, parent_id: Option<&NodeId>) -> Result<Vec<Node>, ApiError> {
        let mut url = self.endpoint("/v1/nodes")?;
        if let Some(parent_id) = parent_id {
            url.query_pairs_mut()
                .append_pair("parent_id", parent_id.as_str());
        }
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_node(&self, id: &NodeId) -> Result<Node, ApiError> {
        let url = self.endpoint(&format!("/v1/nodes/{id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_folder(&self, new: &NewNode) -> Result<Node, ApiError> {
        self.post_json("/v1/folders", new).await
    }

    pub async fn create_task(&self, new: &NewNode) -> Result<Node, ApiError> {
        self.post_json("/v1/tasks", new).await
    }

    pub async fn create_note(&self, new: &NewNode) -> Result<Node, ApiError> {
        self.post_json("/v1/notes", new).await
    }

    /// Generic create for node types without a dedicated endpoint
    /// (templates, smart folders). The type travels in the body.
    pub async fn create_node(&self, new: &NewNode) -> Result<Node, ApiError> {
        self.post_json("/v1/nodes", new).await
    }

    pub async fn update_node(&self, id: &NodeId, patch: &NodePatch) -> Result<Node, ApiError> {
        let url = self.endpoint(&format!("/v1/nodes/{id}"))?;
        let response = self
            .http
            .patch(url)
            .header("Authorization", self.auth_header_value())
            .json(patch)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_node(&self, id: &NodeId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/v1/nodes/{id}"))?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Api { status, body })
    }

    /// Toggles a task and passes the current completion state explicitly,
    /// so a replayed toggle cannot double-flip server state.
    pub async fn toggle_task_completion(
        &self,
        id: &NodeId,
        currently_completed: bool,
    ) -> Result<Node, ApiError> {
        let url = self.endpoint(&format!("/v1/tasks/{id}/toggle"))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&serde_json::json!({ "completed": currently_completed }))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_tags(&self) -> Result<Vec<Tag>, ApiError> {
        let url = self.endpoint("/v1/tags")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn search_tags(&self, query: &str, limit: u32) -> Result<Vec<Tag>, ApiError> {
        let mut url = self.endpoint("/v1/tags/search")?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &limit.to_string());
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_tag(&self, new: &NewTag) -> Result<Tag, ApiError> {
        self.post_json("/v1/tags", new).await
    }

    pub async fn attach_tag(&self, node_id: &NodeId, tag_id: &str) -> Result<Node, ApiError> {
        let url = self.endpoint(&format!("/v1/nodes/{node_id}/tags/{tag_id}"))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn detach_tag(&self, node_id: &NodeId, tag_id: &str) -> Result<Node, ApiError> {
        let url = self.endpoint(&format!("/v1/nodes/{node_id}/tags/{tag_id}"))?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_default_node(&self) -> Result<Option<NodeId>, ApiError> {
        let url = self.endpoint("/v1/defaults/node")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let payload: DefaultNodeResponse = Self::handle_response(response).await?;
        Ok(payload.node_id)
    }

    pub async fn set_default_node(&self, id: &NodeId) -> Result<(), ApiError> {
        let url = self.endpoint("/v1/defaults/node")?;
        let response = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .json(&serde_json::json!({ "node_id": id }))
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Api { status, body })
    }

    pub async fn instantiate_template(
        &self,
        template_id: &NodeId,
        parent_id: Option<&NodeId>,
    ) -> Result<Node, ApiError> {
        let mut url = self.endpoint(&format!("/v1/templates/{template_id}/instantiate"))?;
        if let Some(parent_id) = parent_id {
            url.query_pairs_mut()
                .append_pair("parent_id", parent_id.as_str());
        }
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn execute_smart_folder_rule(&self, id: &NodeId) -> Result<Vec<Node>, ApiError> {
        let url = self.endpoint(&format!("/v1/smart-folders/{id}/run"))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    // Decodes from text instead of `Response::json` so malformed bodies
    // surface as `ApiError::Decode`, distinct from HTTP-status errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Api { status, body })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DefaultNodeResponse {
    #[serde(default)]
    pub node_id: Option<NodeId>,
}
