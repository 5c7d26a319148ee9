//! HTTP client for the platform control API.
//!
//! Implements the [`ResourceControl`] contract against the platform's REST
//! surface. Error responses carry a JSON body `{code, message}`; the code
//! takes precedence over the HTTP status when classifying, since the
//! platform reports both "already in the requested state" and "resource
//! mid-transition" as conflicts.

use std::time::Duration;

use async_trait::async_trait;
use envctl_control::{ComputeStatus, ControlError, DatabaseStatus, ResourceControl};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Control API client.
pub struct HttpControl {
    client: reqwest::Client,
    base_url: String,
}

impl HttpControl {
    /// Create a new control API client.
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send a request and classify any non-success response.
    async fn execute(
        &self,
        req: reqwest::RequestBuilder,
        resource: &str,
    ) -> Result<reqwest::Response, ControlError> {
        let response = req
            .send()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, resource = %resource, "Control API error response");
        Err(classify(status, &body, resource))
    }
}

/// Error body returned by the control API.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct DesiredCountRequest {
    desired_count: u32,
}

/// Map an error response to the control error taxonomy.
fn classify(status: reqwest::StatusCode, body: &str, resource: &str) -> ControlError {
    let (code, message) = match serde_json::from_str::<ApiError>(body) {
        Ok(err) => (err.code, err.message),
        Err(_) => (String::new(), body.to_string()),
    };

    match code.as_str() {
        "already_in_target_state" => return ControlError::AlreadyInTargetState,
        "conflicting_state" => return ControlError::ConflictingState(message),
        _ => {}
    }

    let message = if message.is_empty() {
        resource.to_string()
    } else {
        message
    };

    match status.as_u16() {
        429 => ControlError::RateLimited,
        409 => ControlError::ConflictingState(message),
        404 => ControlError::NotFound(resource.to_string()),
        401 | 403 => ControlError::PermissionDenied(message),
        400 => ControlError::Malformed(message),
        _ => ControlError::Unavailable(format!("{status}: {message}")),
    }
}

#[async_trait]
impl ResourceControl for HttpControl {
    async fn describe_compute(&self, id: &str) -> Result<ComputeStatus, ControlError> {
        let url = format!("{}/v1/compute/{}", self.base_url, id);
        debug!(url = %url, "Describing compute workload");

        let response = self.execute(self.client.get(&url), id).await?;
        response
            .json()
            .await
            .map_err(|e| ControlError::Transport(format!("invalid response body: {e}")))
    }

    async fn set_compute_desired_count(&self, id: &str, count: u32) -> Result<(), ControlError> {
        let url = format!("{}/v1/compute/{}/desired-count", self.base_url, id);
        debug!(url = %url, count, "Setting compute desired count");

        let req = self
            .client
            .put(&url)
            .json(&DesiredCountRequest {
                desired_count: count,
            });
        self.execute(req, id).await?;
        Ok(())
    }

    async fn describe_database(&self, id: &str) -> Result<DatabaseStatus, ControlError> {
        let url = format!("{}/v1/databases/{}", self.base_url, id);
        debug!(url = %url, "Describing database instance");

        let response = self.execute(self.client.get(&url), id).await?;
        response
            .json()
            .await
            .map_err(|e| ControlError::Transport(format!("invalid response body: {e}")))
    }

    async fn start_database(&self, id: &str) -> Result<(), ControlError> {
        let url = format!("{}/v1/databases/{}/start", self.base_url, id);
        debug!(url = %url, "Starting database instance");

        self.execute(self.client.post(&url), id).await?;
        Ok(())
    }

    async fn stop_database(&self, id: &str) -> Result<(), ControlError> {
        let url = format!("{}/v1/databases/{}/stop", self.base_url, id);
        debug!(url = %url, "Stopping database instance");

        self.execute(self.client.post(&url), id).await?;
        Ok(())
    }
}
