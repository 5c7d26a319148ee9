//! Configuration for the environment scheduler.
//!
//! Resource identifiers are deploy-time configuration: the trigger payload
//! carries only the action, and the scheduler resolves which compute
//! workload and database instance to act on from its environment.

use anyhow::Result;

use crate::retry::RetryPolicy;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Logical name of the environment, used in logs and results.
    pub environment_id: String,

    /// Compute workload identifier (service name).
    pub compute_id: String,

    /// Database instance identifier.
    pub database_id: String,

    /// Base URL of the platform control API.
    pub control_api_url: String,

    /// Desired count when the environment is active.
    pub steady_state_count: u32,

    /// Retry policy for transient control API errors.
    pub retry: RetryPolicy,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let environment_id =
            std::env::var("ENVCTL_ENVIRONMENT_ID").unwrap_or_else(|_| "conductor".to_string());

        let compute_id =
            std::env::var("ENVCTL_COMPUTE_ID").unwrap_or_else(|_| "ConductorService".to_string());

        let database_id =
            std::env::var("ENVCTL_DATABASE_ID").unwrap_or_else(|_| "ConductorDb".to_string());

        let control_api_url = std::env::var("ENVCTL_CONTROL_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let steady_state_count = std::env::var("ENVCTL_STEADY_STATE_COUNT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let retry = RetryPolicy::from_env();

        let log_level = std::env::var("ENVCTL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment_id,
            compute_id,
            database_id,
            control_api_url,
            steady_state_count,
            retry,
            log_level,
        })
    }
}
