//! Resource control contract for the environment scheduler.
//!
//! The cloud platform owns the two resources the scheduler manages:
//!
//! - **Compute workload**: the containerized application tier, scaled by
//!   desired instance count.
//! - **Database instance**: the managed relational store, started and
//!   stopped by power state.
//!
//! This library defines the capability surface over the platform's control
//! API (describe/mutate operations), the error taxonomy the scheduler
//! classifies retries by, and an in-memory fake for tests and development.
//!
//! # Invariants
//!
//! - The platform is the sole source of truth; statuses are never cached
//!   across invocations.
//! - Lifecycle states the contract does not recognize are treated as
//!   transient: a resource is never commanded while its state is unknown.

use std::collections::HashMap;
use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Observed state of the compute workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeStatus {
    /// Instance count the platform is currently converging toward.
    pub desired_count: u32,

    /// Instances actually running.
    pub running_count: u32,
}

/// Lifecycle state of the database instance, as reported by the platform.
///
/// Unknown states round-trip through [`DbLifecycle::Other`] and classify
/// as transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DbLifecycle {
    Available,
    Stopped,
    Starting,
    Stopping,
    BackingUp,
    Modifying,
    Other(String),
}

impl DbLifecycle {
    /// True when the instance is mid-transition and must not be commanded
    /// until the state resolves.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Available | Self::Stopped)
    }
}

impl From<String> for DbLifecycle {
    fn from(s: String) -> Self {
        match s.as_str() {
            "available" => Self::Available,
            "stopped" => Self::Stopped,
            "starting" => Self::Starting,
            "stopping" => Self::Stopping,
            "backing-up" => Self::BackingUp,
            "modifying" => Self::Modifying,
            _ => Self::Other(s),
        }
    }
}

impl From<DbLifecycle> for String {
    fn from(state: DbLifecycle) -> Self {
        state.to_string()
    }
}

impl std::fmt::Display for DbLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
            Self::BackingUp => "backing-up",
            Self::Modifying => "modifying",
            Self::Other(s) => s.as_str(),
        };
        write!(f, "{s}")
    }
}

/// Observed state of the database instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStatus {
    pub lifecycle: DbLifecycle,
}

/// Control API errors.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    /// Rate limited by the platform (transient).
    #[error("rate limited by control API")]
    RateLimited,

    /// Platform temporarily unavailable (transient).
    #[error("control API unavailable: {0}")]
    Unavailable(String),

    /// Network-level failure reaching the platform (transient).
    #[error("transport error: {0}")]
    Transport(String),

    /// Resource is mid-transition and rejected the command.
    #[error("conflicting state: {0}")]
    ConflictingState(String),

    /// Resource is already in the requested terminal state.
    ///
    /// Callers normalize this to success rather than treating it as a
    /// failure.
    #[error("resource already in requested state")]
    AlreadyInTargetState,

    /// Resource does not exist (permanent).
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Caller is not authorized (permanent).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed identifier or request (permanent).
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl ControlError {
    /// True for errors worth retrying within the same invocation.
    ///
    /// Conflicting state is deliberately not retryable: forcing a command
    /// at a mid-transition resource is rejected by the platform, and a
    /// future invocation re-observes state once the transition clears.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unavailable(_) | Self::Transport(_)
        )
    }
}

/// Capability surface over the cloud platform's control API.
///
/// Any implementation satisfying this contract works: the production
/// implementation speaks HTTP to the platform, [`FakeControl`] keeps
/// state in memory for tests.
#[async_trait]
pub trait ResourceControl: Send + Sync {
    /// Fetch the current status of the compute workload.
    async fn describe_compute(&self, id: &str) -> Result<ComputeStatus, ControlError>;

    /// Set the compute workload's desired instance count.
    async fn set_compute_desired_count(&self, id: &str, count: u32) -> Result<(), ControlError>;

    /// Fetch the current status of the database instance.
    async fn describe_database(&self, id: &str) -> Result<DatabaseStatus, ControlError>;

    /// Power on the database instance.
    async fn start_database(&self, id: &str) -> Result<(), ControlError>;

    /// Power off the database instance.
    async fn stop_database(&self, id: &str) -> Result<(), ControlError>;
}

/// A command the fake recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuedCommand {
    SetComputeDesiredCount { id: String, count: u32 },
    StartDatabase { id: String },
    StopDatabase { id: String },
}

struct FakeState {
    compute: ComputeStatus,
    database: DatabaseStatus,
    commands: Vec<IssuedCommand>,
    failures: HashMap<&'static str, VecDeque<ControlError>>,
}

/// In-memory control implementation for tests and development.
///
/// Commands mutate the held statuses and are journaled for assertions.
/// Failures can be scripted per operation: each scripted error is consumed
/// by the next call to that operation.
pub struct FakeControl {
    inner: Mutex<FakeState>,
}

impl FakeControl {
    /// Create a fake holding the given initial statuses.
    pub fn new(compute: ComputeStatus, database: DatabaseStatus) -> Self {
        Self {
            inner: Mutex::new(FakeState {
                compute,
                database,
                commands: Vec::new(),
                failures: HashMap::new(),
            }),
        }
    }

    /// Script an error for the next call to `op`.
    ///
    /// Valid operation names: `describe_compute`, `set_compute_desired_count`,
    /// `describe_database`, `start_database`, `stop_database`. Repeated
    /// calls queue further errors.
    pub async fn fail_next(&self, op: &'static str, err: ControlError) {
        let mut state = self.inner.lock().await;
        state.failures.entry(op).or_default().push_back(err);
    }

    /// Commands issued so far, in order.
    pub async fn commands(&self) -> Vec<IssuedCommand> {
        self.inner.lock().await.commands.clone()
    }

    /// Replace the database status (e.g. to simulate an out-of-band change).
    pub async fn set_database(&self, status: DatabaseStatus) {
        self.inner.lock().await.database = status;
    }
}

fn take_failure(state: &mut FakeState, op: &'static str) -> Option<ControlError> {
    state.failures.get_mut(op).and_then(VecDeque::pop_front)
}

#[async_trait]
impl ResourceControl for FakeControl {
    async fn describe_compute(&self, id: &str) -> Result<ComputeStatus, ControlError> {
        let mut state = self.inner.lock().await;
        if let Some(err) = take_failure(&mut state, "describe_compute") {
            return Err(err);
        }
        debug!(compute_id = %id, "[FAKE] Describing compute workload");
        Ok(state.compute)
    }

    async fn set_compute_desired_count(&self, id: &str, count: u32) -> Result<(), ControlError> {
        let mut state = self.inner.lock().await;
        if let Some(err) = take_failure(&mut state, "set_compute_desired_count") {
            return Err(err);
        }
        info!(compute_id = %id, count, "[FAKE] Setting compute desired count");
        state.compute.desired_count = count;
        state.commands.push(IssuedCommand::SetComputeDesiredCount {
            id: id.to_string(),
            count,
        });
        Ok(())
    }

    async fn describe_database(&self, id: &str) -> Result<DatabaseStatus, ControlError> {
        let mut state = self.inner.lock().await;
        if let Some(err) = take_failure(&mut state, "describe_database") {
            return Err(err);
        }
        debug!(database_id = %id, "[FAKE] Describing database instance");
        Ok(state.database.clone())
    }

    async fn start_database(&self, id: &str) -> Result<(), ControlError> {
        let mut state = self.inner.lock().await;
        if let Some(err) = take_failure(&mut state, "start_database") {
            return Err(err);
        }
        if state.database.lifecycle.is_transient() {
            return Err(ControlError::ConflictingState(
                state.database.lifecycle.to_string(),
            ));
        }
        if state.database.lifecycle == DbLifecycle::Available {
            return Err(ControlError::AlreadyInTargetState);
        }
        info!(database_id = %id, "[FAKE] Starting database instance");
        state.database.lifecycle = DbLifecycle::Starting;
        state.commands.push(IssuedCommand::StartDatabase {
            id: id.to_string(),
        });
        Ok(())
    }

    async fn stop_database(&self, id: &str) -> Result<(), ControlError> {
        let mut state = self.inner.lock().await;
        if let Some(err) = take_failure(&mut state, "stop_database") {
            return Err(err);
        }
        if state.database.lifecycle.is_transient() {
            return Err(ControlError::ConflictingState(
                state.database.lifecycle.to_string(),
            ));
        }
        if state.database.lifecycle == DbLifecycle::Stopped {
            return Err(ControlError::AlreadyInTargetState);
        }
        info!(database_id = %id, "[FAKE] Stopping database instance");
        state.database.lifecycle = DbLifecycle::Stopping;
        state.commands.push(IssuedCommand::StopDatabase {
            id: id.to_string(),
        });
        Ok(())
    }
}
