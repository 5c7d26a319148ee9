//! Transition planning for the environment scheduler.
//!
//! This library computes the minimal set of commands that converges an
//! environment to a desired target state. Key concepts:
//!
//! - **Target state**: What the environment should be (ACTIVE or SUSPENDED).
//! - **Observed state**: What the platform reports right now.
//! - **Transition plan**: The diff between them, as zero or more commands.
//!
//! # Invariants
//!
//! - Planning is pure and deterministic: identical observed inputs always
//!   produce identical plans, which makes concurrent reconciliations of the
//!   same target safe.
//! - A converged resource is never commanded.
//! - A database instance in a transient lifecycle state is never commanded;
//!   the plan records a deferral and a later invocation picks it up.

use envctl_control::{ComputeStatus, ControlError, DatabaseStatus};
use serde::{Deserialize, Serialize};

/// Desired state of the whole environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Serving traffic: compute at steady-state count, database available.
    Active,

    /// Idle: compute scaled to zero, database powered off.
    Suspended,
}

impl TargetState {
    /// Map a trigger action (`start` / `stop`) to a target state.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Active),
            "stop" => Some(Self::Suspended),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Error parsing a trigger action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl std::fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown trigger action: {:?}", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl std::str::FromStr for TargetState {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_action(s).ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// One invocation's input: which environment, and where it should go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTarget {
    pub environment_id: String,
    pub desired_state: TargetState,
}

/// Planned action for the database instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseStep {
    /// Already in the state the target implies.
    Converged,

    /// Power the instance on.
    Start,

    /// Power the instance off.
    Stop,

    /// Instance is mid-transition; do nothing this invocation.
    Defer { reason: String },
}

/// Commands computed for one invocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Desired count to set on the compute workload, if it differs from
    /// the observed desired count.
    pub scale_to: Option<u32>,

    /// Action for the database instance.
    pub database: DatabaseStep,
}

impl TransitionPlan {
    /// True when the environment is already converged.
    pub fn is_empty(&self) -> bool {
        self.scale_to.is_none() && self.database == DatabaseStep::Converged
    }
}

/// Compute the desired-count command for the compute workload, if any.
pub fn plan_compute(
    target: TargetState,
    steady_state_count: u32,
    status: &ComputeStatus,
) -> Option<u32> {
    let want = match target {
        TargetState::Active => steady_state_count,
        TargetState::Suspended => 0,
    };
    (status.desired_count != want).then_some(want)
}

/// Compute the database action for the target.
pub fn plan_database(target: TargetState, status: &DatabaseStatus) -> DatabaseStep {
    use envctl_control::DbLifecycle::{Available, Stopped};

    if status.lifecycle.is_transient() {
        return DatabaseStep::Defer {
            reason: format!("instance mid-transition: {}", status.lifecycle),
        };
    }
    match (&status.lifecycle, target) {
        (Available, TargetState::Suspended) => DatabaseStep::Stop,
        (Stopped, TargetState::Active) => DatabaseStep::Start,
        _ => DatabaseStep::Converged,
    }
}

/// Compute the full transition plan for one invocation.
pub fn plan(
    target: TargetState,
    steady_state_count: u32,
    compute: &ComputeStatus,
    database: &DatabaseStatus,
) -> TransitionPlan {
    TransitionPlan {
        scale_to: plan_compute(target, steady_state_count, compute),
        database: plan_database(target, database),
    }
}

/// Failure class reported per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Retries were exhausted on a retryable error.
    Transient,

    /// The error is not retryable (not found, permission denied, ...).
    Permanent,
}

impl FailureKind {
    /// Classify a control error into the failure class it reports as.
    pub fn classify(err: &ControlError) -> Self {
        if err.is_transient() {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// Outcome of the compute side of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComputeOutcome {
    /// Observed desired count already matched the target.
    Unchanged,

    /// Desired count was set to `to`.
    Scaled { to: u32 },

    /// The describe or command failed after `attempts` tries.
    Failed { kind: FailureKind, attempts: u32 },
}

/// Outcome of the database side of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DatabaseOutcome {
    /// Lifecycle state already matched the target.
    Unchanged,

    /// A start command was issued.
    Started,

    /// A stop command was issued.
    Stopped,

    /// Instance was mid-transition; no command issued.
    Skipped { reason: String },

    /// The describe or command failed after `attempts` tries.
    Failed { kind: FailureKind, attempts: u32 },
}

/// Composite result of one invocation, reported per resource.
///
/// A failure on one resource never hides the other's outcome; `success`
/// is simply "neither resource failed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub environment_id: String,
    pub target: TargetState,
    pub compute: ComputeOutcome,
    pub database: DatabaseOutcome,
    pub success: bool,
}

impl ReconcileResult {
    pub fn new(
        environment_id: impl Into<String>,
        target: TargetState,
        compute: ComputeOutcome,
        database: DatabaseOutcome,
    ) -> Self {
        let success = !matches!(compute, ComputeOutcome::Failed { .. })
            && !matches!(database, DatabaseOutcome::Failed { .. });
        Self {
            environment_id: environment_id.into(),
            target,
            compute,
            database,
            success,
        }
    }
}
