//! Single-pass reconciliation of the environment against a target state.
//!
//! The scheduler:
//! - Observes the live state of both resources (never cached; the platform
//!   may have been modified out-of-band since the last invocation)
//! - Computes the minimal transition plan
//! - Issues the planned commands with bounded retry on transient errors
//!
//! The two resources are handled independently: a failure on one never
//! aborts processing of the other, and the composite result reports each
//! outcome separately. The scheduler holds no state between invocations
//! and never assumes a previous invocation ran or succeeded.

use std::future::Future;
use std::sync::Arc;

use envctl_control::{ControlError, ResourceControl};
use envctl_reconcile::{
    plan_compute, plan_database, ComputeOutcome, DatabaseOutcome, DatabaseStep, EnvironmentTarget,
    FailureKind, ReconcileResult, TargetState,
};
use tracing::{info, warn};

use crate::config::Config;

/// The environment scheduler.
pub struct Scheduler {
    control: Arc<dyn ResourceControl>,
    config: Config,
}

impl Scheduler {
    /// Create a new scheduler over the given control capability.
    pub fn new(control: Arc<dyn ResourceControl>, config: Config) -> Self {
        Self { control, config }
    }

    /// Run a single reconciliation pass toward the target.
    pub async fn reconcile(&self, target: &EnvironmentTarget) -> ReconcileResult {
        info!(
            environment_id = %target.environment_id,
            desired_state = %target.desired_state,
            compute_id = %self.config.compute_id,
            database_id = %self.config.database_id,
            "Starting reconciliation"
        );

        // Independent control paths: command ordering between the two
        // resources carries no dependency.
        let (compute, database) = tokio::join!(
            self.reconcile_compute(target.desired_state),
            self.reconcile_database(target.desired_state),
        );

        let result = ReconcileResult::new(
            target.environment_id.clone(),
            target.desired_state,
            compute,
            database,
        );
        info!(
            environment_id = %result.environment_id,
            success = result.success,
            compute = ?result.compute,
            database = ?result.database,
            "Reconciliation complete"
        );
        result
    }

    /// Converge the compute workload's desired count.
    async fn reconcile_compute(&self, desired: TargetState) -> ComputeOutcome {
        let id = self.config.compute_id.as_str();

        let status = match self
            .with_retry("compute", "describe", || self.control.describe_compute(id))
            .await
        {
            Ok(status) => status,
            Err((err, attempts)) => {
                warn!(compute_id = %id, error = %err, attempts, "Failed to describe compute workload");
                return ComputeOutcome::Failed {
                    kind: FailureKind::classify(&err),
                    attempts,
                };
            }
        };

        let Some(count) = plan_compute(desired, self.config.steady_state_count, &status) else {
            info!(compute_id = %id, desired_count = status.desired_count, "Compute workload already converged");
            return ComputeOutcome::Unchanged;
        };

        match self
            .with_retry("compute", "set_desired_count", || {
                self.control.set_compute_desired_count(id, count)
            })
            .await
        {
            Ok(()) => {
                info!(compute_id = %id, count, "Compute desired count set");
                ComputeOutcome::Scaled { to: count }
            }
            Err((ControlError::AlreadyInTargetState, _)) => ComputeOutcome::Unchanged,
            Err((err, attempts)) => {
                warn!(compute_id = %id, error = %err, attempts, "Failed to set compute desired count");
                ComputeOutcome::Failed {
                    kind: FailureKind::classify(&err),
                    attempts,
                }
            }
        }
    }

    /// Converge the database instance's power state.
    async fn reconcile_database(&self, desired: TargetState) -> DatabaseOutcome {
        let id = self.config.database_id.as_str();

        let status = match self
            .with_retry("database", "describe", || self.control.describe_database(id))
            .await
        {
            Ok(status) => status,
            Err((err, attempts)) => {
                warn!(database_id = %id, error = %err, attempts, "Failed to describe database instance");
                return DatabaseOutcome::Failed {
                    kind: FailureKind::classify(&err),
                    attempts,
                };
            }
        };

        match plan_database(desired, &status) {
            DatabaseStep::Converged => {
                info!(database_id = %id, lifecycle = %status.lifecycle, "Database instance already converged");
                DatabaseOutcome::Unchanged
            }
            DatabaseStep::Defer { reason } => {
                // Forcing a command mid-transition would be rejected and
                // waste the retry budget; the next invocation re-observes.
                info!(database_id = %id, reason = %reason, "Deferring database command");
                DatabaseOutcome::Skipped { reason }
            }
            DatabaseStep::Start => {
                self.issue_database_command(id, "start", DatabaseOutcome::Started, || {
                    self.control.start_database(id)
                })
                .await
            }
            DatabaseStep::Stop => {
                self.issue_database_command(id, "stop", DatabaseOutcome::Stopped, || {
                    self.control.stop_database(id)
                })
                .await
            }
        }
    }

    /// Issue a start/stop command with retry and outcome normalization.
    async fn issue_database_command<F, Fut>(
        &self,
        id: &str,
        op: &'static str,
        on_success: DatabaseOutcome,
        call: F,
    ) -> DatabaseOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ControlError>>,
    {
        match self.with_retry("database", op, call).await {
            Ok(()) => {
                info!(database_id = %id, op, "Database command issued");
                on_success
            }
            // The platform got there without us (e.g. a concurrent
            // invocation); converged is converged.
            Err((ControlError::AlreadyInTargetState, _)) => DatabaseOutcome::Unchanged,
            // State changed between describe and command; a future
            // invocation picks it up once the transition clears.
            Err((ControlError::ConflictingState(state), _)) => DatabaseOutcome::Skipped {
                reason: format!("instance mid-transition: {state}"),
            },
            Err((err, attempts)) => {
                warn!(database_id = %id, op, error = %err, attempts, "Database command failed");
                DatabaseOutcome::Failed {
                    kind: FailureKind::classify(&err),
                    attempts,
                }
            }
        }
    }

    /// Call the control API, retrying transient errors with backoff.
    ///
    /// Returns the error together with the number of attempts made.
    async fn with_retry<T, F, Fut>(
        &self,
        resource: &'static str,
        op: &'static str,
        mut call: F,
    ) -> Result<T, (ControlError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ControlError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay(attempt - 1);
                    warn!(
                        resource,
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient control error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err((err, attempt)),
            }
        }
    }
}
