//! Trigger payload parsing.
//!
//! The trigger source delivers `{"action": "start" | "stop"}` on its two
//! daily firings. `start` maps to the ACTIVE target, `stop` to SUSPENDED.

use anyhow::{Context, Result};
use envctl_reconcile::TargetState;
use serde::Deserialize;

/// Payload delivered by the trigger source.
#[derive(Debug, Deserialize)]
pub struct TriggerPayload {
    pub action: String,
}

/// Parse a trigger payload into the target state it requests.
pub fn parse_payload(raw: &str) -> Result<TargetState> {
    let payload: TriggerPayload =
        serde_json::from_str(raw).context("invalid trigger payload")?;
    TargetState::from_action(&payload.action)
        .with_context(|| format!("unknown trigger action: {:?}", payload.action))
}
