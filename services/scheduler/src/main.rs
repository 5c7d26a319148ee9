//! env-scheduler - one-shot environment reconciliation.
//!
//! Invoked by the trigger source at environment-open and environment-close
//! with a `start` or `stop` action. Runs a single reconciliation pass,
//! prints the structured result as one JSON document on stdout for the
//! invoking platform's execution log, and exits non-zero if either
//! resource failed.

use std::io::Read;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use envctl_reconcile::{EnvironmentTarget, TargetState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use envctl_scheduler::client::HttpControl;
use envctl_scheduler::config::Config;
use envctl_scheduler::scheduler::Scheduler;
use envctl_scheduler::trigger;

#[derive(Debug, Parser)]
#[command(name = "env-scheduler")]
#[command(about = "Suspends and resumes the environment on trigger")]
struct Args {
    /// Trigger action: `start` resumes the environment, `stop` suspends it.
    #[arg(value_enum)]
    action: Option<Action>,

    /// Read the trigger payload `{"action": ...}` from stdin instead.
    #[arg(long)]
    payload_stdin: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Action {
    Start,
    Stop,
}

fn resolve_target(args: &Args) -> Result<TargetState> {
    if let Some(action) = args.action {
        return Ok(match action {
            Action::Start => TargetState::Active,
            Action::Stop => TargetState::Suspended,
        });
    }

    if args.payload_stdin {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return trigger::parse_payload(&raw);
    }

    anyhow::bail!("no action given: pass `start`/`stop` or use --payload-stdin")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let desired_state = resolve_target(&args)?;
    info!(
        environment_id = %config.environment_id,
        desired_state = %desired_state,
        control_api_url = %config.control_api_url,
        "Starting env-scheduler"
    );

    let control = Arc::new(HttpControl::new(&config.control_api_url));
    let target = EnvironmentTarget {
        environment_id: config.environment_id.clone(),
        desired_state,
    };

    let scheduler = Scheduler::new(control, config);
    let result = scheduler.reconcile(&target).await;

    // The invocation log is the only consumer of the result.
    println!("{}", serde_json::to_string(&result)?);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
