use std::sync::Arc;

use anyhow::{Context, anyhow};
use rollover_core::config::parse_duration;
use rollover_core::{RefreshTask, RolloverConfig};
use rollover_plan::StoreChannel;
use rollover_refresh::{
    Clock, CoordinatorConfig, Deadline, LocalControlPlane, RefreshCoordinator, RefreshOutcome,
    SystemClock,
};
use rollover_state::StateStore;
use tracing::{error, info, warn};

pub async fn run(
    config: &RolloverConfig,
    task: Option<&str>,
    timeout: Option<&str>,
) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock);
    let budget = match timeout {
        Some(t) => parse_duration(t).ok_or_else(|| anyhow!("invalid --timeout {t:?}"))?,
        None => config.refresh.invocation_timeout()?,
    };
    let deadline = Deadline::from_budget(clock.now(), budget, config.refresh.safety_margin()?)
        .ok_or_else(|| anyhow!("invocation budget {budget:?} is too large"))?;

    let store = super::open_store(&config.state)?;
    let task: RefreshTask = match task {
        Some(body) => serde_json::from_str(body).context("unable to parse task")?,
        None => match next_task(config, &store)? {
            Some(task) => task,
            None => {
                println!("No task queued on {}", config.fanout.queue);
                return Ok(());
            }
        },
    };

    let coordinator = RefreshCoordinator::new(
        Arc::new(LocalControlPlane::new(store)),
        clock,
        CoordinatorConfig::from_config(&config.refresh)?,
    );

    let outcome = match coordinator.refresh(&task, deadline).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(arn = %task.arn, ami = %task.ami, error = %e, "refresh failed");
            return Err(e).with_context(|| format!("refresh of {} failed", task.arn));
        }
    };

    match outcome {
        RefreshOutcome::Completed { refresh_id } => {
            println!("✓ {} now runs {} ({refresh_id})", task.arn, task.ami);
        }
        RefreshOutcome::TimedOutStillRunning { refresh_id } => {
            warn!(arn = %task.arn, %refresh_id, budget = ?budget, "stopped polling before the refresh finished");
            println!("… {} still refreshing to {} ({refresh_id})", task.arn, task.ami);
        }
    }
    Ok(())
}

/// Pop the next task of the plan group.
fn next_task(config: &RolloverConfig, store: &StateStore) -> anyhow::Result<Option<RefreshTask>> {
    let channel = StoreChannel::new(store.clone(), &config.fanout.queue);
    let Some(message) = channel.receive(&config.fanout.group_key)? else {
        return Ok(None);
    };
    info!(id = %message.id, data = %message.body, "task received");
    let task = serde_json::from_str(&message.body)
        .with_context(|| format!("unable to parse task message {}", message.id))?;
    Ok(Some(task))
}
