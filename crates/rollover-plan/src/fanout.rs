//! Fanout: one planning run from notification to queued tasks.

use std::sync::Arc;

use rollover_core::{BuildNotification, RolloutPlan};
use thiserror::Error;
use tracing::{debug, info};

use crate::dispatcher::{DispatchError, DispatchReceipt, Dispatcher};
use crate::planner::{PlanError, plan};
use crate::source::{CatalogSource, SourceError, TargetRegistry};

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub plan: RolloutPlan,
    pub receipts: Vec<DispatchReceipt>,
}

/// Wires the sources, the planner and the dispatcher for one account scope.
pub struct Fanout {
    catalog: Arc<dyn CatalogSource>,
    registry: Arc<dyn TargetRegistry>,
    dispatcher: Dispatcher,
    scope: String,
}

impl Fanout {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        registry: Arc<dyn TargetRegistry>,
        dispatcher: Dispatcher,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            registry,
            dispatcher,
            scope: scope.into(),
        }
    }

    /// Plan and dispatch the rollout for `notification`.
    ///
    /// Nothing is published unless the whole plan resolves.
    pub async fn run(&self, notification: &BuildNotification) -> Result<FanoutReport, FanoutError> {
        let filter = notification.filter();
        info!(build_type = %notification.build_type, "parse event");

        let catalog = self.catalog.resolve_catalog().await?;
        for (name, ami) in catalog.iter() {
            debug!(%name, %ami, "catalog image");
        }

        let targets = self.registry.list_targets(&self.scope).await?;
        debug!(scope = %self.scope, targets = targets.len(), "targets listed");

        let plan = plan(&catalog, targets, &filter)?;
        let receipts = self.dispatcher.dispatch(&plan).await?;

        info!(
            group = %self.dispatcher.group_key(),
            queued = receipts.len(),
            "fanout complete"
        );
        Ok(FanoutReport { plan, receipts })
    }
}
