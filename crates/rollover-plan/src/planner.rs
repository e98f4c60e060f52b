//! Rollout planner: which groups get which image, in which order.
//!
//! Targets are filtered by the notification's image type, ordered by
//! ascending priority and resolved against the catalog. Ties keep the
//! registry's listing order (the sort is stable). A target without a
//! configured order sorts after every target that has one.

use rollover_core::{ImageFilter, RolloutPlan, RolloutPlanEntry, RolloutTarget};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::ImageCatalog;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("unable to find AMI of type {image_type} for ASG {arn}")]
    MissingImage { image_type: String, arn: String },
}

/// Build the rollout plan for one notification.
///
/// Either every selected target resolves to an image or the whole plan is
/// rejected. An empty plan is not an error.
pub fn plan(
    catalog: &ImageCatalog,
    targets: Vec<RolloutTarget>,
    filter: &ImageFilter,
) -> Result<RolloutPlan, PlanError> {
    let mut selected: Vec<RolloutTarget> = targets
        .into_iter()
        .filter(|target| {
            let keep = filter.matches(&target.image_type);
            if !keep {
                debug!(arn = %target.arn, ami_type = %target.image_type, "skipping");
            }
            keep
        })
        .collect();

    selected.sort_by_key(RolloutTarget::effective_priority);

    let entries = selected
        .into_iter()
        .map(|target| match catalog.get(&target.image_type) {
            Some(ami) => Ok(RolloutPlanEntry {
                arn: target.arn,
                ami: ami.to_string(),
            }),
            None => Err(PlanError::MissingImage {
                image_type: target.image_type,
                arn: target.arn,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(%filter, steps = entries.len(), "rollout planned");
    Ok(RolloutPlan { entries })
}
