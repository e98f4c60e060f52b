//! Autoscaling group ARN parsing.
//!
//! ```text
//! arn:aws:autoscaling:us-east-1:123456789012:autoScalingGroup:<uuid>:autoScalingGroupName/<name>
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupArn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource: String,
    /// Short group name taken from the resource path.
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArnError {
    #[error("invalid ARN: {0}")]
    Invalid(String),
    #[error("ARN resource has no group name: {0}")]
    MissingName(String),
}

impl GroupArn {
    pub fn parse(arn: &str) -> Result<Self, ArnError> {
        let rest = arn
            .strip_prefix("arn:")
            .ok_or_else(|| ArnError::Invalid(arn.to_string()))?;
        let sections: Vec<&str> = rest.splitn(5, ':').collect();
        let [partition, service, region, account_id, resource] = sections[..] else {
            return Err(ArnError::Invalid(arn.to_string()));
        };
        if partition.is_empty() || service.is_empty() || resource.is_empty() {
            return Err(ArnError::Invalid(arn.to_string()));
        }

        let name = resource
            .split('/')
            .nth(1)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ArnError::MissingName(arn.to_string()))?;

        Ok(GroupArn {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            resource: resource.to_string(),
            name: name.to_string(),
        })
    }
}
