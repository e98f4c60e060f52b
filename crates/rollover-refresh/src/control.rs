//! Control-plane operations used by a refresh.

use rollover_state::StateError;
use thiserror::Error;

use crate::BoxFuture;
use crate::status::RefreshDescription;

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("state store error: {0}")]
    State(#[from] StateError),
    #[error("{0} not found")]
    NotFound(String),
    /// Request rejected by the provider.
    #[error("{0}")]
    Rejected(String),
}

/// What the coordinator needs to know about a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescription {
    pub name: String,
    pub launch_template_id: Option<String>,
}

/// Autoscaling and launch template operations.
pub trait ControlPlane: Send + Sync {
    /// Look up a group by name. `None` when it does not exist.
    fn describe_group<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<GroupDescription>, ControlPlaneError>>;

    /// Create a version sourced from the latest one with only the image id
    /// replaced. Returns the new version number.
    fn create_launch_template_version<'a>(
        &'a self,
        template_id: &'a str,
        image_id: &'a str,
    ) -> BoxFuture<'a, Result<u64, ControlPlaneError>>;

    /// Start an instance refresh and return its id.
    fn start_instance_refresh<'a>(
        &'a self,
        group_name: &'a str,
    ) -> BoxFuture<'a, Result<String, ControlPlaneError>>;

    fn describe_instance_refresh<'a>(
        &'a self,
        group_name: &'a str,
        refresh_id: &'a str,
    ) -> BoxFuture<'a, Result<RefreshDescription, ControlPlaneError>>;
}
