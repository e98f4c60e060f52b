//! Rollover refresh: applies one refresh task to one autoscaling group.
//!
//! # Components
//!
//! - **`status`**: provider refresh status parsed into [`RefreshState`]
//! - **`control`**: the [`ControlPlane`] operations the coordinator needs
//! - **`clock`**: injectable time source and the invocation [`Deadline`]
//! - **`coordinator`**: resolve group, new template version, start refresh, poll
//! - **`local`**: [`LocalControlPlane`] over the embedded state store
//!
//! ```text
//! RefreshTask ─► GroupArn ─► describe_group ─► create_launch_template_version
//!                                  ─► start_instance_refresh ─► poll until terminal or deadline
//! ```
//!
//! Running out of time while the refresh is still going is not a failure:
//! the provider keeps refreshing and the coordinator reports
//! [`RefreshOutcome::TimedOutStillRunning`].

use std::future::Future;
use std::pin::Pin;

pub mod clock;
pub mod control;
pub mod coordinator;
pub mod local;
pub mod status;

pub use clock::{Clock, Deadline, SystemClock};
pub use control::{ControlPlane, ControlPlaneError, GroupDescription};
pub use coordinator::{CoordinatorConfig, RefreshCoordinator, RefreshError, RefreshOutcome};
pub use local::LocalControlPlane;
pub use status::{RefreshDescription, RefreshState, UnknownStatus};

/// Boxed future returned by the control plane and clock traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
