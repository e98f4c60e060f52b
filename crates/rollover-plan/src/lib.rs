//! Rollover planning: turns a build notification into ordered refresh tasks.
//!
//! # Components
//!
//! - **`catalog`**: image name → normalized AMI id, built from the packer manifest
//! - **`source`**: read-only catalog and target registry interfaces, plus the store-backed implementation
//! - **`planner`**: filter, order and resolve targets into a `RolloutPlan`
//! - **`dispatcher`**: publish a plan onto one ordered message group
//! - **`fanout`**: one planning run end to end
//!
//! ```text
//! BuildNotification ─► CatalogSource ─┐
//!                      TargetRegistry ─┼─► plan() ─► Dispatcher ─► TaskChannel
//! ```
//!
//! Planning is all-or-nothing: a target whose image type has no build in
//! the catalog aborts the run before anything is published.

use std::future::Future;
use std::pin::Pin;

pub mod catalog;
pub mod dispatcher;
pub mod fanout;
pub mod planner;
pub mod source;

pub use catalog::{ImageCatalog, normalize_image_id};
pub use dispatcher::{ChannelError, DispatchError, DispatchReceipt, Dispatcher, StoreChannel, TaskChannel};
pub use fanout::{Fanout, FanoutError, FanoutReport};
pub use planner::{PlanError, plan};
pub use source::{CatalogSource, SourceError, StoreSource, TargetRegistry};

/// Boxed future returned by the source and channel traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
