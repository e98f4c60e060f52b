//! rollover-state: embedded state store for Rollover.
//!
//! Backed by [redb](https://docs.rs/redb). Holds everything the rollout
//! reads or writes outside the core when running without cloud services:
//!
//! - **KV documents**: the packer manifest and per-account target records.
//! - **Task queue**: refresh tasks, FIFO per message group.
//! - **Control-plane records**: groups, launch template versions, and
//!   instance refreshes for the local control plane.
//!
//! Structured records are JSON-serialized into `&[u8]` value columns. Keys
//! are strings; queue keys are `{group}:{sequence}` with a zero-padded
//! sequence so lexicographic order is publish order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
