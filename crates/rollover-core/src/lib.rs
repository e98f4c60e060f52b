pub mod arn;
pub mod config;
pub mod types;
pub mod version;

pub use arn::{ArnError, GroupArn};
pub use config::{ConfigError, RolloverConfig};
pub use types::*;
pub use version::BuildInfo;
