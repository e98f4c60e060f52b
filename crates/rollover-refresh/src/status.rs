//! Instance refresh status as reported by the control plane.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw refresh status from a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshDescription {
    pub status: String,
    #[serde(default)]
    pub percent_complete: u8,
    #[serde(default)]
    pub status_reason: Option<String>,
}

impl RefreshDescription {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            percent_complete: 0,
            status_reason: None,
        }
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent_complete = percent;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown instance refresh status: {0}")]
pub struct UnknownStatus(pub String);

/// Refresh status the poll loop acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    /// Accepted, no instances replaced yet.
    Pending,
    /// Replacing instances; percent complete.
    InProgress(u8),
    Succeeded,
    /// Terminal failure with the provider's reason.
    Failed(String),
    /// Cancelling or cancelled, with the provider's reason.
    Cancelled(String),
}

impl RefreshState {
    pub const PENDING: &'static str = "Pending";
    pub const IN_PROGRESS: &'static str = "InProgress";
    pub const SUCCESSFUL: &'static str = "Successful";
    pub const FAILED: &'static str = "Failed";
    pub const CANCELLING: &'static str = "Cancelling";
    pub const CANCELLED: &'static str = "Cancelled";
}

impl TryFrom<&RefreshDescription> for RefreshState {
    type Error = UnknownStatus;

    fn try_from(desc: &RefreshDescription) -> Result<Self, Self::Error> {
        let reason = || desc.status_reason.clone().unwrap_or_default();
        match desc.status.as_str() {
            Self::PENDING => Ok(RefreshState::Pending),
            Self::IN_PROGRESS => Ok(RefreshState::InProgress(desc.percent_complete)),
            Self::SUCCESSFUL => Ok(RefreshState::Succeeded),
            Self::FAILED => Ok(RefreshState::Failed(reason())),
            Self::CANCELLING | Self::CANCELLED => Ok(RefreshState::Cancelled(reason())),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
