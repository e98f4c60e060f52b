//! Records persisted by the state store.

use serde::{Deserialize, Serialize};

// ── Queue ──────────────────────────────────────────────────────────

/// A message in the ordered task queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Store-assigned id, unique across groups.
    pub id: String,
    pub group_key: String,
    pub sequence: u64,
    /// Message body as published.
    pub body: String,
    /// Unix timestamp (seconds) when the message was published.
    pub enqueued_at: u64,
}

impl QueuedMessage {
    pub fn table_key(&self) -> String {
        queue_key(&self.group_key, self.sequence)
    }
}

pub(crate) fn queue_key(group_key: &str, sequence: u64) -> String {
    format!("{group_key}:{sequence:020}")
}

// ── Control plane ──────────────────────────────────────────────────

/// An autoscaling group as seen by the local control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    /// Launch template the group launches from, if any.
    pub launch_template_id: Option<String>,
}

/// A launch template and its version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchTemplateRecord {
    pub id: String,
    /// Versions in creation order; numbering starts at 1.
    pub versions: Vec<LaunchTemplateVersion>,
}

impl LaunchTemplateRecord {
    pub fn latest(&self) -> Option<&LaunchTemplateVersion> {
        self.versions.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchTemplateVersion {
    pub number: u64,
    /// Launch parameters. `image_id` is one key among many.
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl LaunchTemplateVersion {
    pub fn image_id(&self) -> Option<&str> {
        self.data.get("image_id").and_then(|v| v.as_str())
    }
}

/// An instance refresh tracked by the local control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub id: String,
    pub group_name: String,
    /// Provider status string (`Pending`, `InProgress`, `Successful`, ...).
    pub status: String,
    pub percent_complete: u8,
    pub status_reason: Option<String>,
    /// Unix timestamp (seconds) when the refresh was started.
    pub started_at: u64,
}

impl RefreshRecord {
    pub fn table_key(&self) -> String {
        refresh_key(&self.group_name, &self.id)
    }
}

pub(crate) fn refresh_key(group_name: &str, id: &str) -> String {
    format!("{group_name}:{id}")
}
