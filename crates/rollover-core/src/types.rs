//! Shared types used across Rollover crates.
//!
//! Wire documents (build notifications, packer manifests, target records,
//! refresh tasks) keep the field names of their JSON representation.

use serde::{Deserialize, Serialize};

/// Build type in a notification that selects every configured target.
pub const ALL_IMAGE_TYPES: &str = "all";

/// Stored `order` value meaning "no priority configured".
pub const UNSET_PRIORITY: u32 = 0;

/// Effective priority for targets without a configured order. Sorts last.
pub const LOWEST_PRIORITY: u32 = u32::MAX;

// ── Plan trigger ───────────────────────────────────────────────────

/// Notification published when an image build finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildNotification {
    #[serde(rename = "type")]
    pub build_type: String,
}

impl BuildNotification {
    pub fn filter(&self) -> ImageFilter {
        ImageFilter::from_build_type(&self.build_type)
    }
}

/// Which targets a rollout applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFilter {
    /// Every configured target, regardless of its image type.
    All,
    /// Only targets whose image type matches exactly.
    Type(String),
}

impl ImageFilter {
    pub fn from_build_type(build_type: &str) -> Self {
        if build_type == ALL_IMAGE_TYPES {
            Self::All
        } else {
            Self::Type(build_type.to_string())
        }
    }

    pub fn matches(&self, image_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Type(t) => t == image_type,
        }
    }
}

impl std::fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str(ALL_IMAGE_TYPES),
            Self::Type(t) => f.write_str(t),
        }
    }
}

// ── Manifest ───────────────────────────────────────────────────────

/// Packer manifest as written by the image build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub builds: Vec<PackerBuild>,
}

/// A single build in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackerBuild {
    /// Logical image name, matched against `RolloutTarget::image_type`.
    pub name: String,
    /// Raw artifact id, usually `<region>:<ami-id>`.
    pub artifact_id: String,
}

// ── Targets ────────────────────────────────────────────────────────

/// An autoscaling group configured to receive new images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutTarget {
    /// Full ARN of the autoscaling group.
    pub arn: String,
    /// Image type this group runs.
    #[serde(rename = "ami_type")]
    pub image_type: String,
    /// Rollout priority, lowest first. `UNSET_PRIORITY` sorts last.
    #[serde(default)]
    pub order: u32,
}

impl RolloutTarget {
    /// Priority used for ordering, with the unset sentinel mapped to the end.
    pub fn effective_priority(&self) -> u32 {
        if self.order == UNSET_PRIORITY {
            LOWEST_PRIORITY
        } else {
            self.order
        }
    }
}

// ── Plan ───────────────────────────────────────────────────────────

/// One step of a rollout: which group gets which image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPlanEntry {
    pub arn: String,
    pub ami: String,
}

/// Ordered rollout steps. Order is significant end-to-end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPlan {
    pub entries: Vec<RolloutPlanEntry>,
}

impl RolloutPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RolloutPlanEntry> {
        self.entries.iter()
    }
}

// ── Refresh task ───────────────────────────────────────────────────

/// Queue message asking for one group to be refreshed onto one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTask {
    /// Full ARN of the autoscaling group.
    pub arn: String,
    /// Normalized image id.
    pub ami: String,
}

impl From<&RolloutPlanEntry> for RefreshTask {
    fn from(entry: &RolloutPlanEntry) -> Self {
        Self {
            arn: entry.arn.clone(),
            ami: entry.ami.clone(),
        }
    }
}
