//! Control plane over the embedded state store.
//!
//! Groups and launch templates are read from the store. Instance refreshes
//! are simulated: each describe call returns the recorded status and then
//! moves the refresh one step forward (`Pending` → `InProgress` in
//! `step`-percent increments → `Successful`).

use rollover_state::{LaunchTemplateVersion, RefreshRecord, StateStore};
use tracing::debug;

use crate::BoxFuture;
use crate::control::{ControlPlane, ControlPlaneError, GroupDescription};
use crate::status::{RefreshDescription, RefreshState};

/// Key of the image id inside launch template data.
const IMAGE_ID: &str = "image_id";

#[derive(Clone)]
pub struct LocalControlPlane {
    store: StateStore,
    step: u8,
}

impl LocalControlPlane {
    pub fn new(store: StateStore) -> Self {
        Self { store, step: 25 }
    }

    /// Progress added per describe call. Clamped to `1..=100`.
    pub fn with_step(mut self, step: u8) -> Self {
        self.step = step.clamp(1, 100);
        self
    }

    fn create_version(&self, template_id: &str, image_id: &str) -> Result<u64, ControlPlaneError> {
        let mut template = self
            .store
            .get_launch_template(template_id)?
            .ok_or_else(|| ControlPlaneError::NotFound(format!("launch template {template_id}")))?;

        let (number, mut data) = match template.latest() {
            Some(latest) => (latest.number + 1, latest.data.clone()),
            None => (1, serde_json::Map::new()),
        };
        data.insert(IMAGE_ID.to_string(), image_id.into());
        template.versions.push(LaunchTemplateVersion { number, data });
        self.store.put_launch_template(&template)?;

        debug!(template = %template_id, version = number, %image_id, "launch template version created");
        Ok(number)
    }

    fn start_refresh(&self, group_name: &str) -> Result<String, ControlPlaneError> {
        if self.store.get_group(group_name)?.is_none() {
            return Err(ControlPlaneError::NotFound(format!("group {group_name}")));
        }
        let active = self
            .store
            .list_refreshes(group_name)?
            .into_iter()
            .find(|r| is_active(&r.status));
        if let Some(active) = active {
            return Err(ControlPlaneError::Rejected(format!(
                "an instance refresh is already in progress for {group_name} ({})",
                active.id
            )));
        }

        let id = self.store.next_refresh_id()?;
        self.store.put_refresh(&RefreshRecord {
            id: id.clone(),
            group_name: group_name.to_string(),
            status: RefreshState::PENDING.to_string(),
            percent_complete: 0,
            status_reason: None,
            started_at: epoch_secs(),
        })?;
        Ok(id)
    }

    fn describe_refresh(
        &self,
        group_name: &str,
        refresh_id: &str,
    ) -> Result<RefreshDescription, ControlPlaneError> {
        let mut record = self
            .store
            .get_refresh(group_name, refresh_id)?
            .ok_or_else(|| ControlPlaneError::NotFound(format!("instance refresh {refresh_id}")))?;

        let desc = RefreshDescription {
            status: record.status.clone(),
            percent_complete: record.percent_complete,
            status_reason: record.status_reason.clone(),
        };

        if self.advance(&mut record) {
            self.store.put_refresh(&record)?;
        }
        Ok(desc)
    }

    /// Move a simulated refresh one step. Returns whether it changed.
    fn advance(&self, record: &mut RefreshRecord) -> bool {
        match record.status.as_str() {
            RefreshState::PENDING => {
                record.status = RefreshState::IN_PROGRESS.to_string();
                record.percent_complete = self.step.min(100);
            }
            RefreshState::IN_PROGRESS => {
                record.percent_complete = record.percent_complete.saturating_add(self.step).min(100);
            }
            _ => return false,
        }
        if record.percent_complete >= 100 {
            record.status = RefreshState::SUCCESSFUL.to_string();
        }
        true
    }
}

fn is_active(status: &str) -> bool {
    matches!(
        status,
        RefreshState::PENDING | RefreshState::IN_PROGRESS | RefreshState::CANCELLING
    )
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl ControlPlane for LocalControlPlane {
    fn describe_group<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<GroupDescription>, ControlPlaneError>> {
        Box::pin(async move {
            Ok(self.store.get_group(name)?.map(|g| GroupDescription {
                name: g.name,
                launch_template_id: g.launch_template_id,
            }))
        })
    }

    fn create_launch_template_version<'a>(
        &'a self,
        template_id: &'a str,
        image_id: &'a str,
    ) -> BoxFuture<'a, Result<u64, ControlPlaneError>> {
        Box::pin(async move { self.create_version(template_id, image_id) })
    }

    fn start_instance_refresh<'a>(
        &'a self,
        group_name: &'a str,
    ) -> BoxFuture<'a, Result<String, ControlPlaneError>> {
        Box::pin(async move { self.start_refresh(group_name) })
    }

    fn describe_instance_refresh<'a>(
        &'a self,
        group_name: &'a str,
        refresh_id: &'a str,
    ) -> BoxFuture<'a, Result<RefreshDescription, ControlPlaneError>> {
        Box::pin(async move { self.describe_refresh(group_name, refresh_id) })
    }
}
