//! Refresh coordinator: drives one instance refresh to a terminal state
//! or to the invocation deadline.
//!
//! The poll loop is a small state machine over [`RefreshState`]:
//!
//! ```text
//!            ┌── Pending ──── wait pending_interval ──┐
//! describe ──┼── InProgress ─ wait progress_interval ─┴─► deadline? ─► describe
//!            ├── Succeeded ─► Completed
//!            └── Failed / Cancelled / unknown ─► error
//! ```
//!
//! The deadline is checked before every describe call. Waits are clamped to
//! the time left, so the loop never sleeps past the deadline.

use std::sync::Arc;
use std::time::Duration;

use rollover_core::config::RefreshConfig;
use rollover_core::{ArnError, ConfigError, GroupArn, RefreshTask};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{Clock, Deadline};
use crate::control::{ControlPlane, ControlPlaneError};
use crate::status::{RefreshState, UnknownStatus};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("unable to parse ARN: {0}")]
    Arn(#[from] ArnError),
    #[error("unable to find ASG {0}")]
    GroupNotFound(String),
    #[error("ASG {0} has no launch template")]
    NoLaunchTemplate(String),
    #[error("unable to {action}: {source}")]
    ControlPlane {
        action: &'static str,
        #[source]
        source: ControlPlaneError,
    },
    #[error("refresh failed: {0}")]
    Failed(String),
    #[error("instance refresh cancelled: {0}")]
    Cancelled(String),
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),
}

/// How a refresh invocation ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed { refresh_id: String },
    /// The deadline passed first. The refresh keeps running on the provider.
    TimedOutStillRunning { refresh_id: String },
}

/// Poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub pending_interval: Duration,
    pub progress_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pending_interval: Duration::from_secs(15),
            progress_interval: Duration::from_secs(60),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_config(config: &RefreshConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            pending_interval: config.pending_interval()?,
            progress_interval: config.progress_interval()?,
        })
    }
}

pub struct RefreshCoordinator {
    control: Arc<dyn ControlPlane>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

impl RefreshCoordinator {
    pub fn new(control: Arc<dyn ControlPlane>, clock: Arc<dyn Clock>, config: CoordinatorConfig) -> Self {
        Self {
            control,
            clock,
            config,
        }
    }

    /// Point the task's group at the task's image and refresh its instances.
    pub async fn refresh(
        &self,
        task: &RefreshTask,
        deadline: Deadline,
    ) -> Result<RefreshOutcome, RefreshError> {
        let arn = GroupArn::parse(&task.arn)?;
        let group_name = arn.name;
        info!(group = %group_name, ami = %task.ami, "refresh requested");

        let group = self
            .control
            .describe_group(&group_name)
            .await
            .map_err(|source| RefreshError::ControlPlane {
                action: "describe autoscaling group",
                source,
            })?
            .ok_or_else(|| RefreshError::GroupNotFound(group_name.clone()))?;
        let template_id = group
            .launch_template_id
            .ok_or_else(|| RefreshError::NoLaunchTemplate(group_name.clone()))?;

        let version = self
            .control
            .create_launch_template_version(&template_id, &task.ami)
            .await
            .map_err(|source| RefreshError::ControlPlane {
                action: "create launch template version",
                source,
            })?;
        info!(group = %group_name, template = %template_id, version, ami = %task.ami, "launch template version created");

        let refresh_id = self
            .control
            .start_instance_refresh(&group_name)
            .await
            .map_err(|source| RefreshError::ControlPlane {
                action: "start instance refresh",
                source,
            })?;
        info!(group = %group_name, %refresh_id, "instance refresh started");

        self.poll(&group_name, refresh_id, deadline).await
    }

    async fn poll(
        &self,
        group_name: &str,
        refresh_id: String,
        deadline: Deadline,
    ) -> Result<RefreshOutcome, RefreshError> {
        loop {
            if deadline.is_exceeded(self.clock.now()) {
                warn!(group = %group_name, %refresh_id, "deadline reached, instance refresh still running");
                return Ok(RefreshOutcome::TimedOutStillRunning { refresh_id });
            }

            let desc = self
                .control
                .describe_instance_refresh(group_name, &refresh_id)
                .await
                .map_err(|source| RefreshError::ControlPlane {
                    action: "describe instance refresh",
                    source,
                })?;

            let wait = match RefreshState::try_from(&desc)? {
                RefreshState::Pending => {
                    debug!(group = %group_name, %refresh_id, "instance refresh pending");
                    self.config.pending_interval
                }
                RefreshState::InProgress(percent) => {
                    info!(group = %group_name, %refresh_id, percent, "instance refresh in progress");
                    self.config.progress_interval
                }
                RefreshState::Succeeded => {
                    info!(group = %group_name, %refresh_id, "instance refresh complete");
                    return Ok(RefreshOutcome::Completed { refresh_id });
                }
                RefreshState::Failed(reason) => return Err(RefreshError::Failed(reason)),
                RefreshState::Cancelled(reason) => return Err(RefreshError::Cancelled(reason)),
            };

            let wait = wait.min(deadline.remaining(self.clock.now()));
            self.clock.sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::control::GroupDescription;
    use crate::status::RefreshDescription;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    const WEB_ARN: &str = "arn:aws:autoscaling:us-east-1:123456789012:autoScalingGroup:6d3c1a2e-0000-4b7f-9c1d-2f1e0a9b8c7d:autoScalingGroupName/web-prod";

    /// Advances virtual time on every sleep.
    struct FakeClock {
        now: Mutex<Instant>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
            *self.now.lock().unwrap() += duration;
            self.sleeps.lock().unwrap().push(duration);
            Box::pin(async {})
        }
    }

    /// Scripted control plane. The last describe response repeats.
    #[derive(Default)]
    struct FakeControlPlane {
        group: Option<GroupDescription>,
        responses: Mutex<VecDeque<RefreshDescription>>,
        describe_error: bool,
        created: Mutex<Vec<(String, String)>>,
        started: Mutex<Vec<String>>,
        describes: Mutex<usize>,
    }

    impl FakeControlPlane {
        fn with_group(responses: Vec<RefreshDescription>) -> Self {
            Self {
                group: Some(GroupDescription {
                    name: "web-prod".to_string(),
                    launch_template_id: Some("lt-0123".to_string()),
                }),
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn describes(&self) -> usize {
            *self.describes.lock().unwrap()
        }
    }

    impl ControlPlane for FakeControlPlane {
        fn describe_group<'a>(
            &'a self,
            name: &'a str,
        ) -> BoxFuture<'a, Result<Option<GroupDescription>, ControlPlaneError>> {
            Box::pin(async move { Ok(self.group.clone().filter(|g| g.name == name)) })
        }

        fn create_launch_template_version<'a>(
            &'a self,
            template_id: &'a str,
            image_id: &'a str,
        ) -> BoxFuture<'a, Result<u64, ControlPlaneError>> {
            Box::pin(async move {
                let mut created = self.created.lock().unwrap();
                created.push((template_id.to_string(), image_id.to_string()));
                Ok(created.len() as u64 + 1)
            })
        }

        fn start_instance_refresh<'a>(
            &'a self,
            group_name: &'a str,
        ) -> BoxFuture<'a, Result<String, ControlPlaneError>> {
            Box::pin(async move {
                self.started.lock().unwrap().push(group_name.to_string());
                Ok("refresh-1".to_string())
            })
        }

        fn describe_instance_refresh<'a>(
            &'a self,
            _group_name: &'a str,
            _refresh_id: &'a str,
        ) -> BoxFuture<'a, Result<RefreshDescription, ControlPlaneError>> {
            Box::pin(async move {
                *self.describes.lock().unwrap() += 1;
                if self.describe_error {
                    return Err(ControlPlaneError::Rejected("throttled".to_string()));
                }
                let mut responses = self.responses.lock().unwrap();
                if responses.len() > 1 {
                    Ok(responses.pop_front().unwrap())
                } else {
                    Ok(responses.front().cloned().unwrap())
                }
            })
        }
    }

    fn task() -> RefreshTask {
        RefreshTask {
            arn: WEB_ARN.to_string(),
            ami: "ami-2".to_string(),
        }
    }

    fn coordinator(control: Arc<FakeControlPlane>, clock: Arc<FakeClock>) -> RefreshCoordinator {
        RefreshCoordinator::new(control, clock, CoordinatorConfig::default())
    }

    fn far_deadline(clock: &FakeClock) -> Deadline {
        Deadline::from_budget(clock.now(), Duration::from_secs(3600), Duration::from_millis(100)).unwrap()
    }

    #[tokio::test]
    async fn completes_after_pending_and_progress() {
        let control = Arc::new(FakeControlPlane::with_group(vec![
            RefreshDescription::new("Pending"),
            RefreshDescription::new("InProgress").with_percent(50),
            RefreshDescription::new("Successful"),
        ]));
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);

        let outcome = coordinator(control.clone(), clock.clone())
            .refresh(&task(), deadline)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RefreshOutcome::Completed {
                refresh_id: "refresh-1".to_string()
            }
        );
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(15), Duration::from_secs(60)]
        );
        assert_eq!(
            *control.created.lock().unwrap(),
            vec![("lt-0123".to_string(), "ami-2".to_string())]
        );
        assert_eq!(*control.started.lock().unwrap(), vec!["web-prod".to_string()]);
        assert_eq!(control.describes(), 3);
    }

    #[tokio::test]
    async fn failed_refresh_reports_reason_verbatim() {
        let control = Arc::new(FakeControlPlane::with_group(vec![
            RefreshDescription::new("InProgress").with_percent(10),
            RefreshDescription::new("Failed").with_reason("Instances failed to launch"),
        ]));
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);

        let err = coordinator(control, clock).refresh(&task(), deadline).await.unwrap_err();
        assert!(matches!(err, RefreshError::Failed(ref r) if r == "Instances failed to launch"));
        assert_eq!(err.to_string(), "refresh failed: Instances failed to launch");
    }

    #[tokio::test]
    async fn cancelling_is_an_error() {
        let control = Arc::new(FakeControlPlane::with_group(vec![
            RefreshDescription::new("Cancelling").with_reason("user request"),
        ]));
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);

        let err = coordinator(control, clock).refresh(&task(), deadline).await.unwrap_err();
        assert_eq!(err.to_string(), "instance refresh cancelled: user request");
    }

    #[tokio::test]
    async fn unknown_status_is_an_error() {
        let control = Arc::new(FakeControlPlane::with_group(vec![RefreshDescription::new(
            "Baking",
        )]));
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);

        let err = coordinator(control, clock).refresh(&task(), deadline).await.unwrap_err();
        assert!(matches!(err, RefreshError::UnknownStatus(UnknownStatus(ref s)) if s == "Baking"));
    }

    #[tokio::test]
    async fn past_deadline_returns_without_describing() {
        let control = Arc::new(FakeControlPlane::with_group(vec![RefreshDescription::new(
            "Pending",
        )]));
        let clock = Arc::new(FakeClock::new());
        let deadline = Deadline::at(clock.now());

        let outcome = coordinator(control.clone(), clock.clone())
            .refresh(&task(), deadline)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RefreshOutcome::TimedOutStillRunning {
                refresh_id: "refresh-1".to_string()
            }
        );
        assert_eq!(control.describes(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn waits_are_clamped_to_the_deadline() {
        let control = Arc::new(FakeControlPlane::with_group(vec![
            RefreshDescription::new("InProgress").with_percent(20),
        ]));
        let clock = Arc::new(FakeClock::new());
        let deadline =
            Deadline::from_budget(clock.now(), Duration::from_secs(90), Duration::from_millis(100))
                .unwrap();

        let outcome = coordinator(control.clone(), clock.clone())
            .refresh(&task(), deadline)
            .await
            .unwrap();

        assert!(matches!(outcome, RefreshOutcome::TimedOutStillRunning { .. }));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(60), Duration::from_millis(29_900)]
        );
        assert_eq!(control.describes(), 2);
        assert_eq!(clock.now(), deadline.instant());
    }

    #[tokio::test]
    async fn in_progress_never_terminates_on_its_own() {
        let control = Arc::new(FakeControlPlane::with_group(vec![
            RefreshDescription::new("InProgress").with_percent(99),
        ]));
        let clock = Arc::new(FakeClock::new());
        let deadline =
            Deadline::from_budget(clock.now(), Duration::from_secs(600), Duration::ZERO).unwrap();

        let outcome = coordinator(control.clone(), clock).refresh(&task(), deadline).await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::TimedOutStillRunning { .. }));
        assert_eq!(control.describes(), 10);
    }

    #[tokio::test]
    async fn describe_error_is_fatal_and_not_retried() {
        let control = Arc::new(FakeControlPlane {
            describe_error: true,
            ..FakeControlPlane::with_group(Vec::new())
        });
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);

        let err = coordinator(control.clone(), clock).refresh(&task(), deadline).await.unwrap_err();
        assert!(matches!(err, RefreshError::ControlPlane { action: "describe instance refresh", .. }));
        assert_eq!(control.describes(), 1);
    }

    #[tokio::test]
    async fn malformed_arn_touches_nothing() {
        let control = Arc::new(FakeControlPlane::with_group(Vec::new()));
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);
        let bad = RefreshTask {
            arn: "not-an-arn".to_string(),
            ami: "ami-2".to_string(),
        };

        let err = coordinator(control.clone(), clock).refresh(&bad, deadline).await.unwrap_err();
        assert!(matches!(err, RefreshError::Arn(_)));
        assert!(control.created.lock().unwrap().is_empty());
        assert!(control.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_group_is_fatal() {
        let control = Arc::new(FakeControlPlane::default());
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);

        let err = coordinator(control, clock).refresh(&task(), deadline).await.unwrap_err();
        assert!(matches!(err, RefreshError::GroupNotFound(ref g) if g == "web-prod"));
    }

    #[tokio::test]
    async fn group_without_template_is_fatal() {
        let control = Arc::new(FakeControlPlane {
            group: Some(GroupDescription {
                name: "web-prod".to_string(),
                launch_template_id: None,
            }),
            ..Default::default()
        });
        let clock = Arc::new(FakeClock::new());
        let deadline = far_deadline(&clock);

        let err = coordinator(control.clone(), clock).refresh(&task(), deadline).await.unwrap_err();
        assert!(matches!(err, RefreshError::NoLaunchTemplate(_)));
        assert!(control.started.lock().unwrap().is_empty());
    }

    #[test]
    fn config_from_refresh_section() {
        let section = RefreshConfig {
            pending_interval: "5s".to_string(),
            progress_interval: "2m".to_string(),
            ..Default::default()
        };
        let config = CoordinatorConfig::from_config(&section).unwrap();
        assert_eq!(config.pending_interval, Duration::from_secs(5));
        assert_eq!(config.progress_interval, Duration::from_secs(120));
    }
}
