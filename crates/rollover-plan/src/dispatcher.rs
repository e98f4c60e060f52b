//! Task dispatcher: publishes a plan onto one ordered message group.
//!
//! Every task of a plan shares the same group key, so a FIFO channel
//! delivers them in plan order. Publishing stops at the first failure;
//! tasks already published stay published and are reported in the error.

use std::sync::Arc;

use rollover_core::{RefreshTask, RolloutPlan};
use rollover_state::{QueuedMessage, StateStore};
use thiserror::Error;
use tracing::info;

use crate::BoxFuture;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ChannelError(pub String);

/// An ordered delivery channel (FIFO per group key).
pub trait TaskChannel: Send + Sync {
    /// Publish one message body and return the channel-assigned message id.
    fn publish<'a>(
        &'a self,
        group_key: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<String, ChannelError>>;
}

/// Acknowledgment for one published task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub arn: String,
    pub ami: String,
    pub message_id: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unable to encode task message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unable to send task {index} for {arn} ({} already queued): {source}", .committed.len())]
    Publish {
        /// Position of the failed entry in the plan.
        index: usize,
        arn: String,
        /// Tasks published before the failure. These are not retracted.
        committed: Vec<DispatchReceipt>,
        #[source]
        source: ChannelError,
    },
}

/// Publishes plans under one fixed group key.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn TaskChannel>,
    group_key: String,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn TaskChannel>, group_key: impl Into<String>) -> Self {
        Self {
            channel,
            group_key: group_key.into(),
        }
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    /// Publish every entry in plan order, one at a time.
    pub async fn dispatch(&self, plan: &RolloutPlan) -> Result<Vec<DispatchReceipt>, DispatchError> {
        let mut receipts = Vec::with_capacity(plan.len());

        for (index, entry) in plan.iter().enumerate() {
            let body = serde_json::to_string(&RefreshTask::from(entry))?;

            let message_id = match self.channel.publish(&self.group_key, &body).await {
                Ok(id) => id,
                Err(source) => {
                    return Err(DispatchError::Publish {
                        index,
                        arn: entry.arn.clone(),
                        committed: receipts,
                        source,
                    });
                }
            };

            info!(data = %body, id = %message_id, "queued");
            receipts.push(DispatchReceipt {
                arn: entry.arn.clone(),
                ami: entry.ami.clone(),
                message_id,
            });
        }

        Ok(receipts)
    }
}

/// [`TaskChannel`] over the queue table of a [`StateStore`].
///
/// Message groups are namespaced by queue name, so several queues can share
/// one store.
#[derive(Clone)]
pub struct StoreChannel {
    store: StateStore,
    queue: String,
}

impl StoreChannel {
    pub fn new(store: StateStore, queue: impl Into<String>) -> Self {
        Self {
            store,
            queue: queue.into(),
        }
    }

    fn store_group(&self, group_key: &str) -> String {
        format!("{}/{}", self.queue, group_key)
    }

    /// Take the next message of `group_key`, if any.
    pub fn receive(&self, group_key: &str) -> Result<Option<QueuedMessage>, ChannelError> {
        self.store
            .receive(&self.store_group(group_key))
            .map_err(|e| ChannelError(e.to_string()))
    }

    /// Messages of `group_key` still waiting for delivery.
    pub fn pending(&self, group_key: &str) -> Result<Vec<QueuedMessage>, ChannelError> {
        self.store
            .pending(&self.store_group(group_key))
            .map_err(|e| ChannelError(e.to_string()))
    }
}

impl TaskChannel for StoreChannel {
    fn publish<'a>(
        &'a self,
        group_key: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<String, ChannelError>> {
        Box::pin(async move {
            self.store
                .publish(&self.store_group(group_key), body)
                .map(|message| message.id)
                .map_err(|e| ChannelError(e.to_string()))
        })
    }
}
