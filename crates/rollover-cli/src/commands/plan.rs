use std::sync::Arc;

use anyhow::Context;
use rollover_core::{BuildNotification, RolloverConfig};
use rollover_plan::{Dispatcher, Fanout, StoreChannel, StoreSource};

pub async fn run(config: &RolloverConfig, event: &str) -> anyhow::Result<()> {
    let notification: BuildNotification =
        serde_json::from_str(event).context("unable to parse event")?;

    let store = super::open_store(&config.state)?;
    let source = Arc::new(StoreSource::from_config(store.clone(), &config.fanout));
    let channel = Arc::new(StoreChannel::new(store, &config.fanout.queue));
    let fanout = Fanout::new(
        source.clone(),
        source,
        Dispatcher::new(channel, &config.fanout.group_key),
        &config.fanout.account,
    );

    let report = fanout.run(&notification).await.context("rollout planning failed")?;

    if report.receipts.is_empty() {
        println!("No groups match type {:?}", notification.build_type);
        return Ok(());
    }
    println!("✓ Queued {} refresh task(s) on {}", report.receipts.len(), config.fanout.queue);
    for receipt in &report.receipts {
        println!("  {}  {}  {}", receipt.message_id, receipt.ami, receipt.arn);
    }
    Ok(())
}
