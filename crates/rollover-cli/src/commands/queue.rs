use rollover_core::RolloverConfig;
use rollover_plan::StoreChannel;

pub fn list(config: &RolloverConfig) -> anyhow::Result<()> {
    let store = super::open_store(&config.state)?;
    let channel = StoreChannel::new(store, &config.fanout.queue);
    let pending = channel.pending(&config.fanout.group_key)?;

    if pending.is_empty() {
        println!("Queue {} is empty", config.fanout.queue);
        return Ok(());
    }
    for message in &pending {
        println!("{}  {}  {}", message.id, message.enqueued_at, message.body);
    }
    Ok(())
}
