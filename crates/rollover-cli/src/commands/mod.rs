pub mod plan;
pub mod queue;
pub mod refresh;

use anyhow::Context;
use rollover_core::RolloverConfig;
use rollover_core::config::StateConfig;
use rollover_state::StateStore;
use tracing::debug;

/// Store file inside `state.data_dir`.
pub const STORE_FILE: &str = "rollover.redb";

pub fn open_store(state: &StateConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&state.data_dir)
        .with_context(|| format!("unable to create {}", state.data_dir.display()))?;
    let path = state.data_dir.join(STORE_FILE);
    let store = StateStore::open(&path)
        .with_context(|| format!("unable to open state store {}", path.display()))?;
    debug!(path = %path.display(), "state store ready");
    Ok(store)
}

pub fn show_config(config: &RolloverConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
