pub mod badges;
pub mod complete;
pub mod config;
pub mod ritual;
pub mod stats;

use std::sync::Arc;

use ritual_core::{Config, RitualCompletionService};
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins; otherwise the configured `logging.level` applies to
/// this workspace's crates.
pub fn init_tracing() {
    let level = Config::load_or_default().logging.level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ritual_core={level},ritual_cli={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Open the engine with the on-disk config and badge rules.
pub fn open_service() -> Result<RitualCompletionService, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let rules = Arc::new(config.load_badge_rules()?);
    Ok(RitualCompletionService::open(&config, rules)?)
}
