//! Background sweep for idle sessions.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::broker::ExecutionBroker;

/// Spawn the idle sweeper task for a broker.
///
/// Runs until aborted. Each tick evicts sessions idle past the broker's
/// configured timeout; sessions with a submission in flight are never
/// touched (the eviction path claims the in-flight slot first).
pub fn spawn_idle_sweeper(broker: Arc<ExecutionBroker>) -> JoinHandle<()> {
    let period = broker.config().sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = broker.evict_idle().await;
            if !evicted.is_empty() {
                tracing::debug!(count = evicted.len(), "idle sweep evicted sessions");
            }
        }
    })
}
