//! Builders to construct schedulers from configuration.

use crate::config::SchedulerConfig;
use crate::core::extension::ExtensionRegistry;
use crate::core::scheduler::{ExtensionScheduler, SchedulerOptions, Spawn};
use crate::core::SchedulerError;
use crate::infra::queue::InMemoryPendingQueue;

/// Build a scheduler from validated configuration, creating every
/// configured queue. The dispatcher is not started; call
/// [`start`](ExtensionScheduler::start) when ready.
pub fn build_scheduler<R, S>(
    cfg: &SchedulerConfig,
    registry: R,
    spawner: S,
) -> Result<ExtensionScheduler<InMemoryPendingQueue, R, S>, SchedulerError>
where
    R: ExtensionRegistry,
    S: Spawn + Clone + Send + Sync + 'static,
{
    cfg.validate()
        .map_err(|e| SchedulerError::Internal(format!("config invalid: {e}")))?;

    let options = SchedulerOptions {
        tick_interval: cfg.tick_interval(),
        retention_limit: cfg.retention_limit,
    };
    let scheduler = ExtensionScheduler::new(registry, spawner, options);
    for (name, queue_cfg) in &cfg.queues {
        scheduler.create_queue(
            name,
            queue_cfg.max_concurrent,
            queue_cfg.max_pending,
            queue_cfg.default_timeout(),
        )?;
    }
    Ok(scheduler)
}
