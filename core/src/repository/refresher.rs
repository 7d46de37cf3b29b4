use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::RuleRepository;

/// Refresh `repository` every `interval` on the current tokio runtime.
///
/// The first refresh runs immediately. Failures are logged and the previous
/// snapshot stays published; the loop keeps going. Abort the returned handle
/// to stop it.
///
/// # Panics
///
/// If called outside a tokio runtime, or if `interval` is zero.
pub fn spawn_refresher<R>(repository: Arc<R>, interval: Duration) -> JoinHandle<()>
where
    R: RuleRepository + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match repository.refresh().await {
                Ok(enabled) => tracing::debug!(enabled, "background refresh succeeded"),
                Err(e) => tracing::error!(error = %e, "background refresh failed"),
            }
        }
    })
}
