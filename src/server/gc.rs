//! Periodic sweep of expired cache entries

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::version::storer::Storer;

/// Run one sweep, logging instead of failing
pub fn run_gc(storer: &dyn Storer) -> usize {
    match storer.gc() {
        Ok(0) => {
            debug!("Cache GC: nothing to remove");
            0
        }
        Ok(removed) => {
            info!("Cache GC removed {} expired entries", removed);
            removed
        }
        Err(e) => {
            error!("Cache GC failed: {}", e);
            0
        }
    }
}

/// Sweep every `period` until the returned handle is aborted.
/// The first sweep happens one full period after startup.
pub fn spawn_gc(storer: Arc<dyn Storer>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            run_gc(storer.as_ref());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::error::CacheError;
    use crate::version::storer::MockStorer;

    #[test]
    fn run_gc_returns_removed_count() {
        let mut storer = MockStorer::new();
        storer.expect_gc().times(1).returning(|| Ok(3));

        assert_eq!(run_gc(&storer), 3);
    }

    #[test]
    fn run_gc_swallows_errors() {
        let mut storer = MockStorer::new();
        storer
            .expect_gc()
            .times(1)
            .returning(|| Err(CacheError::LockPoisoned));

        assert_eq!(run_gc(&storer), 0);
    }

    #[tokio::test]
    async fn spawn_gc_sweeps_periodically() {
        let mut storer = MockStorer::new();
        storer.expect_gc().times(2..).returning(|| Ok(0));
        let storer = Arc::new(storer);

        let handle = spawn_gc(storer.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
        let _ = handle.await;
    }
}
