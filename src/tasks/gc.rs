//! GC Sweeper
//!
//! Background task that periodically walks an adapter's entries and evicts
//! the expired ones.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};

// == Sweep Report ==
/// Outcome of one full pass over an adapter's storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries examined
    pub scanned: usize,
    /// Entries (or index records) deleted
    pub removed: usize,
    /// Entries left in place after an error
    pub skipped: usize,
}

// == GC State ==
/// Whether an adapter has a background sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    /// No background activity; expiry happens lazily on read only.
    Idle,
    /// A sweeper runs every interval.
    Running,
}

impl GcState {
    pub fn for_interval(interval_secs: u64) -> Self {
        if interval_secs < 1 {
            GcState::Idle
        } else {
            GcState::Running
        }
    }
}

// == Sweep Target ==
/// An adapter that can evict its expired entries in one pass.
///
/// Implementations must never fail the pass as a whole: per-entry errors
/// are logged and counted in [`SweepReport::skipped`].
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Adapter name used in log lines.
    fn name(&self) -> &'static str;

    /// Runs one GC pass.
    async fn sweep(&self) -> SweepReport;
}

/// Spawns the GC loop for `target`.
///
/// Returns `None` (the adapter stays [`GcState::Idle`]) when
/// `interval_secs` is below one second. Otherwise the task sleeps for the
/// interval, runs a sweep, and repeats. It holds only a weak reference and
/// ends once the adapter has been dropped.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(adapter);
/// let handle = spawn_gc_task(&cache, 60);
/// ```
pub fn spawn_gc_task<S: Sweep>(target: &Arc<S>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if GcState::for_interval(interval_secs) == GcState::Idle {
        debug!("{} GC disabled (interval {}s)", target.name(), interval_secs);
        return None;
    }

    let interval = Duration::from_secs(interval_secs);
    let target: Weak<S> = Arc::downgrade(target);

    Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = target.upgrade() else {
                debug!("GC target dropped, stopping sweeper");
                break;
            };

            let report = cache.sweep().await;

            if report.removed > 0 || report.skipped > 0 {
                info!(
                    adapter = cache.name(),
                    scanned = report.scanned,
                    removed = report.removed,
                    skipped = report.skipped,
                    "GC sweep finished"
                );
            } else {
                debug!(
                    adapter = cache.name(),
                    scanned = report.scanned,
                    "GC sweep: no expired entries found"
                );
            }
        }
    }))
}
