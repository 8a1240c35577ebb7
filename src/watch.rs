//! Polls the control region and reports byte changes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::region::ControlRegion;

/// One observed change of a control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteChange {
    /// Offset that changed.
    pub offset: usize,
    /// Previous value.
    pub old: u8,
    /// Current value.
    pub new: u8,
}

/// Remembers the last snapshot and diffs new ones against it.
pub struct ChangeWatcher {
    region: Arc<dyn ControlRegion>,
    last: Vec<u8>,
}

impl ChangeWatcher {
    /// Watcher starting from the region's current contents.
    pub fn new(region: Arc<dyn ControlRegion>) -> Self {
        let last = region.snapshot();
        Self { region, last }
    }

    /// Bytes that changed since the previous poll.
    pub fn poll(&mut self) -> Vec<ByteChange> {
        let current = self.region.snapshot();
        let changes = self
            .last
            .iter()
            .zip(current.iter())
            .enumerate()
            .filter(|(_, (old, new))| old != new)
            .map(|(offset, (old, new))| ByteChange {
                offset,
                old: *old,
                new: *new,
            })
            .collect();
        self.last = current;
        changes
    }

    /// Poll every `period` and log changes until `shutdown` completes.
    ///
    /// Returns the number of changes seen.
    pub async fn run(mut self, period: Duration, shutdown: impl Future<Output = ()>) -> usize {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut seen: usize = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    for change in self.poll() {
                        info!(
                            offset = change.offset,
                            old = change.old,
                            new = change.new,
                            "control byte changed"
                        );
                        seen = seen.saturating_add(1);
                    }
                }
            }
        }
        seen
    }
}
