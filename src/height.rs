//! Best-known chain height and the stream that reports it.
//!
//! Height only ever advances: a query cycle reporting a lower height than
//! currently held is stale explorer data and is discarded, not propagated.
use tokio::sync::mpsc;
use tracing::debug;

pub struct HeightTracker {
    current: i32,
    out: mpsc::Sender<i32>,
}

impl HeightTracker {
    pub fn new(start_height: i32, out: mpsc::Sender<i32>) -> Self {
        Self {
            current: start_height,
            out,
        }
    }

    /// Record a height observed by a query cycle. Advances and notifies the
    /// consumer only on a strictly greater value. Returns `false` once the
    /// consumer stream is closed.
    pub async fn observe(&mut self, height: i32) -> bool {
        if height <= self.current {
            if height < self.current {
                debug!(
                    reported = height,
                    current = self.current,
                    "stale height from remote, discarding"
                );
            }
            return true;
        }
        self.current = height;
        self.out.send(height).await.is_ok()
    }
}
