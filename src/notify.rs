//! Side-channel feed of approval-forward events and the badge counters that
//! observe it.
//!
//! The feed is a best-effort indicator for UI badges. It never reads or
//! writes the authoritative request/approval records; a missed or doubled
//! increment here cannot corrupt repository state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Buffered events per observer before older ones are dropped. A lagging
/// counter recovers the dropped amount from the Lagged marker.
const FEED_CAPACITY: usize = 256;

/// One "request forwarded for approval" occurrence
#[derive(Debug, Clone)]
pub struct ForwardEvent {
    pub request_id: String,
    pub document_type: String,
    pub forwarded_at: DateTime<Utc>,
}

/// Append-only stream of forward events, observable by any number of
/// counters with independent attach points.
pub struct ForwardFeed {
    /// Full event history; its length seeds new observers
    log: Mutex<Vec<ForwardEvent>>,
    tx: broadcast::Sender<ForwardEvent>,
}

impl ForwardFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            log: Mutex::new(Vec::new()),
            tx,
        }
    }

    /// Record a forward event and wake every attached counter
    pub fn publish(&self, event: ForwardEvent) {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.push(event.clone());
        // Send while holding the log lock so attach() cannot observe a
        // length that disagrees with its subscription point. A send error
        // only means no counter is attached.
        let _ = self.tx.send(event);
    }

    /// Number of events published so far
    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Begin observing. The returned counter starts at the number of events
    /// currently in the feed and increments once per subsequent publish.
    pub fn attach(&self) -> NotificationCounter {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let rx = self.tx.subscribe();
        NotificationCounter {
            count: AtomicU64::new(log.len() as u64),
            rx: Mutex::new(rx),
        }
    }
}

impl Default for ForwardFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded observer of a ForwardFeed. Counts only upward; resets are the
/// owning layer's concern.
pub struct NotificationCounter {
    count: AtomicU64,
    rx: Mutex<broadcast::Receiver<ForwardEvent>>,
}

impl NotificationCounter {
    /// Current count, after folding in any events published since the last
    /// call. Lagging behind the feed adds the skipped amount rather than
    /// losing it.
    pub fn count(&self) -> u64 {
        let mut rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match rx.try_recv() {
                Ok(_) => {
                    self.count.fetch_add(1, Ordering::Relaxed);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    self.count.fetch_add(skipped, Ordering::Relaxed);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.count.load(Ordering::Relaxed)
    }

    /// Stop observing. Dropping the handle has the same effect; this spells
    /// out the end of the observation scope.
    pub fn detach(self) {}
}
