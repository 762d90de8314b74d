//! Per-run scan state: cancel flag, shared work queue, and the result map.

use netscan_core::models::PortRecord;
use netscan_core::Target;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Mutex as AsyncMutex};

/// Work queue item: a port to probe or a shutdown sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItem {
    Port(u16),
    Shutdown,
}

/// State owned by a single scan run.
///
/// Created per run and discarded when the run ends or is superseded. Workers
/// are the only writers of the result map; the aggregator reads it only after
/// the pool has fully drained, so the two never overlap.
pub struct ScanContext {
    pub target: Target,
    pub start_port: u16,
    pub end_port: u16,
    pub worker_count: usize,
    cancelled: AtomicBool,
    results: Mutex<HashMap<u16, PortRecord>>,
    queue_tx: UnboundedSender<QueueItem>,
    queue_rx: AsyncMutex<UnboundedReceiver<QueueItem>>,
    live_workers: watch::Sender<usize>,
}

impl ScanContext {
    pub fn new(target: Target, start_port: u16, end_port: u16, worker_count: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        ScanContext {
            target,
            start_port,
            end_port,
            worker_count,
            cancelled: AtomicBool::new(false),
            results: Mutex::new(HashMap::new()),
            queue_tx,
            queue_rx: AsyncMutex::new(queue_rx),
            live_workers: watch::Sender::new(0),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn enqueue(&self, item: QueueItem) {
        // The receiver lives as long as the context, so this cannot fail.
        let _ = self.queue_tx.send(item);
    }

    /// Pop one item, waiting at most `poll` so callers can re-check the
    /// cancel flag between attempts. `None` means the poll expired.
    pub async fn dequeue(&self, poll: Duration) -> Option<QueueItem> {
        let mut rx = self.queue_rx.lock().await;
        match tokio::time::timeout(poll, rx.recv()).await {
            Ok(item) => item,
            Err(_) => None,
        }
    }

    /// Discard everything still queued. Waits for the queue lock, which a
    /// worker holds for at most one poll interval.
    pub async fn drain_queue(&self) {
        let mut rx = self.queue_rx.lock().await;
        while rx.try_recv().is_ok() {}
    }

    /// Record a port's outcome. The first write wins; a status is never
    /// overwritten. Returns whether this call stored the record.
    pub fn record(&self, record: PortRecord) -> bool {
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        match results.entry(record.port) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Clone the result map. Only meaningful once the pool has drained.
    pub fn snapshot(&self) -> HashMap<u16, PortRecord> {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn worker_started(&self) {
        self.live_workers.send_modify(|n| *n += 1);
    }

    pub fn worker_exited(&self) {
        self.live_workers.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Wait until every worker has exited. Callers bound this with a timeout
    /// when they cannot afford to wait forever.
    pub async fn wait_workers(&self) {
        let mut rx = self.live_workers.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
