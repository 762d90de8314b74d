//! Per-target publish/subscribe streams for incremental scan results.

use crate::models::{AttackChain, AttackGraph, ExposureScore, PortStatus, RiskReport, ScanSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Streams with no publish activity for this long are torn down on the next
/// bus sweep; a pending subscriber observes end-of-stream instead of hanging.
const IDLE_STREAM_TTL: Duration = Duration::from_secs(15 * 60);

/// Scan progress message, published in causal order per run:
/// `port`* then `analysis`, `graph`, `complete`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanEvent {
    Port {
        port: u16,
        status: PortStatus,
        service: String,
        vulnerabilities: Vec<String>,
    },
    Analysis {
        report: RiskReport,
    },
    Graph {
        graph: AttackGraph,
        exposure_score: ExposureScore,
        attack_chains: Vec<AttackChain>,
    },
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        scan_summary: Option<ScanSummary>,
        #[serde(skip_serializing_if = "Option::is_none")]
        open_ports: Option<Vec<u16>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// One message on a target's stream. `End` is the explicit end-of-stream
/// marker pushed when the stream is closed.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Event(ScanEvent),
    End,
}

struct Stream {
    tx: UnboundedSender<StreamItem>,
    rx: Option<UnboundedReceiver<StreamItem>>,
    last_publish: Instant,
}

impl Stream {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Stream { tx, rx: Some(rx), last_publish: Instant::now() }
    }
}

/// Registry of independent per-target event streams.
///
/// Concurrent scans on distinct targets never share a queue. A stream is
/// torn down exactly once; scanning the same target again starts a fresh one.
pub struct EventBus {
    streams: Mutex<HashMap<String, Stream>>,
    ttl: Duration,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_ttl(IDLE_STREAM_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        EventBus { streams: Mutex::new(HashMap::new()), ttl }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Stream>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ensure a stream exists for `target`, evicting idle ones while here.
    pub fn create_stream(&self, target: &str) {
        let mut streams = self.lock();
        Self::sweep(&mut streams, self.ttl);
        streams.entry(target.to_string()).or_insert_with(Stream::new);
    }

    /// Claim the receiving end of `target`'s stream, creating the stream if
    /// needed. Returns `None` once already claimed: subscriptions are not
    /// restartable within a scan.
    pub fn subscribe(&self, target: &str) -> Option<UnboundedReceiver<StreamItem>> {
        let mut streams = self.lock();
        streams.entry(target.to_string()).or_insert_with(Stream::new).rx.take()
    }

    /// Best-effort publish: a vanished subscriber never aborts the scan.
    pub fn publish(&self, target: &str, event: ScanEvent) {
        let mut streams = self.lock();
        Self::sweep(&mut streams, self.ttl);
        let stream = streams.entry(target.to_string()).or_insert_with(Stream::new);
        stream.last_publish = Instant::now();
        if stream.tx.send(StreamItem::Event(event)).is_err() {
            tracing::debug!(scan_target = target, "subscriber gone, dropping event");
        }
    }

    /// Close `target`'s stream: push the end-of-stream marker and release it.
    /// Idempotent; closing an absent stream is a no-op.
    pub fn close(&self, target: &str) {
        if let Some(stream) = self.lock().remove(target) {
            let _ = stream.tx.send(StreamItem::End);
        }
    }

    fn sweep(streams: &mut HashMap<String, Stream>, ttl: Duration) {
        streams.retain(|target, stream| {
            if stream.last_publish.elapsed() < ttl {
                return true;
            }
            tracing::debug!(scan_target = %target, "evicting idle event stream");
            let _ = stream.tx.send(StreamItem::End);
            false
        });
    }
}
