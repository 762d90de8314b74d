//! Owns the single in-flight scan: supersede/cancel semantics, the worker
//! pool, and the downstream analysis pipeline.

use crate::aggregate;
use crate::context::{QueueItem, ScanContext};
use crate::probe;
use netscan_core::events::{EventBus, ScanEvent};
use netscan_core::models::Report;
use netscan_core::{ScanError, Target};
use report_store::ReportStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

/// How long a worker waits on the queue before re-checking the cancel flag.
const QUEUE_POLL: Duration = Duration::from_secs(2);
/// How long a superseding scan waits for the old pool to exit. Proceeding
/// afterwards without full exit is an accepted race; a stuck run must not
/// block new work indefinitely.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

pub const DEFAULT_START_PORT: u16 = 1;
pub const DEFAULT_END_PORT: u16 = 1024;
pub const DEFAULT_WORKERS: usize = 100;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

/// What to do with a request that arrives while a scan is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivePolicy {
    /// Cancel the running scan and start the new one.
    #[default]
    Supersede,
    /// Reject the new request with a conflict error.
    Reject,
}

/// Parameters for one scan run.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target: String,
    pub start_port: u16,
    pub end_port: u16,
    pub workers: usize,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>) -> Self {
        ScanRequest {
            target: target.into(),
            start_port: DEFAULT_START_PORT,
            end_port: DEFAULT_END_PORT,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Validate the target and clamp the range and pool size to usable
    /// values. A missing target is the only outright rejection.
    fn sanitized(mut self) -> Result<Self, ScanError> {
        if self.target.trim().is_empty() {
            return Err(ScanError::MissingTarget);
        }
        if self.start_port < 1 {
            self.start_port = 1;
        }
        if self.end_port < self.start_port {
            self.end_port = self.start_port;
        }
        if self.workers < 1 {
            self.workers = 1;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatus {
    pub running: bool,
    pub target: Option<String>,
    pub started_at: Option<String>,
    pub run_id: Option<String>,
}

struct ActiveScan {
    context: Arc<ScanContext>,
    run_id: Uuid,
    started_at: String,
}

/// Coordinates scan runs. At most one scan is active per coordinator; the
/// `active` slot is the single source of truth for "which scan is running".
pub struct ScanCoordinator {
    active: Mutex<Option<ActiveScan>>,
    policy: ActivePolicy,
    bus: Arc<EventBus>,
    store: Arc<ReportStore>,
}

impl ScanCoordinator {
    pub fn new(bus: Arc<EventBus>, store: Arc<ReportStore>, policy: ActivePolicy) -> Self {
        ScanCoordinator { active: Mutex::new(None), policy, bus, store }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Synchronous mode: block until the scan and its analysis pipeline
    /// finish, returning the full report.
    pub async fn run(&self, request: ScanRequest) -> Result<Report, ScanError> {
        let request = request.sanitized()?;
        let (context, _run_id) = self.register(&request).await?;
        self.execute(context).await
    }

    /// Asynchronous mode: accept the request, run the pipeline in the
    /// background, and return the run id immediately.
    pub async fn start(self: &Arc<Self>, request: ScanRequest) -> Result<Uuid, ScanError> {
        let request = request.sanitized()?;
        let (context, run_id) = self.register(&request).await?;
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = coordinator.execute(context).await {
                tracing::warn!(error = %e, "background scan ended with error");
            }
        });
        Ok(run_id)
    }

    /// Cancel the active scan, if any. Idempotent and safe with nothing
    /// running.
    pub async fn cancel(&self) {
        let mut active = self.active.lock().await;
        if let Some(scan) = active.take() {
            self.shut_down(scan, "scan cancelled").await;
        }
    }

    pub async fn status(&self) -> ScanStatus {
        match &*self.active.lock().await {
            Some(scan) => ScanStatus {
                running: true,
                target: Some(scan.context.target.to_string()),
                started_at: Some(scan.started_at.clone()),
                run_id: Some(scan.run_id.to_string()),
            },
            None => ScanStatus::default(),
        }
    }

    /// Make `request` the sole active scan, applying the configured policy to
    /// any run already in flight. The active-slot lock is held across the
    /// takeover so two registrations cannot interleave.
    async fn register(
        &self,
        request: &ScanRequest,
    ) -> Result<(Arc<ScanContext>, Uuid), ScanError> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.take() {
            if self.policy == ActivePolicy::Reject {
                let target = current.context.target.to_string();
                *active = Some(current);
                return Err(ScanError::AlreadyRunning { target });
            }
            tracing::info!(target_host = %current.context.target, "superseding active scan");
            self.shut_down(current, "scan superseded by a newer request").await;
        }

        let context = Arc::new(ScanContext::new(
            Target::from(request.target.as_str()),
            request.start_port,
            request.end_port,
            request.workers,
        ));
        let run_id = Uuid::now_v7();
        *active = Some(ActiveScan {
            context: Arc::clone(&context),
            run_id,
            started_at: now_rfc3339(),
        });
        Ok((context, run_id))
    }

    /// Stop a run: set its flag, discard queued work, wake every worker with
    /// a sentinel, wait a bounded grace for the pool to exit, then tear down
    /// the stream so subscribers get a terminal event instead of waiting
    /// forever.
    async fn shut_down(&self, scan: ActiveScan, reason: &str) {
        let context = scan.context;
        context.cancel();
        context.drain_queue().await;
        for _ in 0..context.worker_count {
            context.enqueue(QueueItem::Shutdown);
        }
        if timeout(CANCEL_GRACE, context.wait_workers()).await.is_err() {
            tracing::warn!(
                target_host = %context.target,
                "worker pool still busy after grace period, proceeding"
            );
        }
        let target = context.target.to_string();
        self.bus.publish(
            &target,
            ScanEvent::Complete { scan_summary: None, open_ports: None, error: Some(reason.to_string()) },
        );
        self.bus.close(&target);
    }

    /// Drop the active-slot reference, but only if this run still owns it; a
    /// superseding run may have replaced it already.
    async fn clear_if_current(&self, context: &Arc<ScanContext>) {
        let mut active = self.active.lock().await;
        if let Some(current) = &*active {
            if Arc::ptr_eq(&current.context, context) {
                *active = None;
            }
        }
    }

    async fn execute(&self, context: Arc<ScanContext>) -> Result<Report, ScanError> {
        let target = context.target.to_string();
        self.bus.create_stream(&target);
        tracing::info!(
            target_host = %target,
            start = context.start_port,
            end = context.end_port,
            workers = context.worker_count,
            "scan started"
        );

        for port in context.start_port..=context.end_port {
            context.enqueue(QueueItem::Port(port));
        }
        for _ in 0..context.worker_count {
            context.enqueue(QueueItem::Shutdown);
        }

        let mut handles = Vec::with_capacity(context.worker_count);
        for _ in 0..context.worker_count {
            context.worker_started();
            let ctx = Arc::clone(&context);
            let bus = Arc::clone(&self.bus);
            handles.push(tokio::spawn(worker_loop(ctx, bus)));
        }
        for handle in handles {
            let _ = handle.await;
        }

        if context.is_cancelled() {
            // The superseding caller already tore down the stream.
            self.clear_if_current(&context).await;
            return Err(ScanError::Cancelled);
        }

        let report = match aggregate::aggregate(&context, &self.store) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(target_host = %target, error = %e, "report persistence failed");
                self.bus.publish(
                    &target,
                    ScanEvent::Complete {
                        scan_summary: None,
                        open_ports: None,
                        error: Some(e.to_string()),
                    },
                );
                self.bus.close(&target);
                self.clear_if_current(&context).await;
                return Err(ScanError::Persist(e.to_string()));
            }
        };

        let risk = risk_analysis::analyze(&report);
        self.bus.publish(&target, ScanEvent::Analysis { report: risk.clone() });

        let chains = risk_analysis::build_chains(&risk.analysis);
        let graph = attack_graph::build_graph(&risk.analysis, &chains.chains);
        let exposure = attack_graph::network_exposure(&graph);
        self.bus.publish(
            &target,
            ScanEvent::Graph {
                graph,
                exposure_score: exposure,
                attack_chains: chains.chains,
            },
        );

        self.bus.publish(
            &target,
            ScanEvent::Complete {
                scan_summary: Some(report.scan_summary),
                open_ports: Some(report.open_ports.keys().copied().collect()),
                error: None,
            },
        );
        self.bus.close(&target);
        self.clear_if_current(&context).await;
        tracing::info!(
            target_host = %target,
            open = report.scan_summary.open_ports,
            "scan complete"
        );
        Ok(report)
    }
}

/// Worker body: drain the shared queue until a sentinel arrives or the run is
/// cancelled. The bounded dequeue keeps the cancel flag observable even when
/// no items are flowing.
async fn worker_loop(context: Arc<ScanContext>, bus: Arc<EventBus>) {
    let target = context.target.to_string();
    loop {
        if context.is_cancelled() {
            break;
        }
        match context.dequeue(QUEUE_POLL).await {
            Some(QueueItem::Shutdown) => break,
            Some(QueueItem::Port(port)) => {
                if context.is_cancelled() {
                    break;
                }
                let record = probe::probe_port(&target, port).await;
                let event = ScanEvent::Port {
                    port: record.port,
                    status: record.status,
                    service: record.service.clone(),
                    vulnerabilities: record.vulnerabilities.clone(),
                };
                // Record before publishing so the map write is visible before
                // anyone can react to the event.
                if context.record(record) {
                    bus.publish(&target, event);
                }
            }
            None => {
                if context.is_cancelled() {
                    break;
                }
            }
        }
    }
    context.worker_exited();
}

#[cfg(test)]
mod tests {
    use super::*;
    use netscan_core::events::StreamItem;
    use netscan_core::models::PortStatus;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn coordinator(policy: ActivePolicy) -> Arc<ScanCoordinator> {
        let dir = std::env::temp_dir().join(format!("coordinator-test-{}", Uuid::now_v7()));
        Arc::new(ScanCoordinator::new(
            Arc::new(EventBus::new()),
            Arc::new(ReportStore::new(dir)),
            policy,
        ))
    }

    async fn banner_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn serve_banner(listener: TcpListener) {
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock.write_all(b"SSH-2.0-OpenSSH_8.9\r\n").await;
            }
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn completed_run_covers_the_entire_range() {
        let (listener, port) = banner_listener().await;
        serve_banner(listener);
        let coordinator = coordinator(ActivePolicy::Supersede);

        let mut request = ScanRequest::new("127.0.0.1");
        request.start_port = port - 2;
        request.end_port = port + 2;
        request.workers = 3;
        let report = coordinator.run(request).await.unwrap();

        assert_eq!(report.all_ports.len(), 5);
        assert_eq!(report.scan_summary.total_ports_scanned, 5);
        assert_eq!(report.all_ports[&port].status, PortStatus::Open);
        assert_eq!(report.all_ports[&port].service, "SSH-2.0-OpenSSH_8.9");
        assert_eq!(report.discovered_services.len(), report.open_ports.len());
        assert!(!coordinator.status().await.running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn events_arrive_in_causal_order() {
        let (listener, port) = banner_listener().await;
        serve_banner(listener);
        let coordinator = coordinator(ActivePolicy::Supersede);
        let mut rx = coordinator.bus().subscribe("127.0.0.1").unwrap();

        let mut request = ScanRequest::new("127.0.0.1");
        request.start_port = port;
        request.end_port = port + 1;
        request.workers = 2;
        coordinator.run(request).await.unwrap();

        let mut events = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Event(event) => events.push(event),
                StreamItem::End => break,
            }
        }

        let tail = events.split_off(events.len() - 3);
        assert_eq!(events.len(), 2, "one port event per scanned port");
        assert!(events.iter().all(|e| matches!(e, ScanEvent::Port { .. })));
        assert!(matches!(tail[0], ScanEvent::Analysis { .. }));
        assert!(matches!(tail[1], ScanEvent::Graph { .. }));
        assert!(matches!(tail[2], ScanEvent::Complete { error: None, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_run_persists_no_report() {
        let dir = std::env::temp_dir().join(format!("coordinator-cancel-{}", Uuid::now_v7()));
        let store = Arc::new(ReportStore::new(dir));
        let coordinator = Arc::new(ScanCoordinator::new(
            Arc::new(EventBus::new()),
            Arc::clone(&store),
            ActivePolicy::Supersede,
        ));

        let mut request = ScanRequest::new("127.0.0.1");
        request.start_port = 1;
        request.end_port = 65535;
        request.workers = 2;
        let handle = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run(request).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.cancel().await;

        let result = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(ScanError::Cancelled)));
        assert!(store.load_latest().unwrap().is_none());
        assert!(!coordinator.status().await.running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn superseding_scan_cancels_the_old_run() {
        let coordinator = coordinator(ActivePolicy::Supersede);

        let mut slow = ScanRequest::new("127.0.0.1");
        slow.start_port = 1;
        slow.end_port = 65535;
        slow.workers = 2;
        let old = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run(slow).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut quick = ScanRequest::new("127.0.0.1");
        quick.start_port = 1;
        quick.end_port = 1;
        quick.workers = 1;
        let report = coordinator.run(quick).await.unwrap();
        assert_eq!(report.all_ports.len(), 1);

        let old_result = timeout(Duration::from_secs(10), old).await.unwrap().unwrap();
        assert!(matches!(old_result, Err(ScanError::Cancelled)));
        assert!(!coordinator.status().await.running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reject_policy_surfaces_a_conflict() {
        let coordinator = coordinator(ActivePolicy::Reject);

        let mut slow = ScanRequest::new("127.0.0.1");
        slow.start_port = 1;
        slow.end_port = 65535;
        slow.workers = 2;
        let old = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run(slow).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = coordinator.status().await;
        assert!(status.running);
        assert_eq!(status.target.as_deref(), Some("127.0.0.1"));
        assert!(status.started_at.is_some());

        let conflict = coordinator.run(ScanRequest::new("127.0.0.1")).await;
        assert!(matches!(conflict, Err(ScanError::AlreadyRunning { .. })));

        coordinator.cancel().await;
        let old_result = timeout(Duration::from_secs(10), old).await.unwrap().unwrap();
        assert!(matches!(old_result, Err(ScanError::Cancelled)));
    }

    #[tokio::test]
    async fn missing_target_is_rejected_before_scanning() {
        let coordinator = coordinator(ActivePolicy::Supersede);
        let result = coordinator.run(ScanRequest::new("   ")).await;
        assert!(matches!(result, Err(ScanError::MissingTarget)));
        assert!(!coordinator.status().await.running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn degenerate_range_is_clamped() {
        let coordinator = coordinator(ActivePolicy::Supersede);
        let mut request = ScanRequest::new("127.0.0.1");
        request.start_port = 0;
        request.end_port = 0;
        request.workers = 0;
        let report = coordinator.run(request).await.unwrap();
        assert_eq!(report.all_ports.len(), 1);
        assert!(report.all_ports.contains_key(&1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn async_start_returns_immediately_with_a_run_id() {
        let (listener, port) = banner_listener().await;
        serve_banner(listener);
        let coordinator = coordinator(ActivePolicy::Supersede);
        let mut rx = coordinator.bus().subscribe("127.0.0.1").unwrap();

        let mut request = ScanRequest::new("127.0.0.1");
        request.start_port = port;
        request.end_port = port;
        request.workers = 1;
        coordinator.start(request).await.unwrap();

        // The stream terminates once the background run finishes.
        let mut saw_complete = false;
        while let Some(item) = rx.recv().await {
            match item {
                StreamItem::Event(ScanEvent::Complete { error: None, .. }) => saw_complete = true,
                StreamItem::Event(_) => {}
                StreamItem::End => break,
            }
        }
        assert!(saw_complete);
        assert!(!coordinator.status().await.running);
    }
}
