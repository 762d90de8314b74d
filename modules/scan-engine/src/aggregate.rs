//! Post-drain aggregation: snapshot, partition, summarize, persist.

use crate::context::ScanContext;
use anyhow::Result;
use netscan_core::models::{PortStatus, Report, ScanSummary};
use report_store::ReportStore;
use std::collections::BTreeMap;

/// Build the canonical report from a drained run and persist it under the
/// latest and per-target keys. Call only after every worker has exited; the
/// snapshot is the sole read of the run's result map.
pub fn aggregate(context: &ScanContext, store: &ReportStore) -> Result<Report> {
    let snapshot = context.snapshot();

    let mut all_ports = BTreeMap::new();
    let mut open_ports = BTreeMap::new();
    let mut closed_ports = BTreeMap::new();
    let mut filtered_ports = BTreeMap::new();
    for (port, record) in snapshot {
        match record.status {
            PortStatus::Open => {
                open_ports.insert(port, record.clone());
            }
            PortStatus::Closed => {
                closed_ports.insert(port, record.clone());
            }
            PortStatus::Filtered => {
                filtered_ports.insert(port, record.clone());
            }
            // Errored probes stay visible in all_ports but have no partition.
            PortStatus::Error => {}
        }
        all_ports.insert(port, record);
    }

    let scan_summary = ScanSummary {
        total_ports_scanned: all_ports.len(),
        open_ports: open_ports.len(),
        closed_ports: closed_ports.len(),
        filtered_ports: filtered_ports.len(),
    };

    let report = Report {
        target: context.target.to_string(),
        scan_summary,
        all_ports,
        discovered_services: open_ports.clone(),
        open_ports,
        closed_ports,
        filtered_ports,
    };

    store.save(&report)?;
    Ok(report)
}
