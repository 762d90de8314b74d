//! Risk assessment over scan reports: per-service risk tiers and tallies.

pub mod chains;

pub use chains::build_chains;

use anyhow::anyhow;
use netscan_core::models::{Report, RiskCounts, RiskLevel, RiskRecord, RiskReport};
use serde_json::Value;
use std::collections::BTreeMap;

/// Risk tiers for well-known ports. Unlisted ports default to High so chain
/// detection always has escalation candidates to pair.
const PORT_RISK: &[(u16, RiskLevel)] = &[
    (20, RiskLevel::Critical),
    (21, RiskLevel::Critical),
    (22, RiskLevel::High),
    (23, RiskLevel::Critical),
    (25, RiskLevel::Critical),
    (53, RiskLevel::High),
    (80, RiskLevel::Critical),
    (110, RiskLevel::High),
    (123, RiskLevel::Medium),
    (139, RiskLevel::Critical),
    (143, RiskLevel::High),
    (443, RiskLevel::High),
    (445, RiskLevel::Critical),
    (1433, RiskLevel::Critical),
    (3000, RiskLevel::Critical),
    (3306, RiskLevel::Critical),
    (3389, RiskLevel::Critical),
    (5000, RiskLevel::Critical),
    (5432, RiskLevel::Critical),
    (5900, RiskLevel::High),
    (5901, RiskLevel::High),
    (8080, RiskLevel::Critical),
    (8443, RiskLevel::High),
];

fn risk_for_port(port: u16) -> RiskLevel {
    PORT_RISK
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, level)| *level)
        .unwrap_or(RiskLevel::High)
}

/// Assess a typed report. Infallible; see [`analyze_value`] for the degraded
/// result contract.
pub fn analyze(report: &Report) -> RiskReport {
    match serde_json::to_value(report) {
        Ok(value) => analyze_value(&value),
        Err(e) => degraded(e.to_string()),
    }
}

/// Assess any report-shaped value, including legacy payloads that expose only
/// a port→service mapping. Internal failures degrade to an empty findings
/// list tagged with an error marker; they never propagate.
pub fn analyze_value(value: &Value) -> RiskReport {
    match try_analyze(value) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(error = %e, "risk analysis failed, returning empty findings");
            degraded(e.to_string())
        }
    }
}

fn degraded(error: String) -> RiskReport {
    RiskReport { error: Some(error), ..RiskReport::default() }
}

fn try_analyze(value: &Value) -> anyhow::Result<RiskReport> {
    let scan = value.as_object().ok_or_else(|| anyhow!("scan data is not an object"))?;

    // Merge every service source keyed by port. open_ports entries are richer
    // than the flat discovered_services names, so they win; a later bare
    // string never downgrades an earlier structured entry.
    let mut merged: BTreeMap<u16, &Value> = BTreeMap::new();
    for key in ["discovered_services", "open_ports"] {
        let Some(map) = scan.get(key).and_then(Value::as_object) else { continue };
        for (port, info) in map {
            let Ok(port) = port.parse::<u16>() else { continue };
            match merged.get(&port) {
                Some(existing) if existing.is_object() && !info.is_object() => {}
                _ => {
                    merged.insert(port, info);
                }
            }
        }
    }

    let mut counts = RiskCounts::default();
    let mut records = Vec::with_capacity(merged.len());
    for (port, info) in merged {
        let (service, vulnerabilities) = service_entry(info);
        let mut risk = risk_for_port(port);
        if service.to_ascii_lowercase().contains("unknown") && risk == RiskLevel::Medium {
            risk = RiskLevel::High;
        }
        match risk {
            RiskLevel::Critical => counts.critical += 1,
            RiskLevel::High => counts.high += 1,
            _ => counts.medium += 1,
        }
        records.push(RiskRecord { port, service, risk_level: risk, vulnerabilities });
    }
    records.sort_by_key(|r| r.risk_level.rank());

    Ok(RiskReport {
        target: scan
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        total_ports_scanned: scan
            .get("scan_summary")
            .and_then(|s| s.get("total_ports_scanned"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize,
        vulnerable_ports: counts,
        analysis: records,
        error: None,
    })
}

fn service_entry(info: &Value) -> (String, Vec<String>) {
    match info {
        Value::Object(obj) => {
            let service = obj
                .get("service")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Service")
                .to_string();
            let vulnerabilities = obj
                .get("vulnerabilities")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            (service, vulnerabilities)
        }
        Value::String(s) => (s.clone(), Vec::new()),
        other => (other.to_string(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unlisted_port_with_named_service_defaults_to_high() {
        let report = analyze_value(&json!({
            "target": "127.0.0.1",
            "open_ports": {
                "9999": {"service": "Mystery Service", "vulnerabilities": []}
            }
        }));
        assert_eq!(report.analysis.len(), 1);
        assert_eq!(report.analysis[0].risk_level, RiskLevel::High);
    }

    #[test]
    fn unknown_service_escalates_medium_to_high_only() {
        let report = analyze_value(&json!({
            "open_ports": {
                "123": {"service": "Unknown Service", "vulnerabilities": []},
                "22": {"service": "Unknown Service", "vulnerabilities": []}
            }
        }));
        let by_port = |p: u16| report.analysis.iter().find(|r| r.port == p).unwrap();
        // 123 is Medium in the table and escalates; 22 stays High untouched.
        assert_eq!(by_port(123).risk_level, RiskLevel::High);
        assert_eq!(by_port(22).risk_level, RiskLevel::High);
    }

    #[test]
    fn known_service_keeps_medium_tier() {
        let report = analyze_value(&json!({
            "open_ports": { "123": {"service": "NTP", "vulnerabilities": []} }
        }));
        assert_eq!(report.analysis[0].risk_level, RiskLevel::Medium);
        assert_eq!(report.vulnerable_ports.medium, 1);
    }

    #[test]
    fn richer_entry_survives_merge() {
        let report = analyze_value(&json!({
            "discovered_services": { "22": "SSH" },
            "open_ports": {
                "22": {"service": "OpenSSH 8.9", "vulnerabilities": ["Brute force"]}
            }
        }));
        assert_eq!(report.analysis[0].service, "OpenSSH 8.9");
        assert_eq!(report.analysis[0].vulnerabilities, vec!["Brute force".to_string()]);
    }

    #[test]
    fn findings_sort_critical_first_and_stable() {
        let report = analyze_value(&json!({
            "target": "127.0.0.1",
            "scan_summary": {"total_ports_scanned": 1024},
            "open_ports": {
                "22": {"service": "SSH", "vulnerabilities": []},
                "80": {"service": "HTTP", "vulnerabilities": []},
                "443": {"service": "HTTPS", "vulnerabilities": []},
                "3306": {"service": "MySQL", "vulnerabilities": []}
            }
        }));
        let levels: Vec<RiskLevel> = report.analysis.iter().map(|r| r.risk_level).collect();
        assert_eq!(
            levels,
            vec![RiskLevel::Critical, RiskLevel::Critical, RiskLevel::High, RiskLevel::High]
        );
        // Within a tier, port order is preserved by the stable sort.
        assert_eq!(report.analysis[0].port, 80);
        assert_eq!(report.analysis[1].port, 3306);
        assert_eq!(report.analysis[2].port, 22);
        assert_eq!(report.analysis[3].port, 443);
        assert_eq!(report.total_ports_scanned, 1024);
        assert_eq!(report.vulnerable_ports.critical, 2);
        assert_eq!(report.vulnerable_ports.high, 2);
    }

    #[test]
    fn malformed_input_degrades_to_empty_findings() {
        let report = analyze_value(&json!("not a scan"));
        assert!(report.analysis.is_empty());
        assert!(report.error.is_some());
    }
}
