//! Typed records for scan results, risk findings, attack chains, and graphs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of probing a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
    Filtered,
    Error,
}

/// Per-port result. Written at most once per port per run; the status is
/// never overwritten once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    pub port: u16,
    pub status: PortStatus,
    pub service: String,
    pub vulnerabilities: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_ports_scanned: usize,
    pub open_ports: usize,
    pub closed_ports: usize,
    pub filtered_ports: usize,
}

/// Canonical persisted/transmitted scan result.
///
/// `discovered_services` mirrors `open_ports`; older consumers read service
/// information from that key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub target: String,
    pub scan_summary: ScanSummary,
    pub all_ports: BTreeMap<u16, PortRecord>,
    pub open_ports: BTreeMap<u16, PortRecord>,
    pub closed_ports: BTreeMap<u16, PortRecord>,
    pub filtered_ports: BTreeMap<u16, PortRecord>,
    pub discovered_services: BTreeMap<u16, PortRecord>,
}

/// Service risk tier, Critical highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskLevel {
    /// Sort rank: Critical first. Consumers rely on this ordering being
    /// stable across the pipeline.
    pub fn rank(self) -> u8 {
        match self {
            RiskLevel::Critical => 0,
            RiskLevel::High => 1,
            RiskLevel::Medium => 2,
            RiskLevel::Low => 3,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Critical => "Critical",
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub port: u16,
    pub service: String,
    pub risk_level: RiskLevel,
    pub vulnerabilities: Vec<String>,
}

/// Per-tier tallies. Low-risk findings are folded into `medium`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
}

/// Risk assessment over one report. An empty `analysis` with `error` set is
/// the degraded "no findings" result, not a failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskReport {
    pub target: String,
    pub total_ports_scanned: usize,
    pub vulnerable_ports: RiskCounts,
    pub analysis: Vec<RiskRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    LateralMovement,
    HorizontalMovement,
}

/// Directed movement edge between two discovered services. Endpoint labels
/// are human-readable, shaped `Port {n} ({service})`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackChain {
    #[serde(rename = "type")]
    pub kind: ChainKind,
    pub from: String,
    pub to: String,
    pub risk_score: f64,
    pub description: String,
}

/// Chain derivation output. `total_chains` counts every generated edge,
/// including any dropped by the cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainReport {
    pub total_chains: usize,
    pub chains: Vec<AttackChain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub port: u16,
    pub service: String,
    pub risk: RiskLevel,
    pub color: String,
    pub size: u32,
    pub label: String,
    pub vulnerabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: ChainKind,
    pub risk_score: f64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub critical_services: usize,
    pub high_risk_services: usize,
    pub medium_services: usize,
    pub low_services: usize,
    pub lateral_movement_paths: usize,
    pub horizontal_movement_paths: usize,
    pub total_vulnerabilities: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttackGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub statistics: GraphStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureBreakdown {
    pub critical_services_contribution: u32,
    pub high_services_contribution: u32,
    pub lateral_paths_contribution: u32,
    pub formula: String,
    pub severity_threshold: String,
}

/// Aggregate 0-100 exposure metric for a scanned host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureScore {
    pub exposure_score: u32,
    pub severity: Severity,
    pub reasoning: ExposureBreakdown,
}
