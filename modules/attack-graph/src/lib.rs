//! Attack-graph generation and network exposure scoring.

use netscan_core::models::{
    AttackChain, AttackGraph, ChainKind, ExposureBreakdown, ExposureScore, GraphEdge, GraphNode,
    GraphStatistics, RiskLevel, RiskRecord, Severity,
};
use std::collections::HashSet;

const CRITICAL_WEIGHT: u32 = 20;
const HIGH_WEIGHT: u32 = 10;
const LATERAL_WEIGHT: u32 = 5;
const MAX_EXPOSURE: u32 = 100;

fn node_color(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Critical => "#dc2626",
        RiskLevel::High => "#ea580c",
        RiskLevel::Medium => "#eab308",
        RiskLevel::Low => "#22c55e",
    }
}

fn node_size(risk: RiskLevel) -> u32 {
    match risk {
        RiskLevel::Critical => 15,
        RiskLevel::High => 12,
        RiskLevel::Medium => 10,
        RiskLevel::Low => 8,
    }
}

/// Parse the port out of an endpoint label shaped `Port 80 (HTTP)`: a leading
/// word, a numeric token, then the parenthesized name.
fn parse_endpoint_port(label: &str) -> Option<u16> {
    let mut tokens = label.split_whitespace();
    tokens.next()?;
    tokens.next()?.trim_matches(|c| c == '(' || c == ')').parse().ok()
}

/// Build the renderable graph: one node per risk finding, one edge per chain
/// whose endpoints both resolve to known nodes. Labels that fail to parse are
/// skipped, never an error.
pub fn build_graph(records: &[RiskRecord], chains: &[AttackChain]) -> AttackGraph {
    let mut nodes = Vec::with_capacity(records.len());
    let mut known_ports = HashSet::new();
    for record in records {
        known_ports.insert(record.port);
        nodes.push(GraphNode {
            id: format!("port_{}", record.port),
            port: record.port,
            service: record.service.clone(),
            risk: record.risk_level,
            color: node_color(record.risk_level).to_string(),
            size: node_size(record.risk_level),
            label: format!("{}\n({})", record.service, record.port),
            vulnerabilities: record.vulnerabilities.clone(),
        });
    }

    let mut edges = Vec::new();
    let mut lateral_movement_paths = 0;
    let mut horizontal_movement_paths = 0;
    for chain in chains {
        let (Some(from), Some(to)) =
            (parse_endpoint_port(&chain.from), parse_endpoint_port(&chain.to))
        else {
            continue;
        };
        if !known_ports.contains(&from) || !known_ports.contains(&to) {
            continue;
        }
        match chain.kind {
            ChainKind::LateralMovement => lateral_movement_paths += 1,
            ChainKind::HorizontalMovement => horizontal_movement_paths += 1,
        }
        edges.push(GraphEdge {
            id: format!("edge_{}", edges.len()),
            from: format!("port_{from}"),
            to: format!("port_{to}"),
            kind: chain.kind,
            risk_score: chain.risk_score,
            label: chain.description.clone(),
        });
    }

    let count_tier = |tier: RiskLevel| nodes.iter().filter(|n| n.risk == tier).count();
    let statistics = GraphStatistics {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        critical_services: count_tier(RiskLevel::Critical),
        high_risk_services: count_tier(RiskLevel::High),
        medium_services: count_tier(RiskLevel::Medium),
        low_services: count_tier(RiskLevel::Low),
        lateral_movement_paths,
        horizontal_movement_paths,
        total_vulnerabilities: nodes.iter().map(|n| n.vulnerabilities.len()).sum(),
    };

    AttackGraph { nodes, edges, statistics }
}

/// Score overall exposure from service tiers and lateral chain density,
/// clamped to 0-100, with the per-term breakdown kept for auditability.
pub fn network_exposure(graph: &AttackGraph) -> ExposureScore {
    let stats = &graph.statistics;
    let critical = stats.critical_services as u32 * CRITICAL_WEIGHT;
    let high = stats.high_risk_services as u32 * HIGH_WEIGHT;
    let lateral = stats.lateral_movement_paths as u32 * LATERAL_WEIGHT;
    let total = critical + high + lateral;
    let score = total.min(MAX_EXPOSURE);

    let severity = if score >= 80 {
        Severity::Critical
    } else if score >= 60 {
        Severity::High
    } else if score >= 40 {
        Severity::Medium
    } else {
        Severity::Low
    };

    ExposureScore {
        exposure_score: score,
        severity,
        reasoning: ExposureBreakdown {
            critical_services_contribution: critical,
            high_services_contribution: high,
            lateral_paths_contribution: lateral,
            formula: format!("{critical} (critical) + {high} (high) + {lateral} (paths) = {total}"),
            severity_threshold: format!("{score}/100"),
        },
    }
}
