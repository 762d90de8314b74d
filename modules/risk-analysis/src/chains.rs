//! Attack-chain derivation: tiered edge generators over risk findings.

use netscan_core::models::{AttackChain, ChainKind, ChainReport, RiskLevel, RiskRecord};
use std::collections::BTreeMap;

/// Edges kept per report. Generators run in fixed priority order and the
/// concatenated list is truncated without rescoring, so the cap keeps the
/// highest-priority chains.
const MAX_CHAINS: usize = 10;

const CRITICAL_TO_HIGH_SCORE: f64 = 9.5;
const HIGH_TO_HIGH_SCORE: f64 = 8.0;
const HIGH_TO_MEDIUM_SCORE: f64 = 6.5;
const HORIZONTAL_SCORE: f64 = 7.0;

fn endpoint(record: &RiskRecord) -> String {
    format!("Port {} ({})", record.port, record.service)
}

fn base_service(record: &RiskRecord) -> &str {
    record.service.split('/').next().unwrap_or(record.service.as_str())
}

/// Derive movement chains from sorted risk findings.
pub fn build_chains(records: &[RiskRecord]) -> ChainReport {
    let critical: Vec<&RiskRecord> =
        records.iter().filter(|r| r.risk_level == RiskLevel::Critical).collect();
    let high: Vec<&RiskRecord> =
        records.iter().filter(|r| r.risk_level == RiskLevel::High).collect();
    let medium: Vec<&RiskRecord> =
        records.iter().filter(|r| r.risk_level == RiskLevel::Medium).collect();

    let mut chains = Vec::new();

    // Escalation paths, primary first: every critical foothold can pivot into
    // every high-tier service.
    for c in &critical {
        for h in &high {
            chains.push(AttackChain {
                kind: ChainKind::LateralMovement,
                from: endpoint(c),
                to: endpoint(h),
                risk_score: CRITICAL_TO_HIGH_SCORE,
                description: format!("Use {} vulnerability to access {}", c.service, h.service),
            });
        }
    }

    for (i, a) in high.iter().enumerate() {
        for b in &high[i + 1..] {
            chains.push(AttackChain {
                kind: ChainKind::LateralMovement,
                from: endpoint(a),
                to: endpoint(b),
                risk_score: HIGH_TO_HIGH_SCORE,
                description: format!("Hop between {} and {}", a.service, b.service),
            });
        }
    }

    for h in &high {
        for m in &medium {
            chains.push(AttackChain {
                kind: ChainKind::LateralMovement,
                from: endpoint(h),
                to: endpoint(m),
                risk_score: HIGH_TO_MEDIUM_SCORE,
                description: format!("Leverage {} to compromise {}", h.service, m.service),
            });
        }
    }

    // Horizontal movement between instances sharing a base service name
    // (text before the '/' qualifier). Overlap with the edges above is fine.
    let mut groups: BTreeMap<&str, Vec<&RiskRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(base_service(record)).or_default().push(record);
    }
    for (base, members) in &groups {
        if members.len() < 2 {
            continue;
        }
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                chains.push(AttackChain {
                    kind: ChainKind::HorizontalMovement,
                    from: format!("Port {} ({})", a.port, base),
                    to: format!("Port {} ({})", b.port, base),
                    risk_score: HORIZONTAL_SCORE,
                    description: format!("Lateral movement through {} instances", base),
                });
            }
        }
    }

    let total_chains = chains.len();
    chains.truncate(MAX_CHAINS);
    ChainReport { total_chains, chains }
}
