//! Exploitability scoring for package-CVE candidates.
//!
//! The score is an additive heuristic in [0, 1] combining the package
//! matcher's confidence, CVSS, severity, CWE risk class, documentation
//! breadth, and recency. It is a pure function: the clock is a parameter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CveCandidate, CveDescriptor};

/// CWE classes that historically correlate with straightforward
/// exploitation (injection, traversal, deserialization, authz gaps).
pub const HIGH_RISK_CWES: [&str; 10] = [
    "CWE-79", "CWE-89", "CWE-78", "CWE-22", "CWE-352", "CWE-434", "CWE-502", "CWE-862", "CWE-863",
    "CWE-269",
];

/// Discrete risk bands over the exploitability score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl RiskLevel {
    /// Map a score to its band: >= 0.8 CRITICAL, >= 0.6 HIGH, >= 0.4 MEDIUM,
    /// >= 0.2 LOW, else MINIMAL.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else if score >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
            RiskLevel::Minimal => "MINIMAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round to three decimal places for emission.
pub fn round3(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

/// Compute the exploitability score for `candidate` against `cve`.
///
/// Contributions:
/// - 0.4 x package-match confidence
/// - 0.3 x min(cvss / 10, 1) when a CVSS score is present
/// - severity bonus (critical 0.3, high 0.2, medium 0.1, low 0.05)
/// - +0.1 if any CWE id is in [`HIGH_RISK_CWES`]
/// - +0.05 with more than five references
/// - +0.05 when published less than 30 days before `now`
///
/// The sum is clipped at 1.0. Monotonic in `candidate.score` with all
/// other inputs fixed.
pub fn exploitability_score(
    candidate: &CveCandidate,
    cve: &CveDescriptor,
    now: DateTime<Utc>,
) -> f64 {
    let mut score = candidate.score * 0.4;

    if candidate.cvss_score > 0.0 {
        score += (candidate.cvss_score / 10.0).min(1.0) * 0.3;
    }

    score += match candidate.severity.to_lowercase().as_str() {
        "critical" => 0.3,
        "high" => 0.2,
        "medium" => 0.1,
        "low" => 0.05,
        _ => 0.0,
    };

    if cve
        .cwe
        .cwe_ids
        .iter()
        .any(|id| HIGH_RISK_CWES.contains(&id.as_str()))
    {
        score += 0.1;
    }

    if cve.references.len() > 5 {
        score += 0.05;
    }

    if let Some(published) = cve.published.as_deref() {
        if let Ok(pub_date) = DateTime::parse_from_rfc3339(published) {
            if (now - pub_date.with_timezone(&Utc)).num_days() < 30 {
                score += 0.05;
            }
        }
    }

    score.min(1.0)
}
