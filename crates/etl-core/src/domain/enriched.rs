//! The enriched join record emitted on `etl.enriched`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::cve::{CveCandidate, CveDescriptor, PackageInfo, PkgCveMapping};
use crate::score::{exploitability_score, round3, RiskLevel};

/// Version stamp carried in every join record's `enrichment` block.
pub const ENRICHMENT_VERSION: &str = "1.0";

/// Scoring output attached to a join record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinEnrichment {
    pub exploitability_score: f64,
    pub risk_level: RiskLevel,
    pub enrichment_timestamp: String,
    pub enrichment_version: String,
}

/// Provenance block on a join record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRecordMetadata {
    pub source: String,
    pub enrichment_pipeline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_timestamp: Option<String>,
    pub total_candidates: u64,
}

/// One `(host, package, candidate)` joined with its CVE descriptor and
/// scored. Emitted at most once per mapping version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedJoinRecord {
    pub record_type: String,
    pub timestamp: String,
    pub host_id: String,
    pub package: PackageInfo,
    pub cve_candidate: CveCandidate,
    pub cve_data: CveDescriptor,
    pub enrichment: JoinEnrichment,
    pub metadata: JoinRecordMetadata,
}

impl EnrichedJoinRecord {
    /// Join one candidate from `mapping` with its CVE descriptor.
    ///
    /// `now` drives both the generated timestamps and the scorer's recency
    /// bonus.
    pub fn join(
        mapping: &PkgCveMapping,
        candidate: &CveCandidate,
        cve: &CveDescriptor,
        now: DateTime<Utc>,
    ) -> Self {
        let score = round3(exploitability_score(candidate, cve, now));
        let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);

        EnrichedJoinRecord {
            record_type: "pkg_cve_enriched".to_string(),
            timestamp: stamp.clone(),
            host_id: mapping.host_id.clone(),
            package: mapping.package.clone(),
            cve_candidate: candidate.clone(),
            cve_data: cve.clone(),
            enrichment: JoinEnrichment {
                exploitability_score: score,
                risk_level: RiskLevel::from_score(score),
                enrichment_timestamp: stamp,
                enrichment_version: ENRICHMENT_VERSION.to_string(),
            },
            metadata: JoinRecordMetadata {
                source: "etl-enrich".to_string(),
                enrichment_pipeline: "pkg_cve_join".to_string(),
                original_timestamp: mapping.timestamp.clone(),
                total_candidates: mapping.total_candidates,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn mapping() -> PkgCveMapping {
        serde_json::from_value(json!({
            "host_id": "web-01",
            "package": {"name": "openssl", "version": "3.0.2-0ubuntu1.6"},
            "candidates": [{"cve_id": "CVE-2023-1234", "score": 0.875,
                            "reason": "version match", "cvss_score": 9.8,
                            "severity": "CRITICAL"}],
            "timestamp": "2023-01-01T00:00:00Z",
            "total_candidates": 1
        }))
        .unwrap()
    }

    fn cve() -> CveDescriptor {
        serde_json::from_value(json!({
            "cve_id": "CVE-2023-1234",
            "published": "2023-01-01T00:00:00Z",
            "cwe": {"cwe_ids": ["CWE-89"]},
            "references": [{"url": "https://example.com/a"}]
        }))
        .unwrap()
    }

    #[test]
    fn join_record_carries_provenance_and_version() {
        let m = mapping();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let rec = EnrichedJoinRecord::join(&m, &m.candidates[0], &cve(), now);

        assert_eq!(rec.record_type, "pkg_cve_enriched");
        assert_eq!(rec.host_id, "web-01");
        assert_eq!(rec.metadata.source, "etl-enrich");
        assert_eq!(rec.metadata.enrichment_pipeline, "pkg_cve_join");
        assert_eq!(rec.metadata.original_timestamp.as_deref(), Some("2023-01-01T00:00:00Z"));
        assert_eq!(rec.enrichment.enrichment_version, ENRICHMENT_VERSION);
        assert!(rec.timestamp.ends_with('Z'));
    }

    #[test]
    fn join_record_score_is_rounded_to_three_decimals() {
        let m = mapping();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let rec = EnrichedJoinRecord::join(&m, &m.candidates[0], &cve(), now);
        let scaled = rec.enrichment.exploitability_score * 1000.0;
        assert!((scaled - scaled.round()).abs() < 1e-9);
    }
}
