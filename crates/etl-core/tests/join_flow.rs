//! Cross-module flow tests: enrichment output shape on the wire, and the
//! join cache driving the scorer into a complete enriched record.

use serde_json::json;

use etl_core::domain::{CveDescriptor, PkgCveMapping, RawEvent};
use etl_core::{enrich_event, validate_enriched, JoinCache, JoinCacheConfig, RiskLevel};

#[test]
fn enriched_event_wire_shape_validates_and_preserves_fields() {
    let event: RawEvent = serde_json::from_value(json!({
        "id": "evt-1",
        "type": "connect",
        "source": "/usr/bin/curl",
        "timestamp": "2023-11-14T22:13:20Z",
        "metadata": {"host_id": "web-01", "container_id": "c-42"},
        "args": {"dst_ip": "10.1.2.3", "dst_port": 80},
        "trace_id": "t-123"
    }))
    .unwrap();

    let wire = serde_json::to_value(enrich_event(&event, "dev", true)).unwrap();

    assert!(validate_enriched(&wire));
    assert_eq!(wire["context"], json!({"env": "dev", "rdns": "host-3.local"}));
    assert_eq!(wire["id"], "evt-1");
    assert_eq!(wire["type"], "connect");
    assert_eq!(wire["metadata"]["container_id"], "c-42");
    assert_eq!(wire["trace_id"], "t-123");
}

#[test]
fn join_cache_produces_a_complete_scored_record() {
    let cache = JoinCache::new(JoinCacheConfig::default());

    let mapping: PkgCveMapping = serde_json::from_value(json!({
        "host_id": "web-01",
        "package": {
            "name": "openssl", "version": "3.0.2-0ubuntu1.6", "epoch": "",
            "release": "0ubuntu1.6", "arch": "amd64",
            "distro": "ubuntu", "distro_version": "22.04"
        },
        "candidates": [{
            "cve_id": "CVE-2023-1234", "score": 0.875,
            "reason": "Package openssl version 3.0.2-0ubuntu1.6 matches affected products (CVSS: 9.8)",
            "cvss_score": 9.8, "severity": "CRITICAL"
        }],
        "timestamp": "2023-01-01T00:00:00Z",
        "total_candidates": 1
    }))
    .unwrap();

    let cve: CveDescriptor = serde_json::from_value(json!({
        "cve_id": "CVE-2023-1234",
        "published": "2023-01-01T00:00:00Z",
        "last_modified": "2023-01-15T00:00:00Z",
        "descriptions": [{"lang": "en", "value": "RCE in OpenSSL", "source": "nvd"}],
        "cvss": {"base": {"v3.1": {"score": 9.8, "severity": "CRITICAL"}}},
        "cwe": {"cwe_ids": ["CWE-89", "CWE-79"]},
        "affected_products": [{"cpe_name": "cpe:2.3:a:openssl:openssl:3.0.2:*:*:*:*:*:*:*"}],
        "references": [{"url": "https://nvd.nist.gov/vuln/detail/CVE-2023-1234"}]
    }))
    .unwrap();

    assert!(cache.insert_mapping(mapping).is_empty());
    let records = cache.insert_cve(cve);
    assert_eq!(records.len(), 1);

    let record = &records[0];
    // 0.875 match + 9.8 CVSS + critical severity + risky CWE
    assert!(record.enrichment.exploitability_score > 0.8);
    assert_eq!(record.enrichment.risk_level, RiskLevel::Critical);

    let wire = serde_json::to_value(record).unwrap();
    assert_eq!(wire["record_type"], "pkg_cve_enriched");
    assert_eq!(wire["host_id"], "web-01");
    assert_eq!(wire["package"]["name"], "openssl");
    assert_eq!(wire["cve_candidate"]["cve_id"], "CVE-2023-1234");
    assert_eq!(wire["cve_data"]["cve_id"], "CVE-2023-1234");
    assert_eq!(wire["enrichment"]["enrichment_version"], "1.0");
    assert_eq!(wire["enrichment"]["risk_level"], "CRITICAL");
    assert_eq!(wire["metadata"]["source"], "etl-enrich");
    assert_eq!(wire["metadata"]["enrichment_pipeline"], "pkg_cve_join");
    assert_eq!(wire["metadata"]["original_timestamp"], "2023-01-01T00:00:00Z");
    assert_eq!(wire["metadata"]["total_candidates"], 1);
}
