//! Streaming join of package-CVE candidate mappings with CVE descriptors.
//!
//! The two sides arrive on independent subjects in arbitrary order. Both
//! are cached in bounded LRUs; whichever side arrives second triggers the
//! emission. An emitted-set keyed by
//! `(host_id, package.name, cve_id, mapping_timestamp)` guarantees each
//! candidate of a given mapping version is emitted at most once, and
//! survives eviction of the CVE that produced it.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::Utc;
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::domain::{CveCandidate, CveDescriptor, EnrichedJoinRecord, PkgCveMapping};
use crate::metrics::METRICS;

/// Capacity limits for the three caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinCacheConfig {
    pub cve_capacity: usize,
    pub mapping_capacity: usize,
    pub emitted_capacity: usize,
}

impl Default for JoinCacheConfig {
    fn default() -> Self {
        Self {
            cve_capacity: 200_000,
            mapping_capacity: 200_000,
            emitted_capacity: 100_000,
        }
    }
}

struct Inner {
    cves: LruCache<String, CveDescriptor>,
    mappings: LruCache<String, PkgCveMapping>,
    emitted: LruCache<String, ()>,
}

/// In-process join state shared by the CVE and mapping handlers.
///
/// All compound lookup-and-mark sequences run under a single mutex;
/// callers publish the returned records after the lock is released.
pub struct JoinCache {
    inner: Mutex<Inner>,
}

fn cap(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

/// Digest of the at-most-once emission key.
fn emitted_key(mapping: &PkgCveMapping, candidate: &CveCandidate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mapping.host_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(mapping.package.name.as_bytes());
    hasher.update([0x1f]);
    hasher.update(candidate.cve_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(mapping.timestamp.as_deref().unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// Mark the pair emitted; false when it already was.
fn try_mark(emitted: &mut LruCache<String, ()>, key: String) -> bool {
    if emitted.get(&key).is_some() {
        METRICS.inc_join_records_deduped();
        return false;
    }
    emitted.put(key, ());
    METRICS.inc_join_records_emitted();
    true
}

impl JoinCache {
    pub fn new(config: JoinCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cves: LruCache::new(cap(config.cve_capacity)),
                mappings: LruCache::new(cap(config.mapping_capacity)),
                emitted: LruCache::new(cap(config.emitted_capacity)),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cache a CVE descriptor (last write wins) and emit join records for
    /// every retained mapping candidate that references it.
    pub fn insert_cve(&self, cve: CveDescriptor) -> Vec<EnrichedJoinRecord> {
        let now = Utc::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let pending: Vec<(PkgCveMapping, CveCandidate)> = inner
            .mappings
            .iter()
            .flat_map(|(_, mapping)| {
                mapping
                    .candidates
                    .iter()
                    .filter(|c| c.cve_id == cve.cve_id)
                    .map(move |c| (mapping.clone(), c.clone()))
            })
            .collect();

        inner.cves.put(cve.cve_id.clone(), cve.clone());

        let mut records = Vec::new();
        for (mapping, candidate) in pending {
            if try_mark(&mut inner.emitted, emitted_key(&mapping, &candidate)) {
                records.push(EnrichedJoinRecord::join(&mapping, &candidate, &cve, now));
            }
        }
        records
    }

    /// Cache a mapping (last write wins per `(host, package)`) and emit
    /// join records for every candidate whose CVE is already known.
    pub fn insert_mapping(&self, mapping: PkgCveMapping) -> Vec<EnrichedJoinRecord> {
        let now = Utc::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let mut records = Vec::new();
        for candidate in &mapping.candidates {
            let Some(cve) = inner.cves.get(&candidate.cve_id).cloned() else {
                continue;
            };
            if try_mark(&mut inner.emitted, emitted_key(&mapping, candidate)) {
                records.push(EnrichedJoinRecord::join(&mapping, candidate, &cve, now));
            }
        }

        inner.mappings.put(mapping.cache_key(), mapping);
        records
    }

    pub fn cve_count(&self) -> usize {
        self.lock().cves.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.lock().mappings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> JoinCache {
        JoinCache::new(JoinCacheConfig::default())
    }

    fn cve(id: &str) -> CveDescriptor {
        serde_json::from_value(json!({
            "cve_id": id,
            "published": "2023-01-01T00:00:00Z",
            "cwe": {"cwe_ids": ["CWE-89"]},
            "references": [{"url": "https://example.com"}]
        }))
        .unwrap()
    }

    fn mapping(host: &str, package: &str, cve_ids: &[&str], ts: &str) -> PkgCveMapping {
        let candidates: Vec<_> = cve_ids
            .iter()
            .map(|id| {
                json!({"cve_id": id, "score": 0.8, "reason": "version match",
                       "cvss_score": 7.5, "severity": "HIGH"})
            })
            .collect();
        serde_json::from_value(json!({
            "host_id": host,
            "package": {"name": package, "version": "1.0"},
            "candidates": candidates,
            "timestamp": ts,
            "total_candidates": cve_ids.len()
        }))
        .unwrap()
    }

    #[test]
    fn mapping_before_cve_emits_nothing_then_exactly_once() {
        let jc = cache();
        let out = jc.insert_mapping(mapping("web-01", "openssl", &["CVE-X"], "t1"));
        assert!(out.is_empty());

        let out = jc.insert_cve(cve("CVE-X"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].host_id, "web-01");
        assert_eq!(out[0].cve_candidate.cve_id, "CVE-X");
        assert!(out[0].enrichment.exploitability_score > 0.0);

        // Re-delivering the CVE must not re-emit the same mapping version.
        let out = jc.insert_cve(cve("CVE-X"));
        assert!(out.is_empty());
    }

    #[test]
    fn cve_before_mapping_emits_immediately() {
        let jc = cache();
        assert!(jc.insert_cve(cve("CVE-A")).is_empty());
        let out = jc.insert_mapping(mapping("db-01", "libpq", &["CVE-A"], "t1"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cve_data.cve_id, "CVE-A");
    }

    #[test]
    fn replacement_mapping_with_new_timestamp_emits_again() {
        let jc = cache();
        jc.insert_cve(cve("CVE-A"));
        assert_eq!(jc.insert_mapping(mapping("h", "pkg", &["CVE-A"], "t1")).len(), 1);
        // Same key, same timestamp: suppressed.
        assert!(jc.insert_mapping(mapping("h", "pkg", &["CVE-A"], "t1")).is_empty());
        // Same key, newer scan: a fresh mapping version emits again.
        assert_eq!(jc.insert_mapping(mapping("h", "pkg", &["CVE-A"], "t2")).len(), 1);
    }

    #[test]
    fn multi_candidate_mapping_emits_per_matched_cve() {
        let jc = cache();
        jc.insert_cve(cve("CVE-1"));
        let out = jc.insert_mapping(mapping("h", "pkg", &["CVE-1", "CVE-2"], "t1"));
        assert_eq!(out.len(), 1);

        // The straggler CVE completes the remaining candidate only.
        let out = jc.insert_cve(cve("CVE-2"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cve_candidate.cve_id, "CVE-2");
    }

    #[test]
    fn late_cve_fans_out_to_all_retained_mappings() {
        let jc = cache();
        jc.insert_mapping(mapping("web-01", "openssl", &["CVE-X"], "t1"));
        jc.insert_mapping(mapping("db-01", "openssl", &["CVE-X"], "t1"));
        jc.insert_mapping(mapping("web-01", "curl", &["CVE-OTHER"], "t1"));

        let out = jc.insert_cve(cve("CVE-X"));
        let mut hosts: Vec<_> = out.iter().map(|r| r.host_id.as_str()).collect();
        hosts.sort_unstable();
        assert_eq!(hosts, vec!["db-01", "web-01"]);
    }

    #[test]
    fn cve_eviction_does_not_reemit_prior_records() {
        let jc = JoinCache::new(JoinCacheConfig {
            cve_capacity: 1,
            mapping_capacity: 16,
            emitted_capacity: 16,
        });
        jc.insert_mapping(mapping("h", "pkg", &["CVE-1"], "t1"));
        assert_eq!(jc.insert_cve(cve("CVE-1")).len(), 1);

        // CVE-2 evicts CVE-1 from the single-slot cache.
        jc.insert_cve(cve("CVE-2"));
        assert_eq!(jc.cve_count(), 1);

        // CVE-1 returning must not re-emit the already-joined pair.
        assert!(jc.insert_cve(cve("CVE-1")).is_empty());
    }

    #[test]
    fn mapping_cache_is_bounded() {
        let jc = JoinCache::new(JoinCacheConfig {
            cve_capacity: 4,
            mapping_capacity: 2,
            emitted_capacity: 16,
        });
        jc.insert_mapping(mapping("h1", "a", &["CVE-1"], "t1"));
        jc.insert_mapping(mapping("h2", "b", &["CVE-1"], "t1"));
        jc.insert_mapping(mapping("h3", "c", &["CVE-1"], "t1"));
        assert_eq!(jc.mapping_count(), 2);

        // The evicted oldest mapping no longer participates in the join.
        let out = jc.insert_cve(cve("CVE-1"));
        assert_eq!(out.len(), 2);
    }
}
