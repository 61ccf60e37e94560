//! CVE descriptors and per-host package-to-CVE candidate mappings.
//!
//! Both shapes arrive on their own feed subjects in arbitrary order
//! relative to each other; the join cache pairs them up.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One localized description entry on a CVE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CveDescription {
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A CVSS base score under one version key (`v3.1`, `v3`, `v2`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvssEntry {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub severity: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// CVSS base scores keyed by version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvssData {
    #[serde(default)]
    pub base: BTreeMap<String, CvssEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// CWE classification attached to a CVE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CweData {
    #[serde(default)]
    pub cwe_ids: Vec<String>,
    #[serde(default)]
    pub cwe_names: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reference link on a CVE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CveReference {
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A CVE descriptor from `feeds.cve.updates`. Last write wins per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveDescriptor {
    pub cve_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub descriptions: Vec<CveDescription>,
    #[serde(default)]
    pub cvss: CvssData,
    #[serde(default)]
    pub cwe: CweData,
    #[serde(default)]
    pub affected_products: Vec<Value>,
    #[serde(default)]
    pub references: Vec<CveReference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Package identity as reported by the host inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub epoch: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub distro: String,
    #[serde(default)]
    pub distro_version: String,
}

/// One scored CVE candidate produced by the package matcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CveCandidate {
    pub cve_id: String,
    /// Package-match confidence in [0, 1].
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub cvss_score: f64,
    #[serde(default)]
    pub severity: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A per-host package-to-CVE mapping from `feeds.pkg.cve`.
///
/// Keyed by `(host_id, package.name)`; a newer mapping for the same key
/// replaces the older one entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkgCveMapping {
    pub host_id: String,
    pub package: PackageInfo,
    #[serde(default)]
    pub candidates: Vec<CveCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub total_candidates: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PkgCveMapping {
    /// Cache key: `<host_id>:<package.name>`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.host_id, self.package.name)
    }
}
