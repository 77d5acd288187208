//! Configuration registries and the resolved snapshot.
//!
//! Three inputs merge into one resolved snapshot: the runtime config, the
//! sources registry (tiered source lists with defaults), and the suppression
//! registry. Merging is top-down; built-in tier defaults, then the
//! registry's `tier_defaults`, then per-source overrides, with per-source
//! values winning. The snapshot's canonical-JSON SHA-256 is the config
//! fingerprint embedded in every RunRecord; two hosts resolving the same
//! inputs must produce the same hash.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::canonical_json::CanonicalJsonError;
use crate::error::{Error, Result};
use crate::hash::artifact_hash;

/// Geographic/scope classification of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    /// Country- or world-scale feeds.
    Global,
    /// State- or region-scale feeds.
    Regional,
    /// City- or site-scale feeds.
    Local,
}

impl SourceTier {
    /// All tiers in declared resolution order.
    pub const ALL: [Self; 3] = [Self::Global, Self::Regional, Self::Local];

    /// Stable lowercase name used in configs and brief tier counts.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Regional => "regional",
            Self::Local => "local",
        }
    }
}

/// Reliability grade of a source (1 lowest, 3 highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustTier(u8);

impl TrustTier {
    /// Creates a trust tier, rejecting values outside `[1, 3]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for out-of-range values.
    pub fn new(value: u8) -> Result<Self> {
        if (1..=3).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::config_parse(format!(
                "trust_tier must be in [1, 3], got {value}"
            )))
        }
    }

    /// The raw tier value.
    #[must_use]
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// The impact-score delta this tier contributes: `+1` for tier 3,
    /// `0` for tier 2, `-1` for tier 1.
    #[must_use]
    pub const fn score_delta(&self) -> i64 {
        match self.0 {
            3 => 1,
            1 => -1,
            _ => 0,
        }
    }
}

impl Default for TrustTier {
    fn default() -> Self {
        Self(2)
    }
}

/// Match kind of a suppression rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Substring containment.
    Keyword,
    /// Regular-expression search.
    Regex,
    /// Whole-value equality.
    Exact,
}

/// Field a suppression rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    /// The item title.
    Title,
    /// The item summary.
    Summary,
    /// The full raw text.
    RawText,
    /// The item URL.
    Url,
    /// The inferred event type.
    EventType,
    /// The source id.
    SourceId,
    /// The source tier.
    Tier,
    /// Title, summary, then raw text, in that order.
    Any,
}

/// A single suppression rule as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionRuleSpec {
    /// Unique rule identifier.
    pub id: String,
    /// Whether this rule is active. Defaults to true.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Match kind.
    pub kind: RuleKind,
    /// Field to match.
    pub field: RuleField,
    /// Pattern to match against.
    pub pattern: String,
    /// Whether matching is case-sensitive. Defaults to false.
    #[serde(default)]
    pub case_sensitive: bool,
    /// Optional human-readable note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Short code for reporting; defaults to the rule id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

impl SuppressionRuleSpec {
    /// The reason code for this rule, falling back to its id.
    #[must_use]
    pub fn reason_code(&self) -> &str {
        self.reason_code.as_deref().unwrap_or(&self.id)
    }
}

fn default_true() -> bool {
    true
}

/// The suppression registry: an ordered list of global rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionRegistry {
    /// Registry schema version.
    #[serde(default)]
    pub version: u32,
    /// Master switch; when false no rule is evaluated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ordered global rules. Declared order is evaluation order.
    #[serde(default)]
    pub rules: Vec<SuppressionRuleSpec>,
}

impl Default for SuppressionRegistry {
    fn default() -> Self {
        Self {
            version: 0,
            enabled: true,
            rules: Vec::new(),
        }
    }
}

impl SuppressionRegistry {
    /// Parses a registry from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] on malformed YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config_parse(format!("suppression registry: {e}")))
    }

    /// Rule ids that appear more than once, in first-appearance order.
    /// Duplicates load (first occurrence wins downstream) but are flagged
    /// as a run-status warning.
    #[must_use]
    pub fn duplicate_rule_ids(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut dupes = Vec::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) && !dupes.iter().any(|d| d == &rule.id) {
                dupes.push(rule.id.clone());
            }
        }
        dupes
    }
}

/// Per-tier default trust settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDefaults {
    /// Default trust tier for sources in this tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_tier: Option<u8>,
    /// Default classification floor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_floor: Option<u8>,
    /// Default weighting bias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighting_bias: Option<i8>,
}

/// Registry-wide source defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefaults {
    /// Whether sources are enabled unless they say otherwise.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cap on items accepted per fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items_per_fetch: Option<u32>,
    /// Per-source fetch timeout applied by the ingestion collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}

/// A source as declared in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Unique source id.
    pub id: String,
    /// Adapter type (`rss`, `atom`, `gov_alerts`, …).
    #[serde(rename = "type")]
    pub source_type: String,
    /// Feed URL.
    pub url: String,
    /// Whether the source is fetched; falls back to registry defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Source-local suppression rules, evaluated after global rules.
    #[serde(default)]
    pub suppress: Vec<SuppressionRuleSpec>,
    /// Trust tier override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_tier: Option<u8>,
    /// Classification floor override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_floor: Option<u8>,
    /// Weighting bias override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighting_bias: Option<i8>,
    /// Fetch timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    /// Per-fetch item cap override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items_per_fetch: Option<u32>,
}

/// The sources registry file: ordered source lists per tier plus defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesRegistry {
    /// Registry schema version.
    #[serde(default)]
    pub version: u32,
    /// Registry-wide defaults.
    #[serde(default)]
    pub defaults: SourceDefaults,
    /// Per-tier default trust settings.
    #[serde(default)]
    pub tier_defaults: BTreeMap<String, TierDefaults>,
    /// Ordered source lists keyed by tier.
    #[serde(default)]
    pub tiers: TieredSources,
}

/// The three ordered source lists of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredSources {
    /// Global-tier sources.
    #[serde(default)]
    pub global: Vec<SourceSpec>,
    /// Regional-tier sources.
    #[serde(default)]
    pub regional: Vec<SourceSpec>,
    /// Local-tier sources.
    #[serde(default)]
    pub local: Vec<SourceSpec>,
}

impl SourcesRegistry {
    /// Parses a registry from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] on malformed YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config_parse(format!("sources registry: {e}")))
    }

    fn tier_sources(&self, tier: SourceTier) -> &[SourceSpec] {
        match tier {
            SourceTier::Global => &self.tiers.global,
            SourceTier::Regional => &self.tiers.regional,
            SourceTier::Local => &self.tiers.local,
        }
    }
}

/// Built-in tier defaults applied beneath the registry's `tier_defaults`.
const fn base_trust_tier(tier: SourceTier) -> u8 {
    match tier {
        SourceTier::Global => 3,
        SourceTier::Regional => 2,
        SourceTier::Local => 1,
    }
}

/// Impact-scorer cut points, parameterized so tuning is a config change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringThresholds {
    /// Facility criticality at or above which the facility subscore is +2.
    pub critical_facility: i64,
    /// Facility criticality at or above which the facility subscore is +1.
    pub notable_facility: i64,
    /// Lane volume at or above which the lane subscore is +1.
    pub high_volume_lane: i64,
    /// The "imminent" ETA window in hours.
    pub eta_window_hours: i64,
    /// Cap on the priority-shipment subscore.
    pub priority_shipment_cap: i64,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            critical_facility: 8,
            notable_facility: 5,
            high_volume_lane: 7,
            eta_window_hours: 48,
            priority_shipment_cap: 2,
        }
    }
}

/// Runtime configuration: paths, windows, and caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory RunRecord JSON files are written to.
    #[serde(default = "default_run_records_dir")]
    pub run_records_dir: String,
    /// Directory incident-evidence artifacts are written to.
    #[serde(default = "default_incidents_dir")]
    pub incidents_dir: String,
    /// Correlation window in days.
    #[serde(default = "default_correlation_window_days")]
    pub correlation_window_days: i64,
    /// Shipment-linkage truncation cap.
    #[serde(default = "default_max_shipments")]
    pub max_shipments: usize,
    /// Shipment ETA linkage horizon in days.
    #[serde(default = "default_eta_horizon_days")]
    pub eta_horizon_days: i64,
    /// Cap on the brief's `top` section.
    #[serde(default = "default_top_cap")]
    pub brief_top_cap: usize,
    /// Per-section alert cap in the brief.
    #[serde(default = "default_brief_limit")]
    pub brief_limit: usize,
    /// Hours without a successful fetch before a source counts as stale.
    #[serde(default = "default_stale_threshold_hours")]
    pub stale_threshold_hours: i64,
    /// Impact-scorer cut points.
    #[serde(default)]
    pub scoring: ScoringThresholds,
}

fn default_run_records_dir() -> String {
    "run_records".to_owned()
}
fn default_incidents_dir() -> String {
    "output/incidents".to_owned()
}
const fn default_correlation_window_days() -> i64 {
    7
}
const fn default_max_shipments() -> usize {
    6
}
const fn default_eta_horizon_days() -> i64 {
    14
}
const fn default_top_cap() -> usize {
    2
}
const fn default_brief_limit() -> usize {
    20
}
const fn default_stale_threshold_hours() -> i64 {
    48
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            run_records_dir: default_run_records_dir(),
            incidents_dir: default_incidents_dir(),
            correlation_window_days: default_correlation_window_days(),
            max_shipments: default_max_shipments(),
            eta_horizon_days: default_eta_horizon_days(),
            brief_top_cap: default_top_cap(),
            brief_limit: default_brief_limit(),
            stale_threshold_hours: default_stale_threshold_hours(),
            scoring: ScoringThresholds::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parses a runtime config from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] on malformed YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config_parse(format!("runtime config: {e}")))
    }
}

/// A source after all defaults have been folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    /// Unique source id.
    pub id: String,
    /// Adapter type.
    pub source_type: String,
    /// Feed URL.
    pub url: String,
    /// Whether this source is fetched.
    pub enabled: bool,
    /// The tier the source was declared under.
    pub tier: SourceTier,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Resolved trust tier.
    pub trust_tier: TrustTier,
    /// Resolved classification floor (0–2).
    pub classification_floor: u8,
    /// Resolved weighting bias (−2..=2).
    pub weighting_bias: i8,
    /// Ordered source-local suppression rules.
    pub suppress: Vec<SuppressionRuleSpec>,
    /// Fetch timeout in seconds, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    /// Per-fetch item cap, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items_per_fetch: Option<u32>,
}

/// The fully resolved configuration snapshot.
///
/// This is the hashing boundary: `fingerprint()` is the `config_hash`
/// embedded in every RunRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Runtime settings.
    pub runtime: RuntimeConfig,
    /// Sources in registry order (global, regional, local).
    pub sources: Vec<ResolvedSource>,
    /// The global suppression registry.
    pub suppression: SuppressionRegistry,
}

impl ResolvedConfig {
    /// Resolves the three inputs into one snapshot.
    ///
    /// Tier defaults fold beneath per-source overrides; per-source values
    /// always win. Source ids must be unique across tiers; range violations
    /// in trust settings are config errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] on duplicate source ids or
    /// out-of-range trust settings.
    pub fn resolve(
        runtime: RuntimeConfig,
        registry: &SourcesRegistry,
        suppression: SuppressionRegistry,
    ) -> Result<Self> {
        let mut sources = Vec::new();
        let mut seen_ids = BTreeSet::new();

        for tier in SourceTier::ALL {
            let tier_defaults = registry.tier_defaults.get(tier.as_str());
            for spec in registry.tier_sources(tier) {
                if !seen_ids.insert(spec.id.clone()) {
                    return Err(Error::config_parse(format!(
                        "duplicate source id '{}'",
                        spec.id
                    )));
                }
                sources.push(resolve_source(spec, tier, tier_defaults, &registry.defaults)?);
            }
        }

        Ok(Self {
            runtime,
            sources,
            suppression,
        })
    }

    /// Looks up a resolved source by id.
    #[must_use]
    pub fn source(&self, id: &str) -> Option<&ResolvedSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Sources with `enabled = true`, in registry order.
    #[must_use]
    pub fn enabled_sources(&self) -> Vec<&ResolvedSource> {
        self.sources.iter().filter(|s| s.enabled).collect()
    }

    /// The config fingerprint: SHA-256 of the snapshot's canonical JSON.
    /// Identical inputs produce identical fingerprints on every host.
    ///
    /// # Errors
    ///
    /// Returns a [`CanonicalJsonError`] if the snapshot cannot be
    /// canonically serialized.
    pub fn fingerprint(&self) -> std::result::Result<String, CanonicalJsonError> {
        artifact_hash(self)
    }
}

fn resolve_source(
    spec: &SourceSpec,
    tier: SourceTier,
    tier_defaults: Option<&TierDefaults>,
    defaults: &SourceDefaults,
) -> Result<ResolvedSource> {
    let trust_raw = spec
        .trust_tier
        .or_else(|| tier_defaults.and_then(|d| d.trust_tier))
        .unwrap_or_else(|| base_trust_tier(tier));
    let trust_tier = TrustTier::new(trust_raw)
        .map_err(|e| Error::config_parse(format!("source '{}': {e}", spec.id)))?;

    let classification_floor = spec
        .classification_floor
        .or_else(|| tier_defaults.and_then(|d| d.classification_floor))
        .unwrap_or(0);
    if classification_floor > 2 {
        return Err(Error::config_parse(format!(
            "source '{}': classification_floor must be in [0, 2], got {classification_floor}",
            spec.id
        )));
    }

    let weighting_bias = spec
        .weighting_bias
        .or_else(|| tier_defaults.and_then(|d| d.weighting_bias))
        .unwrap_or(0);
    if !(-2..=2).contains(&weighting_bias) {
        return Err(Error::config_parse(format!(
            "source '{}': weighting_bias must be in [-2, 2], got {weighting_bias}",
            spec.id
        )));
    }

    Ok(ResolvedSource {
        id: spec.id.clone(),
        source_type: spec.source_type.clone(),
        url: spec.url.clone(),
        enabled: spec.enabled.unwrap_or(defaults.enabled),
        tier,
        tags: spec.tags.clone(),
        trust_tier,
        classification_floor,
        weighting_bias,
        suppress: spec.suppress.clone(),
        timeout_seconds: spec.timeout_seconds.or(defaults.timeout_seconds),
        max_items_per_fetch: spec.max_items_per_fetch.or(defaults.max_items_per_fetch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES_YAML: &str = r#"
version: 1
defaults:
  enabled: true
  timeout_seconds: 20
tier_defaults:
  regional:
    trust_tier: 2
    weighting_bias: 1
tiers:
  global:
    - id: nws_active_us
      type: gov_alerts
      url: https://alerts.example.gov/active
      tags: [weather, us]
  regional:
    - id: indiana_dot
      type: rss
      url: https://feeds.example.org/in-dot
      classification_floor: 1
  local:
    - id: avon_scanner
      type: rss
      url: https://feeds.example.org/avon
      enabled: false
      trust_tier: 1
"#;

    fn resolved() -> ResolvedConfig {
        let registry = SourcesRegistry::from_yaml_str(SOURCES_YAML)
            .unwrap_or_else(|e| panic!("registry parse failed: {e}"));
        ResolvedConfig::resolve(
            RuntimeConfig::default(),
            &registry,
            SuppressionRegistry::default(),
        )
        .unwrap_or_else(|e| panic!("resolve failed: {e}"))
    }

    #[test]
    fn tier_defaults_fold_beneath_source_overrides() {
        let config = resolved();

        let nws = config.source("nws_active_us").unwrap();
        assert_eq!(nws.trust_tier.get(), 3); // built-in global default
        assert_eq!(nws.classification_floor, 0);
        assert_eq!(nws.timeout_seconds, Some(20));

        let dot = config.source("indiana_dot").unwrap();
        assert_eq!(dot.trust_tier.get(), 2); // registry tier_defaults
        assert_eq!(dot.weighting_bias, 1);
        assert_eq!(dot.classification_floor, 1); // per-source override wins

        let scanner = config.source("avon_scanner").unwrap();
        assert_eq!(scanner.trust_tier.get(), 1); // per-source override
        assert!(!scanner.enabled);
    }

    #[test]
    fn enabled_sources_preserve_registry_order() {
        let config = resolved();
        let ids: Vec<&str> = config.enabled_sources().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["nws_active_us", "indiana_dot"]);
    }

    #[test]
    fn duplicate_source_ids_are_a_config_error() {
        let yaml = r"
version: 1
tiers:
  global:
    - {id: dup, type: rss, url: 'https://a'}
  local:
    - {id: dup, type: rss, url: 'https://b'}
";
        let registry = SourcesRegistry::from_yaml_str(yaml).unwrap();
        let err = ResolvedConfig::resolve(
            RuntimeConfig::default(),
            &registry,
            SuppressionRegistry::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn out_of_range_bias_is_rejected() {
        let yaml = r"
version: 1
tiers:
  global:
    - {id: s1, type: rss, url: 'https://a', weighting_bias: 3}
";
        let registry = SourcesRegistry::from_yaml_str(yaml).unwrap();
        assert!(ResolvedConfig::resolve(
            RuntimeConfig::default(),
            &registry,
            SuppressionRegistry::default(),
        )
        .is_err());
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = resolved();
        let b = resolved();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let mut c = resolved();
        c.runtime.brief_limit = 5;
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn suppression_duplicates_are_flagged_not_fatal() {
        let yaml = r#"
version: 1
rules:
  - {id: global_test_alerts, kind: keyword, field: any, pattern: "test"}
  - {id: global_test_alerts, kind: keyword, field: title, pattern: "drill"}
"#;
        let registry = SuppressionRegistry::from_yaml_str(yaml).unwrap();
        assert_eq!(registry.duplicate_rule_ids(), ["global_test_alerts"]);
    }

    #[test]
    fn trust_tier_score_deltas() {
        assert_eq!(TrustTier::new(3).unwrap().score_delta(), 1);
        assert_eq!(TrustTier::new(2).unwrap().score_delta(), 0);
        assert_eq!(TrustTier::new(1).unwrap().score_delta(), -1);
        assert!(TrustTier::new(0).is_err());
        assert!(TrustTier::new(4).is_err());
    }
}
