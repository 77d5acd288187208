//! The suppression engine.
//!
//! Rules compile once at load time; invalid regexes and duplicate rule ids
//! fail there, never during evaluation. Evaluation walks global rules in
//! declared order, then per-source rules in declared order, collects every
//! match, and crowns the first match primary. Suppressed events keep
//! flowing in audit-only mode; they become Event rows but never touch an
//! alert.

use regex::RegexBuilder;

use hardstop_core::{
    Error, Result, RuleField, RuleKind, SuppressionRegistry, SuppressionRuleSpec, UtcTimestamp,
};
use hardstop_store::SuppressionStamp;

/// A rule compiled for evaluation.
#[derive(Debug)]
struct CompiledRule {
    spec: SuppressionRuleSpec,
    regex: Option<regex::Regex>,
}

impl CompiledRule {
    fn compile(spec: &SuppressionRuleSpec) -> Result<Self> {
        let regex = match spec.kind {
            RuleKind::Regex => Some(
                RegexBuilder::new(&spec.pattern)
                    .case_insensitive(!spec.case_sensitive)
                    .build()
                    .map_err(|e| Error::InvalidSuppressionRule {
                        rule_id: spec.id.clone(),
                        message: format!("regex does not compile: {e}"),
                    })?,
            ),
            RuleKind::Keyword | RuleKind::Exact => None,
        };
        Ok(Self {
            spec: spec.clone(),
            regex,
        })
    }

    fn matches_value(&self, value: &str) -> bool {
        match self.spec.kind {
            RuleKind::Keyword => {
                if self.spec.case_sensitive {
                    value.contains(&self.spec.pattern)
                } else {
                    value.to_lowercase().contains(&self.spec.pattern.to_lowercase())
                }
            }
            RuleKind::Exact => {
                if self.spec.case_sensitive {
                    value == self.spec.pattern
                } else {
                    value.eq_ignore_ascii_case(&self.spec.pattern)
                }
            }
            RuleKind::Regex => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(value)),
        }
    }

    fn matches(&self, item: &SuppressionInput<'_>) -> bool {
        if !self.spec.enabled {
            return false;
        }
        match self.spec.field {
            RuleField::Title => self.matches_value(item.title),
            RuleField::Summary => self.matches_value(item.summary),
            RuleField::RawText => self.matches_value(item.raw_text),
            RuleField::Url => item.url.is_some_and(|u| self.matches_value(u)),
            RuleField::EventType => self.matches_value(item.event_type),
            RuleField::SourceId => self.matches_value(item.source_id),
            RuleField::Tier => self.matches_value(item.tier),
            // `any` probes title, summary, raw_text in that order: the
            // first non-empty field is the one tested.
            RuleField::Any => [item.title, item.summary, item.raw_text]
                .iter()
                .find(|v| !v.is_empty())
                .is_some_and(|v| self.matches_value(v)),
        }
    }
}

/// The fields suppression evaluates against.
#[derive(Debug, Clone, Copy)]
pub struct SuppressionInput<'a> {
    /// Item title.
    pub title: &'a str,
    /// Item summary.
    pub summary: &'a str,
    /// Full raw text.
    pub raw_text: &'a str,
    /// Item URL.
    pub url: Option<&'a str>,
    /// Inferred event type name.
    pub event_type: &'a str,
    /// Source id.
    pub source_id: &'a str,
    /// Source tier name.
    pub tier: &'a str,
}

/// The outcome of evaluating all rules against one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionVerdict {
    /// True when at least one rule matched.
    pub suppressed: bool,
    /// First matching rule id.
    pub primary_rule_id: Option<String>,
    /// All matching rule ids, in evaluation order.
    pub matched_rule_ids: Vec<String>,
    /// Reason code of the primary rule.
    pub primary_reason_code: Option<String>,
}

impl SuppressionVerdict {
    /// Builds the stamp applied to raw items and events, or `None` when the
    /// item was not suppressed.
    #[must_use]
    pub fn stamp(&self, suppressed_at_utc: UtcTimestamp, stage: &str) -> Option<SuppressionStamp> {
        let primary = self.primary_rule_id.as_ref()?;
        Some(SuppressionStamp {
            primary_rule_id: primary.clone(),
            rule_ids: self.matched_rule_ids.clone(),
            reason_code: self
                .primary_reason_code
                .clone()
                .unwrap_or_else(|| primary.clone()),
            suppressed_at_utc,
            stage: stage.to_owned(),
        })
    }
}

/// The suppression engine: global rules plus per-source rules, compiled at
/// load time.
#[derive(Debug)]
pub struct SuppressionEngine {
    enabled: bool,
    global: Vec<CompiledRule>,
}

impl SuppressionEngine {
    /// Compiles the global registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSuppressionRule`] for regexes that do not
    /// compile or rule ids duplicated within the registry.
    pub fn compile(registry: &SuppressionRegistry) -> Result<Self> {
        let global = compile_list(&registry.rules)?;
        Ok(Self {
            enabled: registry.enabled,
            global,
        })
    }

    /// Evaluates all rules against one item.
    ///
    /// `source_rules` is the source's local rule list in declared order; it
    /// is compiled on the fly per call (local lists are short) but with the
    /// same load-time validation applied at config resolution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSuppressionRule`] only when a source-local
    /// rule fails to compile; a config-resolution bug, not an evaluation
    /// failure.
    pub fn evaluate(
        &self,
        item: &SuppressionInput<'_>,
        source_rules: &[SuppressionRuleSpec],
    ) -> Result<SuppressionVerdict> {
        if !self.enabled {
            return Ok(SuppressionVerdict {
                suppressed: false,
                primary_rule_id: None,
                matched_rule_ids: Vec::new(),
                primary_reason_code: None,
            });
        }

        let compiled_source = compile_list(source_rules)?;

        let mut matched: Vec<&CompiledRule> = Vec::new();
        for rule in self.global.iter().chain(compiled_source.iter()) {
            if rule.matches(item) {
                matched.push(rule);
            }
        }

        let primary = matched.first();
        Ok(SuppressionVerdict {
            suppressed: !matched.is_empty(),
            primary_rule_id: primary.map(|r| r.spec.id.clone()),
            matched_rule_ids: matched.iter().map(|r| r.spec.id.clone()).collect(),
            primary_reason_code: primary.map(|r| r.spec.reason_code().to_owned()),
        })
    }
}

fn compile_list(rules: &[SuppressionRuleSpec]) -> Result<Vec<CompiledRule>> {
    let mut seen = std::collections::BTreeSet::new();
    let mut compiled = Vec::with_capacity(rules.len());
    for spec in rules {
        if !seen.insert(spec.id.as_str()) {
            return Err(Error::InvalidSuppressionRule {
                rule_id: spec.id.clone(),
                message: "duplicate rule id".into(),
            });
        }
        compiled.push(CompiledRule::compile(spec)?);
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, kind: RuleKind, field: RuleField, pattern: &str) -> SuppressionRuleSpec {
        SuppressionRuleSpec {
            id: id.into(),
            enabled: true,
            kind,
            field,
            pattern: pattern.into(),
            case_sensitive: false,
            note: None,
            reason_code: None,
        }
    }

    fn registry(rules: Vec<SuppressionRuleSpec>) -> SuppressionRegistry {
        SuppressionRegistry {
            version: 1,
            enabled: true,
            rules,
        }
    }

    fn input<'a>(title: &'a str, raw_text: &'a str) -> SuppressionInput<'a> {
        SuppressionInput {
            title,
            summary: "",
            raw_text,
            url: None,
            event_type: "OTHER",
            source_id: "nws_active_us",
            tier: "global",
        }
    }

    #[test]
    fn keyword_any_matches_test_message() {
        let engine = SuppressionEngine::compile(&registry(vec![rule(
            "global_test_alerts",
            RuleKind::Keyword,
            RuleField::Any,
            "test",
        )]))
        .unwrap();

        let verdict = engine.evaluate(&input("Test Message", ""), &[]).unwrap();
        assert!(verdict.suppressed);
        assert_eq!(verdict.primary_rule_id.as_deref(), Some("global_test_alerts"));
        assert_eq!(verdict.primary_reason_code.as_deref(), Some("global_test_alerts"));
    }

    #[test]
    fn global_rules_precede_source_rules() {
        let engine = SuppressionEngine::compile(&registry(vec![rule(
            "global_noise",
            RuleKind::Keyword,
            RuleField::Title,
            "drill",
        )]))
        .unwrap();

        let source_rules = vec![rule("local_drills", RuleKind::Keyword, RuleField::Title, "drill")];
        let verdict = engine
            .evaluate(&input("Fire drill scheduled", ""), &source_rules)
            .unwrap();
        assert_eq!(verdict.matched_rule_ids, ["global_noise", "local_drills"]);
        assert_eq!(verdict.primary_rule_id.as_deref(), Some("global_noise"));
    }

    #[test]
    fn all_matches_collected_in_order() {
        let engine = SuppressionEngine::compile(&registry(vec![
            rule("r1", RuleKind::Keyword, RuleField::Title, "test"),
            rule("r2", RuleKind::Regex, RuleField::Title, "^Test"),
            rule("r3", RuleKind::Keyword, RuleField::Title, "nomatch"),
        ]))
        .unwrap();

        let verdict = engine.evaluate(&input("Test Message", ""), &[]).unwrap();
        assert_eq!(verdict.matched_rule_ids, ["r1", "r2"]);
    }

    #[test]
    fn bad_regex_fails_at_compile_not_evaluation() {
        let err = SuppressionEngine::compile(&registry(vec![rule(
            "broken",
            RuleKind::Regex,
            RuleField::Title,
            "[unclosed",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSuppressionRule { .. }));
    }

    #[test]
    fn duplicate_ids_fail_at_compile() {
        let err = SuppressionEngine::compile(&registry(vec![
            rule("dup", RuleKind::Keyword, RuleField::Title, "a"),
            rule("dup", RuleKind::Keyword, RuleField::Title, "b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSuppressionRule { .. }));
    }

    #[test]
    fn exact_match_respects_case_sensitivity() {
        let mut sensitive = rule("exact", RuleKind::Exact, RuleField::SourceId, "NWS");
        sensitive.case_sensitive = true;
        let engine = SuppressionEngine::compile(&registry(vec![sensitive])).unwrap();
        assert!(!engine.evaluate(&input("x", ""), &[]).unwrap().suppressed);

        let engine = SuppressionEngine::compile(&registry(vec![rule(
            "exact",
            RuleKind::Exact,
            RuleField::SourceId,
            "NWS_ACTIVE_US",
        )]))
        .unwrap();
        assert!(engine.evaluate(&input("x", ""), &[]).unwrap().suppressed);
    }

    #[test]
    fn any_probes_first_nonempty_field() {
        let engine = SuppressionEngine::compile(&registry(vec![rule(
            "any_rule",
            RuleKind::Keyword,
            RuleField::Any,
            "spill",
        )]))
        .unwrap();

        // Title is non-empty and does not match: raw_text is never probed.
        assert!(!engine
            .evaluate(&input("Road update", "chemical spill"), &[])
            .unwrap()
            .suppressed);
        // Empty title falls through to raw_text.
        assert!(engine
            .evaluate(&input("", "chemical spill"), &[])
            .unwrap()
            .suppressed);
    }

    #[test]
    fn disabled_registry_never_matches() {
        let mut reg = registry(vec![rule("r", RuleKind::Keyword, RuleField::Any, "test")]);
        reg.enabled = false;
        let engine = SuppressionEngine::compile(&reg).unwrap();
        assert!(!engine.evaluate(&input("Test", ""), &[]).unwrap().suppressed);
    }

    #[test]
    fn verdicts_are_deterministic() {
        let engine = SuppressionEngine::compile(&registry(vec![
            rule("r1", RuleKind::Keyword, RuleField::Any, "test"),
            rule("r2", RuleKind::Regex, RuleField::Any, "message"),
        ]))
        .unwrap();
        let a = engine.evaluate(&input("Test Message", ""), &[]).unwrap();
        let b = engine.evaluate(&input("Test Message", ""), &[]).unwrap();
        assert_eq!(a, b);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn verdict_is_deterministic_and_primary_is_first(
                patterns in prop::collection::vec("[a-z]{1,6}", 1..8),
                title in "[a-z ]{0,40}",
            ) {
                let rules: Vec<SuppressionRuleSpec> = patterns
                    .iter()
                    .enumerate()
                    .map(|(i, p)| rule(&format!("r{i}"), RuleKind::Keyword, RuleField::Title, p))
                    .collect();
                let engine = SuppressionEngine::compile(&registry(rules.clone()))
                    .unwrap_or_else(|e| panic!("compile failed: {e}"));

                let a = engine.evaluate(&input(&title, ""), &[]).unwrap();
                let b = engine.evaluate(&input(&title, ""), &[]).unwrap();
                prop_assert_eq!(&a, &b);

                // Matched ids appear in declared order, and the primary is
                // the first of them.
                let declared: Vec<String> = rules.iter().map(|r| r.id.clone()).collect();
                let mut last_index = 0usize;
                for id in &a.matched_rule_ids {
                    let index = declared.iter().position(|d| d == id)
                        .unwrap_or_else(|| panic!("matched unknown rule {id}"));
                    prop_assert!(index >= last_index);
                    last_index = index;
                }
                prop_assert_eq!(
                    a.primary_rule_id.as_ref(),
                    a.matched_rule_ids.first()
                );
            }
        }
    }

    #[test]
    fn stamp_carries_primary_rule_metadata() {
        let engine = SuppressionEngine::compile(&registry(vec![rule(
            "global_test_alerts",
            RuleKind::Keyword,
            RuleField::Any,
            "test",
        )]))
        .unwrap();
        let verdict = engine.evaluate(&input("Test Message", ""), &[]).unwrap();
        let stamp = verdict
            .stamp("2025-12-29T17:00:00Z".parse().unwrap(), "INGEST")
            .unwrap();
        assert_eq!(stamp.primary_rule_id, "global_test_alerts");
        assert_eq!(stamp.stage, "INGEST");
    }
}
