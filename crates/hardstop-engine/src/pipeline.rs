//! The pipeline driver.
//!
//! A single-threaded cooperative chain: record fetch outcomes, then for
//! each source in registry order canonicalize → suppress → link → score →
//! correlate → build evidence, item by item in stable ingest order. Every
//! operator invocation finalizes exactly one RunRecord under the shared
//! run group; on success, failure, and cancellation alike. Fatal errors
//! halt the pipeline after the current record is finalized; anything else
//! is confined to its source and lands in that source's FAILURE row.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use hardstop_core::{
    ArtifactRef, DeterminismEnvelope, Diagnostic, Error, ExecutionMode, IdMinter, ResolvedConfig,
    ResolvedSource, Result, RunCost, RunGroupId, RunRecord, RunRecordBuilder, UtcTimestamp,
};
use hardstop_store::{
    Alert, AlertStore, EventStore, EvidenceStore, NetworkSnapshot, RawItem, RawItemStatus,
    RawItemStore, RunPhase, SourceRun, SourceRunStatus, SourceRunStore,
};

use crate::canonicalize::Canonicalizer;
use crate::correlator::{AlertCorrelator, CorrelationOutcome};
use crate::evidence::EvidenceBuilder;
use crate::fetch::FetchOutcome;
use crate::linker::NetworkLinker;
use crate::scorer::ImpactScorer;
use crate::suppression::{SuppressionEngine, SuppressionInput};

/// Cooperative cancellation, consulted between operators and between items.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The repositories a pipeline run writes to.
#[derive(Clone, Copy)]
pub struct PipelineStores<'a> {
    /// Raw-item store.
    pub raw_items: &'a dyn RawItemStore,
    /// Event store.
    pub events: &'a dyn EventStore,
    /// Alert store.
    pub alerts: &'a dyn AlertStore,
    /// Source-run telemetry store.
    pub source_runs: &'a dyn SourceRunStore,
    /// Incident-evidence store.
    pub evidence: &'a dyn EvidenceStore,
}

impl std::fmt::Debug for PipelineStores<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStores").finish_non_exhaustive()
    }
}

/// Per-source ingest counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceIngestCounts {
    /// Items pulled from the raw-item store.
    pub items_processed: u64,
    /// Items stamped suppressed.
    pub items_suppressed: u64,
    /// Events created.
    pub items_events_created: u64,
    /// Alerts created or updated.
    pub items_alerts_touched: u64,
}

/// What one pipeline run did.
#[derive(Debug)]
pub struct PipelineReport {
    /// The run group stitching all RunRecords together.
    pub run_group_id: RunGroupId,
    /// Every RunRecord emitted, in emission order.
    pub run_records: Vec<RunRecord>,
    /// Per-source ingest counters, keyed by source id.
    pub ingest_counts: BTreeMap<String, SourceIngestCounts>,
    /// Alerts touched during the run, in touch order.
    pub touched_alerts: Vec<Alert>,
}

/// The pipeline: operators wired in declared order.
#[derive(Debug)]
pub struct Pipeline<'a> {
    config: &'a ResolvedConfig,
    envelope: DeterminismEnvelope,
    mode: ExecutionMode,
    config_hash: String,
    cancellation: CancellationToken,
    no_suppress: bool,
}

impl<'a> Pipeline<'a> {
    /// Wires a pipeline against a resolved config and determinism envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the config cannot be
    /// fingerprinted.
    pub fn new(
        config: &'a ResolvedConfig,
        envelope: DeterminismEnvelope,
        mode: ExecutionMode,
        cancellation: CancellationToken,
    ) -> Result<Self> {
        let config_hash = config.fingerprint().map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        Ok(Self {
            config,
            envelope,
            mode,
            config_hash,
            cancellation,
            no_suppress: false,
        })
    }

    /// Keeps suppression evaluation (for diagnostics) but never stamps.
    #[must_use]
    pub fn with_no_suppress(mut self) -> Self {
        self.no_suppress = true;
        self
    }

    /// Runs the full chain: fetch recording, then ingest.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error ([`Error::is_fatal`]); per-source
    /// failures are confined to FAILURE SourceRun rows.
    pub fn run(
        &self,
        fetch_outcomes: &[FetchOutcome],
        network: &NetworkSnapshot,
        stores: &PipelineStores<'_>,
    ) -> Result<PipelineReport> {
        let mut minter = self.envelope.id_minter();
        // The run group is the pinned run id when there is one; live runs
        // get a fresh group id at the boundary.
        let run_group_id = self.envelope.run_id().map_or_else(
            || RunGroupId::new(uuid::Uuid::new_v4().to_string()),
            |run_id| RunGroupId::new(run_id.as_str()),
        );
        let span = hardstop_core::observability::pipeline_span(
            run_group_id.as_str(),
            self.envelope.mode().as_str(),
        );
        let _guard = span.enter();

        let mut report = PipelineReport {
            run_group_id: run_group_id.clone(),
            run_records: Vec::new(),
            ingest_counts: BTreeMap::new(),
            touched_alerts: Vec::new(),
        };

        self.record_fetch(fetch_outcomes, stores, &run_group_id, &mut minter, &mut report)?;
        self.ingest(network, stores, &run_group_id, &mut minter, &mut report)?;

        info!(
            run_group_id = %run_group_id,
            run_records = report.run_records.len(),
            alerts_touched = report.touched_alerts.len(),
            "pipeline run complete"
        );
        Ok(report)
    }

    fn check_cancelled(&self, builder: &mut Option<RunRecordBuilder>, report: &mut PipelineReport) -> Result<()> {
        if !self.cancellation.is_cancelled() {
            return Ok(());
        }
        if let Some(builder) = builder.take() {
            report.run_records.push(builder.finalize_with_error(
                self.envelope.now(),
                RunCost::default(),
                Diagnostic::new("cancelled", "pipeline cancelled"),
            ));
        }
        Err(Error::Cancelled)
    }

    fn begin_record(
        &self,
        operator_id: &str,
        run_group_id: &RunGroupId,
        minter: &mut IdMinter,
    ) -> RunRecordBuilder {
        RunRecordBuilder::begin(
            minter.run_id(),
            run_group_id.clone(),
            operator_id,
            self.mode,
            self.config_hash.clone(),
            self.envelope.now(),
        )
    }

    /// Persists fetched items (deduped) and one FETCH SourceRun per
    /// outcome, under a single `fetch.record@1.0.0` RunRecord.
    fn record_fetch(
        &self,
        outcomes: &[FetchOutcome],
        stores: &PipelineStores<'_>,
        run_group_id: &RunGroupId,
        minter: &mut IdMinter,
        report: &mut PipelineReport,
    ) -> Result<()> {
        let mut builder = Some(self.begin_record("fetch.record@1.0.0", run_group_id, minter));
        let now = self.envelope.now();

        for outcome in outcomes {
            self.check_cancelled(&mut builder, report)?;
            let Some(b) = builder.as_mut() else { break };

            let Some(source) = self.config.source(&outcome.source_id) else {
                b.warn(
                    Diagnostic::new("unknown_source", "fetch outcome for unconfigured source")
                        .with_detail("source_id", outcome.source_id.clone().into()),
                );
                continue;
            };

            let mut items_new = 0u64;
            if outcome.success {
                for fetched in &outcome.items {
                    let item = build_raw_item(fetched, source, now);
                    let artifact = item.artifact_ref()?;
                    let saved = stores.raw_items.save(item)?;
                    if saved.is_created() {
                        items_new += 1;
                        b.record_output(artifact);
                    } else {
                        debug!(source_id = %source.id, "duplicate raw item skipped");
                    }
                }
            }

            stores.source_runs.append(SourceRun {
                run_group_id: run_group_id.clone(),
                phase: RunPhase::Fetch,
                source_id: outcome.source_id.clone(),
                status: if outcome.success {
                    SourceRunStatus::Success
                } else {
                    SourceRunStatus::Failure
                },
                status_code: outcome.status_code,
                error: outcome.error.clone(),
                duration_ms: outcome.duration_ms,
                items_fetched: outcome.items.len() as u64,
                items_new,
                items_processed: 0,
                items_suppressed: 0,
                items_events_created: 0,
                items_alerts_touched: 0,
                bytes_downloaded: outcome.bytes_downloaded,
                diagnostics: BTreeMap::new(),
                run_at_utc: now,
            })?;
        }

        if let Some(b) = builder.take() {
            let cost = RunCost {
                duration_ms: 0,
                bytes_in: outcomes.iter().map(|o| o.bytes_downloaded).sum(),
                bytes_out: 0,
            };
            report.run_records.push(b.finalize(now, cost));
        }
        Ok(())
    }

    /// Ingests all NEW raw items, source by source in registry order.
    fn ingest(
        &self,
        network: &NetworkSnapshot,
        stores: &PipelineStores<'_>,
        run_group_id: &RunGroupId,
        minter: &mut IdMinter,
        report: &mut PipelineReport,
    ) -> Result<()> {
        let pending = stores.raw_items.list_for_ingest(None, false)?;
        let now = self.envelope.now();

        let suppression = SuppressionEngine::compile(&self.config.suppression)?;
        let canonicalizer = Canonicalizer::new();
        let linker = NetworkLinker::new(
            self.config.runtime.max_shipments,
            self.config.runtime.eta_horizon_days,
        );
        let scorer = ImpactScorer::new(self.config.runtime.scoring.clone());
        let correlator = AlertCorrelator::new(self.config.runtime.correlation_window_days);
        let evidence_builder = EvidenceBuilder::new();

        for source in self.config.enabled_sources() {
            let mut no_builder = None;
            self.check_cancelled(&mut no_builder, report)?;

            // Sources with nothing pending still get an INGEST row so
            // telemetry stays complete per (phase, source, run_group).
            let items: Vec<&RawItem> = pending
                .iter()
                .filter(|i| i.source_id == source.id)
                .collect();

            let result = self.ingest_source(
                source,
                &items,
                network,
                stores,
                run_group_id,
                minter,
                report,
                &suppression,
                &canonicalizer,
                &linker,
                &scorer,
                &correlator,
                &evidence_builder,
            );

            let (status, error, counts) = match result {
                Ok(counts) => (SourceRunStatus::Success, None, counts),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(source_id = %source.id, error = %e, "source ingest failed");
                    (
                        SourceRunStatus::Failure,
                        Some(e.to_string()),
                        report
                            .ingest_counts
                            .get(&source.id)
                            .copied()
                            .unwrap_or_default(),
                    )
                }
            };

            report.ingest_counts.insert(source.id.clone(), counts);
            stores.source_runs.append(SourceRun {
                run_group_id: run_group_id.clone(),
                phase: RunPhase::Ingest,
                source_id: source.id.clone(),
                status,
                status_code: None,
                error,
                duration_ms: 0,
                items_fetched: 0,
                items_new: 0,
                items_processed: counts.items_processed,
                items_suppressed: counts.items_suppressed,
                items_events_created: counts.items_events_created,
                items_alerts_touched: counts.items_alerts_touched,
                bytes_downloaded: 0,
                diagnostics: BTreeMap::new(),
                run_at_utc: now,
            })?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn ingest_source(
        &self,
        source: &ResolvedSource,
        items: &[&RawItem],
        network: &NetworkSnapshot,
        stores: &PipelineStores<'_>,
        run_group_id: &RunGroupId,
        minter: &mut IdMinter,
        report: &mut PipelineReport,
        suppression: &SuppressionEngine,
        canonicalizer: &Canonicalizer,
        linker: &NetworkLinker,
        scorer: &ImpactScorer,
        correlator: &AlertCorrelator,
        evidence_builder: &EvidenceBuilder,
    ) -> Result<SourceIngestCounts> {
        let now = self.envelope.now();
        let mut counts = SourceIngestCounts::default();

        for item in items {
            let mut builder = Some(self.begin_record(
                crate::canonicalize::OPERATOR_ID,
                run_group_id,
                minter,
            ));
            self.check_cancelled(&mut builder, report)?;
            let Some(mut record) = builder.take() else {
                return Err(Error::Cancelled);
            };
            counts.items_processed += 1;

            record.record_input(item.artifact_ref()?);

            // Canonicalize.
            let (mut event, warnings) = canonicalizer.normalize(item, source);
            for warning in warnings {
                record.warn(warning);
            }

            // Suppress: evaluation always runs; the stamp is skipped under
            // --no-suppress.
            let verdict = suppression.evaluate(
                &SuppressionInput {
                    title: &item.title,
                    summary: &item.summary,
                    raw_text: &item.raw_text,
                    url: item.url.as_deref(),
                    event_type: event.event_type.as_str(),
                    source_id: &source.id,
                    tier: source.tier.as_str(),
                },
                &source.suppress,
            )?;
            if verdict.suppressed && !self.no_suppress {
                if let Some(stamp) = verdict.stamp(now, "INGEST") {
                    stores.raw_items.mark_suppressed(&item.raw_item_id, stamp.clone())?;
                    event.suppression = Some(stamp);
                    counts.items_suppressed += 1;
                }
            } else if verdict.suppressed {
                record.warn(
                    Diagnostic::new("suppression_skipped", "matched rules but --no-suppress active")
                        .with_detail(
                            "matched_rule_ids",
                            serde_json::to_value(&verdict.matched_rule_ids)
                                .unwrap_or(serde_json::Value::Null),
                        ),
                );
            }

            // Link.
            let link = linker.link(&event, network, now);
            for warning in &link.warnings {
                record.warn(warning.clone());
            }
            link.apply_to(&mut event);

            // Persist the event (idempotent re-ingest never duplicates).
            if stores.events.contains(&event.event_id)? {
                record.warn(
                    Diagnostic::new("event_exists", "raw item already normalized")
                        .with_detail("event_id", event.event_id.to_string().into()),
                );
            } else {
                stores.events.insert(event.clone())?;
                counts.items_events_created += 1;
            }
            record.record_output(event.artifact_ref()?);

            // Score.
            let impact = scorer.score(&event, network, source, now);
            for warning in &impact.warnings {
                record.warn(warning.clone());
            }

            // Correlate.
            let outcome = match correlator.correlate(
                &event, &impact, &link, source, stores.alerts, linker, network, minter, now,
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    stores
                        .raw_items
                        .mark_status(&item.raw_item_id, RawItemStatus::Failed)?;
                    report.run_records.push(record.finalize_with_error(
                        now,
                        RunCost::default(),
                        Diagnostic::new("correlation_failed", e.to_string()),
                    ));
                    return Err(e);
                }
            };

            // Evidence.
            if let Some(artifact) = evidence_builder.build(&outcome, &event, &self.envelope)? {
                if let Some(alert) = outcome.alert() {
                    let mut updated = alert.clone();
                    updated.evidence.incident_artifact_hash = Some(artifact.artifact_hash.clone());
                    stores.alerts.update(updated.clone())?;
                    record.record_output(ArtifactRef::new(
                        artifact.artifact_id.clone(),
                        "IncidentEvidence",
                        artifact.artifact_hash.clone(),
                    ));
                    counts.items_alerts_touched += 1;
                    report.touched_alerts.push(updated);
                }
                stores.evidence.append(artifact)?;
            }

            stores
                .raw_items
                .mark_status(&item.raw_item_id, RawItemStatus::Normalized)?;
            report.run_records.push(record.finalize(now, RunCost::default()));
        }

        Ok(counts)
    }
}

fn build_raw_item(
    fetched: &crate::fetch::FetchedItem,
    source: &ResolvedSource,
    now: UtcTimestamp,
) -> RawItem {
    let content_hash = hardstop_core::hash::content_hash(
        &dedupe_payload_bytes(fetched),
    );
    RawItem {
        raw_item_id: hardstop_core::RawItemId::derive(now, &content_hash),
        source_id: source.id.clone(),
        canonical_id: fetched.canonical_id.clone(),
        content_hash,
        title: fetched.title.clone(),
        summary: fetched.summary.clone(),
        raw_text: fetched.raw_text.clone(),
        url: fetched.url.clone(),
        published_at_utc: fetched.published_at_utc,
        fetched_at_utc: now,
        status: RawItemStatus::New,
        suppression: None,
        trust_tier: source.trust_tier,
        tier: source.tier,
        payload: fetched.payload.clone(),
    }
}

/// The stable byte view hashed for dedupe: canonical id, title, url, and
/// the content fields of the payload, never timestamps.
fn dedupe_payload_bytes(fetched: &crate::fetch::FetchedItem) -> Vec<u8> {
    let mut stable = BTreeMap::new();
    stable.insert("canonical_id", fetched.canonical_id.clone());
    stable.insert("title", Some(fetched.title.clone()));
    stable.insert("url", fetched.url.clone());
    stable.insert(
        "raw_text",
        Some(fetched.raw_text.clone()).filter(|t| !t.is_empty()),
    );
    hardstop_core::canonical_json::to_canonical_bytes(&stable).unwrap_or_default()
}
