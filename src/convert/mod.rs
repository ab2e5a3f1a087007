//! # Conversion Orchestrator
//!
//! [`Converter`] runs one decoded session through the pipeline:
//!
//! ```text
//! Classifying -> Reconciling -> Segmenting -> Writing -> Done
//! ```
//!
//! Per-stream and per-segment problems are folded into the
//! [`ConversionManifest`] and the remaining streams carry on. Only failures
//! that invalidate shared state (no reference clock, inconsistent run
//! boundaries, unsupported streams in strict mode, undecodable input) stop the
//! session; they are returned as [`ConversionAborted`] together with the
//! manifest built so far.
//!
//! A `Converter` holds nothing but its configuration. Every call owns its
//! working state, so one converter can serve many sessions, sequentially or
//! from several threads at once.
//!
//! # Example
//!
//! ```rust,no_run
//! use xdf2bids::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = DecodedSession::from_json_file("session.json")?;
//! let converter = Converter::new(ConversionConfig::default())?;
//! let manifest = converter.convert(&session, "bids_root")?;
//! println!("{}", manifest);
//! # Ok(())
//! # }
//! ```

mod cancel;
mod error;
mod progress;

#[cfg(test)]
mod tests;

pub use cancel::CancelToken;
pub use error::{AbortReason, ConversionAborted, Stage};
pub use progress::SegmentProgress;

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};

use crate::bids::{assign_acquisitions, BidsName, BidsWriter};
use crate::classify::{Classifier, Modality};
use crate::clock::{reconcile, AlignedStream, ReferenceClock};
use crate::config::{ConfigError, ConversionConfig, EmptySegmentPolicy};
use crate::ingest::DecodedSession;
use crate::manifest::{ConversionManifest, ConversionStatus, ManifestEntry, Outcome, RunSummary};
use crate::segment::{
    cut_segments, extract_events, pair_perturbations, plan_runs, Run, Segment, SegmentSkip,
};
use crate::sidecar::{perturbation_descriptor, synthesize, SidecarContext};

/// Converts decoded sessions into a BIDS tree.
#[derive(Debug, Clone)]
pub struct Converter {
    config: ConversionConfig,
    classifier: Classifier,
}

impl Converter {
    /// Validate the configuration and build a converter.
    pub fn new(config: ConversionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = Classifier::new(config.rule_table());
        Ok(Self { config, classifier })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Classifier in use.
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Convert one session into `root`.
    pub fn convert<P: AsRef<Path>>(
        &self,
        session: &DecodedSession,
        root: P,
    ) -> Result<ConversionManifest, ConversionAborted> {
        self.convert_with_cancel(session, root, &CancelToken::new())
    }

    /// Decode a session JSON file and convert it.
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        root: Q,
        cancel: &CancelToken,
    ) -> Result<ConversionManifest, ConversionAborted> {
        let session = DecodedSession::from_json_file(input.as_ref()).map_err(|e| {
            abort(
                Stage::Decoding,
                e.into(),
                ConversionManifest::new(&self.config.identifiers),
                &[],
            )
        })?;
        self.convert_with_cancel(&session, root, cancel)
    }

    /// Convert one session, checking `cancel` between segments.
    pub fn convert_with_cancel<P: AsRef<Path>>(
        &self,
        session: &DecodedSession,
        root: P,
        cancel: &CancelToken,
    ) -> Result<ConversionManifest, ConversionAborted> {
        self.convert_with_progress(session, root, cancel, |_| {})
    }

    /// Convert one session, reporting every finished segment to
    /// `progress_callback` and checking `cancel` between segments.
    pub fn convert_with_progress<P, F>(
        &self,
        session: &DecodedSession,
        root: P,
        cancel: &CancelToken,
        mut progress_callback: F,
    ) -> Result<ConversionManifest, ConversionAborted>
    where
        P: AsRef<Path>,
        F: FnMut(&SegmentProgress),
    {
        let ids = &self.config.identifiers;
        let mut manifest = ConversionManifest::new(ids);
        info!(
            "Converting {} stream(s) into sub-{} ses-{}",
            session.streams.len(),
            ids.participant,
            ids.session
        );

        // Classifying
        debug!("Stage: {}", Stage::Classifying);
        let mut seen = HashSet::new();
        let mut unsupported = Vec::new();
        let mut candidates = Vec::new();
        for classified in self.classifier.classify_all(&session.streams) {
            let mut entry = ManifestEntry::new(classified.stream, classified.modality);
            entry.rule = classified.rule.clone();
            if let Some(warning) = classified.ambiguity_warning() {
                entry.warn(warning);
            }

            let header = classified.header();
            if !seen.insert(classified.id()) {
                warn!("Stream id {} appears more than once; later copy skipped", classified.id());
                entry.skip(format!("duplicate stream id {}", classified.id()));
            } else if classified.is_unsupported() {
                info!(
                    "Stream {} ('{}', type '{}') is unsupported; skipped",
                    classified.id(),
                    header.name,
                    header.stream_type
                );
                entry.skip(format!(
                    "unsupported: no classification rule matched name '{}' type '{}'",
                    header.name, header.stream_type
                ));
                unsupported.push(classified.id());
            } else if let Err(e) = classified.stream.validate_contract() {
                warn!("{e}; skipped");
                entry.skip(e.to_string());
            } else {
                candidates.push(classified);
            }
            manifest.entries.push(entry);
        }

        let pending: Vec<u32> = candidates.iter().map(|c| c.id()).collect();
        if self.config.strict_unsupported && !unsupported.is_empty() {
            return Err(abort(
                Stage::Classifying,
                AbortReason::UnsupportedStreams {
                    stream_ids: unsupported,
                },
                manifest,
                &pending,
            ));
        }

        if candidates.iter().all(|c| c.stream.is_empty()) {
            for c in &candidates {
                if let Some(entry) = manifest.entry_mut(c.id()) {
                    entry.skip("stream has no samples");
                }
            }
            if !session.streams.is_empty() {
                manifest
                    .warnings
                    .push("no convertible stream has samples; nothing written".to_string());
            }
            info!("Nothing to convert");
            return Ok(manifest);
        }

        if cancel.is_cancelled() {
            return Ok(cancelled(manifest, &pending));
        }

        // Reconciling
        debug!("Stage: {}", Stage::Reconciling);
        let reconciliation = match reconcile(candidates, &self.config.reference_stream_selector) {
            Ok(r) => r,
            Err(e) => return Err(abort(Stage::Reconciling, e.into(), manifest, &pending)),
        };
        let clock = &reconciliation.clock;
        manifest.reference_stream = Some(clock.stream_name.clone());

        for skipped in &reconciliation.skipped {
            if let Some(entry) = manifest.entry_mut(skipped.stream_id) {
                entry.skip(skipped.reason.clone());
            }
        }
        for stream in &reconciliation.streams {
            if let Some(entry) = manifest.entry_mut(stream.id()) {
                entry.clock_unreliable = stream.clock_unreliable();
                for warning in stream.warnings() {
                    entry.warn(warning);
                }
            }
        }
        let pending: Vec<u32> = reconciliation.streams.iter().map(AlignedStream::id).collect();

        // Segmenting
        debug!("Stage: {}", Stage::Segmenting);
        let plan = match plan_runs(
            &reconciliation.streams,
            clock,
            &self.config.segmentation_policy(),
            &ids.task,
        ) {
            Ok(plan) => plan,
            Err(e) => return Err(abort(Stage::Segmenting, e.into(), manifest, &pending)),
        };
        manifest.warnings.extend(plan.warnings.iter().cloned());
        manifest.runs = plan
            .runs
            .iter()
            .map(|r| RunSummary {
                index: r.index,
                task: r.task.clone(),
                start: r.start,
                end: r.end,
            })
            .collect();
        let segmented = cut_all(&reconciliation.streams, &plan.runs);

        // Writing
        debug!("Stage: {}", Stage::Writing);
        let acquisitions = assign_acquisitions(
            &reconciliation
                .streams
                .iter()
                .map(|s| (s.id(), s.classified.header().name.as_str(), s.classified.modality))
                .collect::<Vec<_>>(),
        );
        let mut writer = BidsWriter::new(root, ids, self.config.conflict_policy);
        let mut was_cancelled = false;
        let mut progress = SegmentProgress {
            total: segmented
                .iter()
                .map(|s| s.as_ref().map_or(0, Vec::len))
                .sum(),
            ..SegmentProgress::default()
        };

        for (stream, segments) in reconciliation.streams.iter().zip(segmented) {
            let Some(entry) = manifest.entry_mut(stream.id()) else {
                continue;
            };
            if was_cancelled {
                entry.fail("cancelled");
                continue;
            }
            let segments = match segments {
                Ok(segments) => segments,
                Err(skip) => {
                    warn!("Stream {}: {skip}; skipped", stream.id());
                    entry.skip(skip.to_string());
                    continue;
                }
            };

            let perturbations = (stream.classified.modality == Modality::Events)
                .then(|| pair_perturbations(&extract_events(stream)));
            if let Some(table) = &perturbations {
                for warning in &table.warnings {
                    entry.warn(warning.clone());
                }
            }

            let acquisition = acquisitions.get(&stream.id()).cloned().flatten();
            for segment in &segments {
                if cancel.is_cancelled() {
                    info!("Conversion cancelled");
                    was_cancelled = true;
                    entry.fail("cancelled");
                    break;
                }
                let run = &plan.runs[segment.run];
                progress.stream_id = stream.id();
                progress.run_index = run.index;
                progress.completed += 1;

                if segment.is_empty() && self.config.empty_segments == EmptySegmentPolicy::Skip {
                    entry.warn(format!("run {} ({}): no samples; not written", run.index, run.task));
                    progress_callback(&progress);
                    continue;
                }

                let ctx = SidecarContext {
                    stream,
                    run,
                    clock,
                    time_origin: self.config.time_origin,
                    include_time_column: self.config.include_time_column,
                };
                let record = synthesize(segment, &ctx);
                for warning in &record.warnings {
                    if !entry.warnings.contains(warning) {
                        warn!("Stream {}: {warning}", stream.id());
                        entry.warn(warning.clone());
                    }
                }

                let name = BidsName::new(
                    ids,
                    run.task.clone(),
                    acquisition.clone(),
                    run.index,
                    stream.classified.modality,
                );
                let acq_time = acquisition_time(session.recorded_at, segment, run, clock);
                match writer.write_segment(&name, segment, &record, ctx.origin(), acq_time) {
                    Ok(paths) => entry.add_outputs(paths),
                    Err(e) => {
                        warn!("Stream {} run {} ({}): {e}", stream.id(), run.index, run.task);
                        entry.add_outputs(e.written_paths().to_vec());
                        entry.fail(format!("run {} ({}): {e}", run.index, run.task));
                    }
                }

                let in_run = perturbations
                    .as_ref()
                    .map(|table| table.within(run))
                    .unwrap_or_default();
                if !in_run.is_empty() {
                    let descriptor = perturbation_descriptor(self.config.time_origin);
                    match writer.write_perturbations(&name, &in_run, &descriptor, ctx.origin()) {
                        Ok(paths) => entry.add_outputs(paths),
                        Err(e) => {
                            warn!("Stream {} run {} perturbations: {e}", stream.id(), run.index);
                            entry.add_outputs(e.written_paths().to_vec());
                            entry.fail(format!("run {} ({}) perturbations: {e}", run.index, run.task));
                        }
                    }
                }
                progress_callback(&progress);
            }

            if entry.outcome == Outcome::Skipped && entry.reason.is_none() {
                entry.skip("no samples inside any run");
            }
        }

        let mut session_failed = false;
        if manifest.entries.iter().any(|e| !e.output_paths.is_empty()) {
            match writer.write_dataset_description(&self.config.dataset_name) {
                Ok(Some(path)) => manifest.session_outputs.push(path),
                Ok(None) => debug!("dataset_description.json already present"),
                Err(e) => {
                    warn!("dataset_description.json: {e}");
                    manifest.warnings.push(format!("dataset_description.json: {e}"));
                    session_failed = true;
                }
            }
            match writer.write_scans() {
                Ok(Some(path)) => manifest.session_outputs.push(path),
                Ok(None) => {}
                Err(e) => {
                    warn!("scans file: {e}");
                    manifest.warnings.push(format!("scans file: {e}"));
                    session_failed = true;
                }
            }
        }

        manifest.status = if was_cancelled {
            ConversionStatus::Cancelled
        } else if session_failed || manifest.count(Outcome::Partial) > 0 {
            ConversionStatus::Partial
        } else {
            ConversionStatus::Complete
        };
        info!(
            "Conversion {:?}: {} written, {} skipped, {} partial",
            manifest.status,
            manifest.count(Outcome::Written),
            manifest.count(Outcome::Skipped),
            manifest.count(Outcome::Partial)
        );
        Ok(manifest)
    }
}

fn cut_all(
    streams: &[AlignedStream<'_>],
    runs: &[Run],
) -> Vec<Result<Vec<Segment>, SegmentSkip>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        streams.par_iter().map(|s| cut_segments(s, runs)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        streams.iter().map(|s| cut_segments(s, runs)).collect()
    }
}

/// Wall-clock time of a segment's first sample.
fn acquisition_time(
    recorded_at: Option<DateTime<Utc>>,
    segment: &Segment,
    run: &Run,
    clock: &ReferenceClock,
) -> Option<DateTime<Utc>> {
    let start = recorded_at?;
    let first = segment.reference_times.first().copied().unwrap_or(run.start);
    let millis = ((first - clock.start) * 1000.0).round();
    // beyond ~30,000 years chrono cannot represent the offset
    if !millis.is_finite() || millis.abs() > 1e15 {
        return None;
    }
    start.checked_add_signed(Duration::milliseconds(millis as i64))
}

fn abort(
    stage: Stage,
    reason: AbortReason,
    mut manifest: ConversionManifest,
    pending: &[u32],
) -> ConversionAborted {
    error!("Conversion aborted while {stage}: {reason}");
    for &id in pending {
        if let Some(entry) = manifest.entry_mut(id) {
            if entry.outcome == Outcome::Skipped && entry.reason.is_none() {
                entry.skip(format!("conversion aborted while {stage}"));
            }
        }
    }
    manifest.status = ConversionStatus::Aborted;
    ConversionAborted {
        stage,
        reason,
        manifest,
    }
}

fn cancelled(mut manifest: ConversionManifest, pending: &[u32]) -> ConversionManifest {
    info!("Conversion cancelled");
    for &id in pending {
        if let Some(entry) = manifest.entry_mut(id) {
            entry.fail("cancelled");
        }
    }
    manifest.status = ConversionStatus::Cancelled;
    manifest
}
