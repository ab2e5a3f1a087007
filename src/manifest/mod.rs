//! Conversion manifest.
//!
//! One [`ManifestEntry`] per input stream records what was written for it, or
//! why nothing was. Session-level facts (reference stream, planned runs,
//! dataset-level files, session warnings) sit beside the entries. The
//! orchestrator builds the manifest incrementally and hands it to the caller
//! by value when the conversion ends.

mod report;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::Modality;
use crate::config::SessionIdentifiers;
use crate::ingest::Stream;

/// Errors exporting a manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error serializing JSON
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What happened to one input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every segment that should be written was written
    Written,
    /// Nothing was written; see the reason
    Skipped,
    /// Some segments failed or were never attempted
    Partial,
}

/// Final state of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    /// Every stream reached a final outcome without failures
    Complete,
    /// At least one stream ended partial
    Partial,
    /// The caller cancelled between segments
    Cancelled,
    /// A whole-session failure stopped the conversion
    Aborted,
}

/// Manifest record for one input stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Input stream id
    pub stream_id: u32,
    /// Header name
    pub stream_name: String,
    /// Header type
    pub stream_type: String,
    /// Assigned modality
    pub modality: Modality,
    /// Rule that assigned the modality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Outcome
    pub outcome: Outcome,
    /// Written paths, relative to the dataset root
    pub output_paths: Vec<PathBuf>,
    /// Why the stream was skipped or is partial
    pub reason: Option<String>,
    /// Mapping was clamped after clock-offset regressions
    #[serde(default)]
    pub clock_unreliable: bool,
    /// Non-fatal caveats
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ManifestEntry {
    /// Entry for a stream with no outputs yet.
    pub fn new(stream: &Stream, modality: Modality) -> Self {
        Self {
            stream_id: stream.id,
            stream_name: stream.header.name.clone(),
            stream_type: stream.header.stream_type.clone(),
            modality,
            rule: None,
            outcome: Outcome::Skipped,
            output_paths: Vec::new(),
            reason: None,
            clock_unreliable: false,
            warnings: Vec::new(),
        }
    }

    /// Mark skipped with a reason.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.outcome = Outcome::Skipped;
        self.reason = Some(reason.into());
    }

    /// Record written files.
    pub fn add_outputs(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        let before = self.output_paths.len();
        self.output_paths.extend(paths);
        if self.output_paths.len() > before && self.outcome == Outcome::Skipped {
            self.outcome = Outcome::Written;
            self.reason = None;
        }
    }

    /// Record a failure; the entry becomes partial.
    ///
    /// Reasons accumulate in order, separated by `; `.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.reason = match (self.outcome, self.reason.take()) {
            (Outcome::Partial, Some(existing)) => Some(format!("{existing}; {reason}")),
            _ => Some(reason),
        };
        self.outcome = Outcome::Partial;
    }

    /// Add a warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Summary of one planned run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run index within its task
    pub index: usize,
    /// Task label
    pub task: String,
    /// Reference-clock start (seconds)
    pub start: f64,
    /// Reference-clock end (seconds)
    pub end: f64,
}

/// Record of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionManifest {
    /// Name and version of the converter
    pub converter: String,
    /// `sub-` label
    pub participant: String,
    /// `ses-` label
    pub session: String,
    /// Final state
    pub status: ConversionStatus,
    /// Name of the reference stream, once selected
    pub reference_stream: Option<String>,
    /// Planned runs
    pub runs: Vec<RunSummary>,
    /// One entry per input stream, in input order
    pub entries: Vec<ManifestEntry>,
    /// Dataset and session level files written
    pub session_outputs: Vec<PathBuf>,
    /// Session-level caveats
    pub warnings: Vec<String>,
}

impl ConversionManifest {
    /// Empty manifest for a session.
    pub fn new(identifiers: &SessionIdentifiers) -> Self {
        Self {
            converter: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            participant: identifiers.participant.clone(),
            session: identifiers.session.clone(),
            status: ConversionStatus::Complete,
            reference_stream: None,
            runs: Vec::new(),
            entries: Vec::new(),
            session_outputs: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Entry for a stream id.
    pub fn entry(&self, stream_id: u32) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.stream_id == stream_id)
    }

    /// Mutable entry for a stream id.
    pub fn entry_mut(&mut self, stream_id: u32) -> Option<&mut ManifestEntry> {
        self.entries.iter_mut().find(|e| e.stream_id == stream_id)
    }

    /// Number of entries with the given outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    /// Every written path, session files first.
    pub fn written_paths(&self) -> Vec<&Path> {
        self.session_outputs
            .iter()
            .chain(self.entries.iter().flat_map(|e| e.output_paths.iter()))
            .map(PathBuf::as_path)
            .collect()
    }

    /// True when nothing failed and nothing was left unattempted.
    pub fn is_complete(&self) -> bool {
        self.status == ConversionStatus::Complete
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty JSON to `path`.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ManifestError> {
        let mut json = self.to_json()?;
        json.push('\n');
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::StreamHeader;

    fn entry() -> ManifestEntry {
        let stream = Stream::numeric(7, StreamHeader::new("amp", "EEG", 1, 100.0), vec![], vec![]);
        ManifestEntry::new(&stream, Modality::Eeg)
    }

    #[test]
    fn test_outputs_turn_entry_written() {
        let mut e = entry();
        assert_eq!(e.outcome, Outcome::Skipped);
        e.add_outputs([PathBuf::from("a.tsv")]);
        assert_eq!(e.outcome, Outcome::Written);
        assert!(e.reason.is_none());
    }

    #[test]
    fn test_no_outputs_keep_skip_reason() {
        let mut e = entry();
        e.skip("stream has no samples");
        e.add_outputs(Vec::new());
        assert_eq!(e.outcome, Outcome::Skipped);
        assert_eq!(e.reason.as_deref(), Some("stream has no samples"));
    }

    #[test]
    fn test_failure_is_sticky_and_reasons_accumulate() {
        let mut e = entry();
        e.add_outputs([PathBuf::from("a.tsv")]);
        e.fail("run 2: output already exists");
        e.add_outputs([PathBuf::from("b.tsv")]);
        e.fail("cancelled");
        assert_eq!(e.outcome, Outcome::Partial);
        assert_eq!(e.reason.as_deref(), Some("run 2: output already exists; cancelled"));
        assert_eq!(e.output_paths.len(), 2);
    }

    #[test]
    fn test_manifest_json_shape() {
        let mut manifest = ConversionManifest::new(&SessionIdentifiers::default());
        let mut e = entry();
        e.skip("no rule matched");
        manifest.entries.push(e);

        let json: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "complete");
        assert_eq!(json["entries"][0]["stream_id"], 7);
        assert_eq!(json["entries"][0]["outcome"], "skipped");
        assert_eq!(json["entries"][0]["reason"], "no rule matched");
        assert!(json["entries"][0]["output_paths"].as_array().unwrap().is_empty());
        assert_eq!(manifest.count(Outcome::Skipped), 1);
    }

    #[test]
    fn test_manifest_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = ConversionManifest::new(&SessionIdentifiers::default());
        manifest.entries.push(entry());
        manifest.session_outputs.push(PathBuf::from("dataset_description.json"));
        let path = dir.path().join("manifest.json");
        manifest.write_json(&path).unwrap();

        let back: ConversionManifest =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.written_paths(), vec![Path::new("dataset_description.json")]);
    }
}
