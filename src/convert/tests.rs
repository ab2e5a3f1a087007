use tempfile::tempdir;

use super::*;
use crate::bids::ConflictPolicy;
use crate::clock::ReferenceSelector;
use crate::config::SessionIdentifiers;
use crate::ingest::{Stream, StreamHeader};
use crate::segment::RunBoundarySource;

fn regular(id: u32, name: &str, kind: &str, rate: f64, n: usize) -> Stream {
    let timestamps = (0..n).map(|i| i as f64 / rate).collect();
    let rows = (0..n).map(|i| vec![i as f64]).collect();
    Stream::numeric(id, StreamHeader::new(name, kind, 1, rate), timestamps, rows)
}

fn config() -> ConversionConfig {
    ConversionConfig::new(SessionIdentifiers::new("01", "01", "sway"))
}

#[test]
fn test_zero_streams_give_empty_manifest() {
    let dir = tempdir().unwrap();
    let converter = Converter::new(config()).unwrap();
    let manifest = converter.convert(&DecodedSession::default(), dir.path()).unwrap();

    assert!(manifest.entries.is_empty());
    assert!(manifest.is_complete());
    assert!(manifest.written_paths().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_invalid_config_rejected() {
    let config = ConversionConfig::new(SessionIdentifiers::new("sub_01", "01", "x"));
    assert!(Converter::new(config).is_err());
}

#[test]
fn test_unsupported_stream_skipped_without_files() {
    let dir = tempdir().unwrap();
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 200),
        regular(2, "webcam", "Video", 30.0, 60),
    ]);
    let manifest = Converter::new(config()).unwrap().convert(&session, dir.path()).unwrap();

    let video = manifest.entry(2).unwrap();
    assert_eq!(video.outcome, Outcome::Skipped);
    assert!(video.output_paths.is_empty());
    assert!(video.reason.as_deref().unwrap().contains("unsupported"));

    let eeg = manifest.entry(1).unwrap();
    assert_eq!(eeg.outcome, Outcome::Written);
    assert_eq!(eeg.output_paths.len(), 3);
    assert!(manifest.is_complete());
}

#[test]
fn test_strict_mode_aborts_on_unsupported() {
    let dir = tempdir().unwrap();
    let mut config = config();
    config.strict_unsupported = true;
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 200),
        regular(2, "webcam", "Video", 30.0, 60),
    ]);
    let aborted = Converter::new(config).unwrap().convert(&session, dir.path()).unwrap_err();

    assert_eq!(aborted.stage, Stage::Classifying);
    assert!(matches!(
        aborted.reason,
        AbortReason::UnsupportedStreams { ref stream_ids } if stream_ids == &[2]
    ));
    assert_eq!(aborted.manifest.status, ConversionStatus::Aborted);
    assert!(aborted.manifest.entry(1).unwrap().reason.is_some());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_missing_named_reference_aborts() {
    let dir = tempdir().unwrap();
    let mut config = config();
    config.reference_stream_selector = ReferenceSelector::Named("Nope".into());
    let session = DecodedSession::new(vec![regular(1, "BioSemi", "EEG", 100.0, 200)]);
    let aborted = Converter::new(config).unwrap().convert(&session, dir.path()).unwrap_err();

    assert_eq!(aborted.stage, Stage::Reconciling);
    assert!(aborted.to_string().contains("Nope"));
}

#[test]
fn test_overlapping_boundaries_abort_session() {
    let dir = tempdir().unwrap();
    let mut config = config();
    config.run_boundary_source = RunBoundarySource::MarkerStream("Markers".into());
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 2000),
        Stream::markers(2, "Markers", [(5.0, "end:duration=3"), (6.0, "end:duration=3")]),
    ]);
    let aborted = Converter::new(config).unwrap().convert(&session, dir.path()).unwrap_err();
    assert_eq!(aborted.stage, Stage::Segmenting);
    assert_eq!(aborted.manifest.reference_stream.as_deref(), Some("BioSemi"));
}

#[test]
fn test_empty_stream_skipped_others_written() {
    let dir = tempdir().unwrap();
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 200),
        Stream::numeric(3, StreamHeader::new("wii", "Mocap", 1, 100.0), vec![], vec![]),
    ]);
    let manifest = Converter::new(config()).unwrap().convert(&session, dir.path()).unwrap();
    let empty = manifest.entry(3).unwrap();
    assert_eq!(empty.outcome, Outcome::Skipped);
    assert_eq!(empty.reason.as_deref(), Some("stream has no samples"));
    assert_eq!(manifest.entry(1).unwrap().outcome, Outcome::Written);
}

#[test]
fn test_only_empty_streams_is_not_an_abort() {
    let dir = tempdir().unwrap();
    let session = DecodedSession::new(vec![Stream::numeric(
        1,
        StreamHeader::new("BioSemi", "EEG", 1, 100.0),
        vec![],
        vec![],
    )]);
    let manifest = Converter::new(config()).unwrap().convert(&session, dir.path()).unwrap();
    assert_eq!(manifest.entry(1).unwrap().outcome, Outcome::Skipped);
    assert_eq!(manifest.warnings.len(), 1);
}

#[test]
fn test_contract_violation_skips_stream() {
    let dir = tempdir().unwrap();
    let mut broken = regular(2, "wii", "Mocap", 100.0, 10);
    broken.timestamps.pop();
    let session = DecodedSession::new(vec![regular(1, "BioSemi", "EEG", 100.0, 200), broken]);
    let manifest = Converter::new(config()).unwrap().convert(&session, dir.path()).unwrap();

    let entry = manifest.entry(2).unwrap();
    assert_eq!(entry.outcome, Outcome::Skipped);
    assert!(entry.reason.as_deref().unwrap().contains("timestamps"));
}

#[test]
fn test_duplicate_stream_id_skipped() {
    let dir = tempdir().unwrap();
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 200),
        regular(1, "wii", "Mocap", 100.0, 200),
    ]);
    let manifest = Converter::new(config()).unwrap().convert(&session, dir.path()).unwrap();
    assert_eq!(manifest.entries.len(), 2);
    assert_eq!(manifest.entries[1].outcome, Outcome::Skipped);
    assert!(manifest.entries[1].reason.as_deref().unwrap().contains("duplicate"));
}

#[test]
fn test_cancelled_before_start() {
    let dir = tempdir().unwrap();
    let session = DecodedSession::new(vec![regular(1, "BioSemi", "EEG", 100.0, 200)]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let manifest = Converter::new(config())
        .unwrap()
        .convert_with_cancel(&session, dir.path(), &cancel)
        .unwrap();

    assert_eq!(manifest.status, ConversionStatus::Cancelled);
    let entry = manifest.entry(1).unwrap();
    assert_eq!(entry.outcome, Outcome::Partial);
    assert_eq!(entry.reason.as_deref(), Some("cancelled"));
}

#[test]
fn test_empty_segments_skip_policy() {
    let dir = tempdir().unwrap();
    let mut config = config();
    config.run_boundary_source = RunBoundarySource::MarkerStream("Markers".into());
    config.empty_segments = EmptySegmentPolicy::Skip;
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 1000),
        regular(3, "wii", "Mocap", 50.0, 100),
        Stream::markers(2, "Markers", [(1.0, "a"), (4.0, "b")]),
    ]);
    let manifest = Converter::new(config).unwrap().convert(&session, dir.path()).unwrap();

    let wii = manifest.entry(3).unwrap();
    assert_eq!(wii.outcome, Outcome::Written);
    assert_eq!(wii.output_paths.len(), 3, "only the first run is written");
    assert!(wii.warnings.iter().any(|w| w.contains("no samples")));
}

#[test]
fn test_fail_policy_conflict_is_partial() {
    let dir = tempdir().unwrap();
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 200),
        regular(2, "wii", "Mocap", 100.0, 200),
    ]);
    let existing = dir
        .path()
        .join("sub-01/ses-01/motion/sub-01_ses-01_task-sway_run-01_motion.tsv");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, "old").unwrap();

    let mut config = config();
    config.conflict_policy = ConflictPolicy::Fail;
    let manifest = Converter::new(config).unwrap().convert(&session, dir.path()).unwrap();

    let motion = manifest.entry(2).unwrap();
    assert_eq!(motion.outcome, Outcome::Partial);
    assert!(motion.reason.as_deref().unwrap().contains("already exists"));
    assert_eq!(manifest.entry(1).unwrap().outcome, Outcome::Written);
    assert_eq!(manifest.status, ConversionStatus::Partial);
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "old");
}

#[test]
fn test_decode_failure_aborts_with_empty_manifest() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.json");
    std::fs::write(&input, "{ not json").unwrap();
    let aborted = Converter::new(config())
        .unwrap()
        .convert_file(&input, dir.path().join("out"), &CancelToken::new())
        .unwrap_err();
    assert_eq!(aborted.stage, Stage::Decoding);
    assert!(aborted.manifest.entries.is_empty());
}

#[test]
fn test_partially_written_segment_reports_committed_files() {
    let dir = tempdir().unwrap();
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 200),
        regular(2, "wii", "Mocap", 100.0, 200),
    ]);
    // the motion sidecar path is taken by a directory, so only the data file lands
    let blocked = dir
        .path()
        .join("sub-01/ses-01/motion/sub-01_ses-01_task-sway_run-01_motion.json");
    std::fs::create_dir_all(&blocked).unwrap();

    let mut config = config();
    config.conflict_policy = ConflictPolicy::Overwrite;
    let manifest = Converter::new(config).unwrap().convert(&session, dir.path()).unwrap();

    let motion = manifest.entry(2).unwrap();
    assert_eq!(motion.outcome, Outcome::Partial);
    assert_eq!(
        motion.output_paths,
        vec![std::path::PathBuf::from(
            "sub-01/ses-01/motion/sub-01_ses-01_task-sway_run-01_motion.tsv"
        )]
    );
    assert!(motion.reason.as_deref().unwrap().contains("after writing 1 file(s)"));
    assert_eq!(manifest.status, ConversionStatus::Partial);

    let scans = std::fs::read_to_string(dir.path().join("sub-01/ses-01/sub-01_ses-01_scans.tsv")).unwrap();
    assert!(scans.contains("motion/sub-01_ses-01_task-sway_run-01_motion.tsv"));
}

#[test]
fn test_progress_counts_skipped_segments() {
    let dir = tempdir().unwrap();
    let mut config = config();
    config.run_boundary_source = RunBoundarySource::MarkerStream("Markers".into());
    config.empty_segments = EmptySegmentPolicy::Skip;
    let session = DecodedSession::new(vec![
        regular(1, "BioSemi", "EEG", 100.0, 1000),
        regular(3, "wii", "Mocap", 50.0, 100),
        Stream::markers(2, "Markers", [(1.0, "a"), (4.0, "b")]),
    ]);

    let mut reported = Vec::new();
    let manifest = Converter::new(config)
        .unwrap()
        .convert_with_progress(&session, dir.path(), &CancelToken::new(), |p| reported.push(*p))
        .unwrap();

    let total = 3 * manifest.runs.len();
    assert_eq!(reported.len(), total);
    assert!(reported.iter().all(|p| p.total == total));
    assert_eq!(reported.last().unwrap().completed, total);
}
