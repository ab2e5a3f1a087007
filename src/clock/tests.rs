use super::*;
use crate::classify::Classifier;
use crate::ingest::{ClockOffset, Stream, StreamHeader};

fn regular(id: u32, name: &str, rate: f64, start: f64, n: usize) -> Stream {
    let timestamps: Vec<f64> = (0..n).map(|i| start + i as f64 / rate).collect();
    let rows = vec![vec![0.0]; n];
    Stream::numeric(id, StreamHeader::new(name, "EEG", 1, rate), timestamps, rows)
}

fn run<'a>(
    streams: &'a [Stream],
    selector: &ReferenceSelector,
) -> Result<Reconciliation<'a>, ClockError> {
    reconcile(Classifier::default().classify_all(streams), selector)
}

#[test]
fn test_highest_rate_selected() {
    let streams = vec![
        regular(1, "slow", 100.0, 0.0, 10),
        regular(2, "fast", 500.0, 1.0, 10),
    ];
    let result = run(&streams, &ReferenceSelector::HighestRate).unwrap();
    assert_eq!(result.clock.stream_id, 2);
    assert_eq!(result.clock.start, 1.0);
}

#[test]
fn test_rate_tie_broken_by_earliest_start() {
    let streams = vec![
        regular(1, "late", 250.0, 5.0, 10),
        regular(2, "early", 250.0, 2.0, 10),
        regular(3, "also-early", 250.0, 2.0, 10),
    ];
    let result = run(&streams, &ReferenceSelector::HighestRate).unwrap();
    assert_eq!(result.clock.stream_id, 2);
}

#[test]
fn test_named_selector_by_name_and_id() {
    let streams = vec![
        regular(1, "slow", 100.0, 0.0, 10),
        regular(2, "fast", 500.0, 0.0, 10),
    ];
    let by_name = run(&streams, &"named:slow".parse().unwrap()).unwrap();
    assert_eq!(by_name.clock.stream_id, 1);
    let by_id = run(&streams, &"named:1".parse().unwrap()).unwrap();
    assert_eq!(by_id.clock.stream_id, 1);
}

#[test]
fn test_named_selector_missing_or_empty() {
    let streams = vec![regular(1, "amp", 100.0, 0.0, 10), regular(2, "dead", 100.0, 0.0, 0)];
    let missing = run(&streams, &ReferenceSelector::Named("nope".into())).unwrap_err();
    assert!(matches!(missing, ClockError::ReferenceNotFound(_)));
    let empty = run(&streams, &ReferenceSelector::Named("dead".into())).unwrap_err();
    assert!(matches!(empty, ClockError::EmptyReference(_)));
}

#[test]
fn test_empty_streams_skipped_and_no_candidate() {
    let streams = vec![regular(1, "a", 100.0, 0.0, 0)];
    let err = run(&streams, &ReferenceSelector::HighestRate).unwrap_err();
    assert!(matches!(err, ClockError::NoReferenceCandidate));

    let streams = vec![regular(1, "a", 100.0, 0.0, 0), regular(2, "b", 100.0, 0.0, 5)];
    let result = run(&streams, &ReferenceSelector::HighestRate).unwrap();
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].stream_id, 1);
    assert_eq!(result.streams.len(), 1);
}

#[test]
fn test_reference_clock_end_covers_last_sample() {
    let streams = vec![regular(1, "amp", 100.0, 0.0, 100)];
    let result = run(&streams, &ReferenceSelector::HighestRate).unwrap();
    let last = *streams[0].timestamps.last().unwrap();
    assert!(result.clock.end > last);
    assert!((result.clock.duration() - 1.0).abs() < 1e-9);
}

#[test]
fn test_reference_offsets_ignored_and_others_mapped() {
    let reference = regular(1, "amp", 500.0, 0.0, 10)
        .with_clock_offsets(vec![ClockOffset::new(0.0, 100.0)]);
    let other = regular(2, "imu", 100.0, 0.0, 10)
        .with_clock_offsets(vec![ClockOffset::new(0.0, 0.25), ClockOffset::new(1.0, 0.25)]);
    let streams = vec![reference, other];
    let result = run(&streams, &ReferenceSelector::HighestRate).unwrap();

    let aligned_ref = &result.streams[0];
    assert_eq!(aligned_ref.mapping.kind(), MappingKind::Reference);
    assert_eq!(aligned_ref.reference_times, streams[0].timestamps);

    let aligned_other = &result.streams[1];
    assert_eq!(aligned_other.mapping.kind(), MappingKind::Offsets);
    assert!((aligned_other.reference_times[0] - 0.25).abs() < 1e-12);
    assert!(aligned_other.warnings().is_empty());
}

#[test]
fn test_identity_fallback_is_a_warning() {
    let streams = vec![regular(1, "amp", 500.0, 0.0, 10), regular(2, "imu", 100.0, 0.0, 10)];
    let result = run(&streams, &ReferenceSelector::HighestRate).unwrap();
    let aligned = &result.streams[1];
    assert_eq!(aligned.mapping.kind(), MappingKind::IdentityFallback);
    assert!(!aligned.clock_unreliable());
    assert_eq!(aligned.warnings(), vec!["no clock offsets; identity mapping used".to_string()]);
}

#[test]
fn test_unreliable_clock_flagged() {
    let other = regular(2, "imu", 100.0, 0.0, 10).with_clock_offsets(vec![
        ClockOffset::new(0.0, 1.0),
        ClockOffset::new(1.0, -5.0),
    ]);
    let streams = vec![regular(1, "amp", 500.0, 0.0, 10), other];
    let result = run(&streams, &ReferenceSelector::HighestRate).unwrap();
    let aligned = &result.streams[1];
    assert!(aligned.clock_unreliable());
    assert!(aligned.warnings()[0].starts_with("clock unreliable"));
    assert!(aligned.monotonic);
}

#[test]
fn test_selector_parsing() {
    assert_eq!("highest-rate".parse::<ReferenceSelector>().unwrap(), ReferenceSelector::HighestRate);
    assert_eq!(
        "named:BioSemi".parse::<ReferenceSelector>().unwrap(),
        ReferenceSelector::Named("BioSemi".into())
    );
    assert!("named:".parse::<ReferenceSelector>().is_err());
    assert!("fastest".parse::<ReferenceSelector>().is_err());
    assert_eq!(ReferenceSelector::Named("3".into()).to_string(), "named:3");
}
