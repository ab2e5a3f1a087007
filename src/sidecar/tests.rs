use super::*;
use crate::classify::Classifier;
use crate::clock::{reconcile, ReferenceSelector};
use crate::ingest::{ChannelInfo, Stream, StreamHeader};
use crate::segment::{cut_segments, plan_runs, SegmentationPolicy};

fn labels(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_duplicate_labels_get_suffixes() {
    let (unique, warnings) = disambiguate_labels(labels(&["EEG1", "EEG1", "EEG2"]));
    assert_eq!(unique, labels(&["EEG1", "EEG1-1", "EEG2"]));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("EEG1-1"));
}

#[test]
fn test_suffix_skips_existing_labels() {
    let (unique, _) = disambiguate_labels(labels(&["A", "A", "A-1"]));
    assert_eq!(unique, labels(&["A", "A-2", "A-1"]));
}

#[test]
fn test_unique_labels_untouched() {
    let (unique, warnings) = disambiguate_labels(labels(&["x", "y", "z"]));
    assert_eq!(unique, labels(&["x", "y", "z"]));
    assert!(warnings.is_empty());
}

#[test]
fn test_missing_labels_fall_back_to_channel_index() {
    let header = StreamHeader::new("amp", "EEG", 3, 100.0).with_labels(["Fz", "", "Cz"]);
    let (resolved, warnings) = resolve_labels(&header, true);
    assert_eq!(resolved, labels(&["Fz", "Channel_2", "Cz"]));
    assert!(warnings.is_empty());

    let bare = StreamHeader::new("amp", "EEG", 2, 100.0);
    let (resolved, _) = resolve_labels(&bare, true);
    assert_eq!(resolved, labels(&["Channel_1", "Channel_2"]));
}

#[test]
fn test_time_channel_renamed_only_with_time_column() {
    let header = StreamHeader::new("wii", "Mocap", 2, 100.0).with_labels(["time", "x"]);
    let (with_time, warnings) = resolve_labels(&header, true);
    assert_eq!(with_time, labels(&["trial_time", "x"]));
    assert_eq!(warnings.len(), 1);

    let (without_time, warnings) = resolve_labels(&header, false);
    assert_eq!(without_time, labels(&["time", "x"]));
    assert!(warnings.is_empty());
}

#[test]
fn test_channel_rows_types_and_units() {
    let mut header = StreamHeader::new("amp", "EEG", 2, 250.0).with_unit("microvolts");
    header.channels = vec![
        ChannelInfo {
            label: Some("Fz".into()),
            unit: None,
            channel_type: None,
        },
        ChannelInfo {
            label: Some("HEOG".into()),
            unit: Some("mV".into()),
            channel_type: Some("eog".into()),
        },
    ];
    let rows = channel_rows(&header, Modality::Eeg, &labels(&["Fz", "HEOG"]));
    assert_eq!(rows[0].channel_type, "EEG");
    assert_eq!(rows[0].units, "microvolts");
    assert_eq!(rows[1].channel_type, "EOG");
    assert_eq!(rows[1].units, "mV");
    assert_eq!(rows[0].sampling_frequency, Some(250.0));
}

#[test]
fn test_effective_rate() {
    assert_eq!(effective_rate(&[]), None);
    assert_eq!(effective_rate(&[1.0]), None);
    assert_eq!(effective_rate(&[1.0, 1.0]), None);
    assert_eq!(effective_rate(&[0.0, 0.5, 1.0]), Some(2.0));
}

#[test]
fn test_descriptor_reports_effective_rate_and_columns() {
    // nominal 100 Hz, actually delivered at 90 Hz
    let timestamps: Vec<f64> = (0..91).map(|i| i as f64 / 90.0).collect();
    let rows = (0..91).map(|i| vec![i as f64, 0.0]).collect();
    let header = StreamHeader::new("amp", "EEG", 2, 100.0).with_labels(["C3", "C4"]);
    let streams = vec![Stream::numeric(4, header, timestamps, rows)];

    let aligned = reconcile(Classifier::default().classify_all(&streams), &ReferenceSelector::HighestRate).unwrap();
    let plan = plan_runs(&aligned.streams, &aligned.clock, &SegmentationPolicy::default(), "rest").unwrap();
    let segments = cut_segments(&aligned.streams[0], &plan.runs).unwrap();

    let ctx = SidecarContext {
        stream: &aligned.streams[0],
        run: &plan.runs[0],
        clock: &aligned.clock,
        time_origin: TimeOrigin::RunStart,
        include_time_column: true,
    };
    let record = synthesize(&segments[0], &ctx);

    assert_eq!(record.columns, labels(&["time", "C3", "C4"]));
    assert_eq!(record.channels.len(), 2);
    let Descriptor::Data(descriptor) = &record.descriptor else {
        panic!("expected data descriptor");
    };
    let rate = descriptor.sampling_frequency.unwrap();
    assert!((rate - 90.0).abs() < 1e-6);
    assert_eq!(descriptor.nominal_sampling_frequency, Some(100.0));
    assert_eq!(descriptor.sample_count, 91);
    assert_eq!(descriptor.start_time, Some(0.0));
    assert_eq!(descriptor.task_name, "rest");
    assert!(descriptor.clock_reliable);
    let time_column = descriptor.time_column.as_ref().unwrap();
    assert!(time_column.description.contains(TimeOrigin::RunStart.description()));
    assert_eq!(time_column.units.as_deref(), Some("s"));

    let json = serde_json::to_value(&record.descriptor).unwrap();
    assert_eq!(json["StreamId"], 4);
    assert_eq!(json["Modality"], "eeg");
    assert!(json.get("SourceId").is_none());
}

#[test]
fn test_single_sample_segment_has_null_rate() {
    let header = StreamHeader::new("amp", "EEG", 1, 100.0);
    let streams = vec![Stream::numeric(1, header, vec![3.0], vec![vec![1.0]])];
    let aligned = reconcile(Classifier::default().classify_all(&streams), &ReferenceSelector::HighestRate).unwrap();
    let plan = plan_runs(&aligned.streams, &aligned.clock, &SegmentationPolicy::default(), "t").unwrap();
    let segments = cut_segments(&aligned.streams[0], &plan.runs).unwrap();

    let ctx = SidecarContext {
        stream: &aligned.streams[0],
        run: &plan.runs[0],
        clock: &aligned.clock,
        time_origin: TimeOrigin::Absolute,
        include_time_column: false,
    };
    let record = synthesize(&segments[0], &ctx);
    let json = serde_json::to_value(&record.descriptor).unwrap();
    assert!(json["SamplingFrequency"].is_null());
    assert_eq!(json["StartTime"], 3.0);
    assert!(json.get("TimeColumn").is_none());
    assert_eq!(record.columns, labels(&["Channel_1"]));
}

#[test]
fn test_events_descriptor_lists_marker_fields() {
    let streams = vec![
        Stream::numeric(
            1,
            StreamHeader::new("amp", "EEG", 1, 10.0),
            (0..100).map(|i| i as f64 / 10.0).collect(),
            (0..100).map(|_| vec![0.0]).collect(),
        ),
        Stream::markers(2, "Markers", [(1.0, "TRIAL_END:1:time=4.5:duration=3"), (2.0, "beep")]),
    ];
    let aligned = reconcile(Classifier::default().classify_all(&streams), &ReferenceSelector::HighestRate).unwrap();
    let plan = plan_runs(&aligned.streams, &aligned.clock, &SegmentationPolicy::default(), "t").unwrap();
    let markers = aligned.streams.iter().find(|s| s.id() == 2).unwrap();
    let segments = cut_segments(markers, &plan.runs).unwrap();

    let ctx = SidecarContext {
        stream: markers,
        run: &plan.runs[0],
        clock: &aligned.clock,
        time_origin: TimeOrigin::RunStart,
        include_time_column: true,
    };
    let record = synthesize(&segments[0], &ctx);
    assert_eq!(record.columns, labels(&["onset", "duration", "label", "value", "time"]));
    assert!(record.channels.is_empty());

    let Descriptor::Events(columns) = &record.descriptor else {
        panic!("expected events descriptor");
    };
    assert_eq!(columns["onset"].units.as_deref(), Some("s"));
    assert!(columns["onset"]
        .description
        .contains("relative to the start of the run"));
    assert!(columns.contains_key("time"));
}

#[test]
fn test_meta_descriptor_orders_trial_columns() {
    let streams = vec![
        Stream::numeric(
            1,
            StreamHeader::new("amp", "EEG", 1, 10.0),
            (0..100).map(|i| i as f64 / 10.0).collect(),
            (0..100).map(|_| vec![0.0]).collect(),
        ),
        Stream::markers(
            2,
            "trial_meta",
            [
                (1.0, "trial_type=walking:trial_name=walk_1:duration=30"),
                (1.0004, "trial_type=walking:trial_name=walk_1:duration=30"),
                (5.0, "trial_name=stand_1:has_perturbations=true:block=2"),
            ],
        ),
    ];
    let aligned = reconcile(Classifier::default().classify_all(&streams), &ReferenceSelector::HighestRate).unwrap();
    let plan = plan_runs(&aligned.streams, &aligned.clock, &SegmentationPolicy::default(), "t").unwrap();
    let meta = aligned.streams.iter().find(|s| s.id() == 2).unwrap();
    assert_eq!(meta.classified.modality, Modality::Meta);
    let segments = cut_segments(meta, &plan.runs).unwrap();
    assert_eq!(segments[0].sample_count(), 2);

    let ctx = SidecarContext {
        stream: meta,
        run: &plan.runs[0],
        clock: &aligned.clock,
        time_origin: TimeOrigin::SessionStart,
        include_time_column: true,
    };
    let record = synthesize(&segments[0], &ctx);
    assert_eq!(
        record.columns,
        labels(&["onset", "duration", "trial_name", "trial_type", "has_perturbations", "block"])
    );
    let Descriptor::Events(columns) = &record.descriptor else {
        panic!("expected events descriptor");
    };
    assert!(columns["onset"]
        .description
        .contains(TimeOrigin::SessionStart.description()));
    assert_eq!(columns["block"].description, "Trial field 'block'");
}

#[test]
fn test_perturbation_descriptor_covers_every_column() {
    let Descriptor::Events(columns) = perturbation_descriptor(TimeOrigin::Absolute) else {
        panic!("expected events descriptor");
    };
    for column in PERTURBATION_COLUMNS {
        assert!(columns.contains_key(column), "{column}");
    }
    assert!(columns["onset"]
        .description
        .contains(TimeOrigin::Absolute.description()));
}
