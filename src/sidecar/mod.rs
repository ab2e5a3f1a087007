//! # Metadata Synthesizer
//!
//! Builds the BIDS sidecar content for one [`Segment`]: the channel table, the
//! column list of the data file, and the JSON descriptor. The descriptor's
//! `SamplingFrequency` is the rate observed in the segment, not the nominal
//! header rate; the nominal rate is kept alongside it.

mod channels;

#[cfg(test)]
mod tests;

pub use channels::{
    channel_rows, disambiguate_labels, resolve_labels, ChannelRow, RENAMED_TIME_CHANNEL,
    TIME_COLUMN,
};

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::classify::Modality;
use crate::clock::{AlignedStream, MappingKind, ReferenceClock};
use crate::config::TimeOrigin;
use crate::segment::{meta_columns, MarkerEvent, Run, Segment, SegmentData};

/// JSON sidecar of a continuous data file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataDescriptor {
    /// BIDS task label
    pub task_name: String,
    /// Assigned modality
    pub modality: Modality,
    /// Rate observed in the segment (Hz)
    pub sampling_frequency: Option<f64>,
    /// Rate declared by the outlet (Hz)
    pub nominal_sampling_frequency: Option<f64>,
    /// Number of samples written
    pub sample_count: usize,
    /// Number of data channels
    pub channel_count: usize,
    /// First-to-last sample span (seconds)
    pub recording_duration: f64,
    /// First sample time in the file's time origin
    pub start_time: Option<f64>,
    /// Time origin of the `time` column
    pub time_origin: String,
    /// The `time` column, when data files carry one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_column: Option<ColumnDescription>,
    /// Run window on the reference clock
    pub run_window: [f64; 2],
    /// Source outlet name
    pub stream_name: String,
    /// Source outlet content type
    pub stream_type: String,
    /// Source stream id
    pub stream_id: u32,
    /// Outlet source identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// How timestamps reached the reference clock
    pub clock_synchronization: String,
    /// False when clock-offset regressions were clamped
    pub clock_reliable: bool,
    /// Name of the reference stream
    pub reference_stream: String,
    /// Data file header, in order
    pub columns: Vec<String>,
}

/// Description of one events-file column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnDescription {
    /// Free-text description
    pub description: String,
    /// Units, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl ColumnDescription {
    fn new(description: impl Into<String>, units: Option<&str>) -> Self {
        Self {
            description: description.into(),
            units: units.map(str::to_string),
        }
    }
}

/// JSON content of a sidecar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Descriptor {
    /// Continuous data sidecar
    Data(DataDescriptor),
    /// Events sidecar: column name to description
    Events(BTreeMap<String, ColumnDescription>),
}

/// Synthesized metadata for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarRecord {
    /// Channel table rows (empty for events)
    pub channels: Vec<ChannelRow>,
    /// Data file header, in order
    pub columns: Vec<String>,
    /// JSON descriptor
    pub descriptor: Descriptor,
    /// Warnings to surface in the manifest
    pub warnings: Vec<String>,
}

/// Everything besides the segment the synthesizer needs.
#[derive(Debug, Clone, Copy)]
pub struct SidecarContext<'s, 'a> {
    /// The aligned source stream
    pub stream: &'s AlignedStream<'a>,
    /// The run the segment belongs to
    pub run: &'s Run,
    /// Session reference clock
    pub clock: &'s ReferenceClock,
    /// Time origin for written times
    pub time_origin: TimeOrigin,
    /// Whether data files carry a `time` column
    pub include_time_column: bool,
}

impl SidecarContext<'_, '_> {
    /// Value subtracted from reference times before writing.
    pub fn origin(&self) -> f64 {
        time_origin_offset(self.time_origin, self.run, self.clock)
    }
}

/// Value subtracted from reference times for the given origin.
pub fn time_origin_offset(origin: TimeOrigin, run: &Run, clock: &ReferenceClock) -> f64 {
    match origin {
        TimeOrigin::RunStart => run.start,
        TimeOrigin::SessionStart => clock.start,
        TimeOrigin::Absolute => 0.0,
    }
}

/// Effective rate: sample intervals over first-to-last span.
///
/// `None` with fewer than two samples or a zero span.
pub fn effective_rate(times: &[f64]) -> Option<f64> {
    let (first, last) = (times.first()?, times.last()?);
    let span = last - first;
    (times.len() > 1 && span > 0.0).then(|| (times.len() - 1) as f64 / span)
}

/// Build the sidecar record for one segment.
pub fn synthesize(segment: &Segment, ctx: &SidecarContext<'_, '_>) -> SidecarRecord {
    match &segment.data {
        SegmentData::Numeric(_) => synthesize_data(segment, ctx),
        SegmentData::Events(records) if ctx.stream.classified.modality == Modality::Meta => {
            synthesize_meta(records, ctx.time_origin)
        }
        SegmentData::Events(events) => synthesize_events(events, ctx.time_origin),
    }
}

fn synthesize_data(segment: &Segment, ctx: &SidecarContext<'_, '_>) -> SidecarRecord {
    let header = ctx.stream.classified.header();
    let modality = ctx.stream.classified.modality;
    let (labels, warnings) = resolve_labels(header, ctx.include_time_column);
    let channels = channel_rows(header, modality, &labels);

    let mut columns = Vec::with_capacity(labels.len() + 1);
    if ctx.include_time_column {
        columns.push(TIME_COLUMN.to_string());
    }
    columns.extend(labels);

    let times = &segment.reference_times;
    let recording_duration = match (times.first(), times.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };

    let clock_synchronization = match ctx.stream.mapping.kind() {
        MappingKind::Reference => "reference",
        MappingKind::IdentityFallback => "identity",
        MappingKind::Offsets => "clock-offsets",
    };

    let descriptor = DataDescriptor {
        task_name: ctx.run.task.clone(),
        modality,
        sampling_frequency: effective_rate(times),
        nominal_sampling_frequency: (!header.is_irregular()).then_some(header.nominal_srate),
        sample_count: segment.sample_count(),
        channel_count: header.channel_count,
        recording_duration,
        start_time: times.first().map(|t| t - ctx.origin()),
        time_origin: ctx.time_origin.to_string(),
        time_column: ctx.include_time_column.then(|| {
            ColumnDescription::new(format!("Sample time, {}", ctx.time_origin.description()), Some("s"))
        }),
        run_window: [ctx.run.start, ctx.run.end],
        stream_name: header.name.clone(),
        stream_type: header.stream_type.clone(),
        stream_id: segment.stream_id,
        source_id: header.source_id.clone(),
        clock_synchronization: clock_synchronization.to_string(),
        clock_reliable: !ctx.stream.clock_unreliable(),
        reference_stream: ctx.clock.stream_name.clone(),
        columns: columns.clone(),
    };

    SidecarRecord {
        channels,
        columns,
        descriptor: Descriptor::Data(descriptor),
        warnings,
    }
}

/// Fixed leading columns of an events file.
pub const EVENT_COLUMNS: [&str; 4] = ["onset", "duration", "label", "value"];

fn synthesize_events(events: &[MarkerEvent], origin: TimeOrigin) -> SidecarRecord {
    let extra: BTreeSet<&str> = events
        .iter()
        .flat_map(|e| e.fields.keys().map(String::as_str))
        .filter(|k| !EVENT_COLUMNS.contains(k))
        .collect();

    let mut columns: Vec<String> = EVENT_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(extra.iter().map(|k| k.to_string()));

    let mut descriptions = BTreeMap::new();
    descriptions.insert("onset".to_string(), onset_description("Event onset", origin));
    descriptions.insert(
        "duration".to_string(),
        ColumnDescription::new("Event duration, n/a for instantaneous markers", Some("s")),
    );
    descriptions.insert(
        "label".to_string(),
        ColumnDescription::new("First token of the marker", None),
    );
    descriptions.insert(
        "value".to_string(),
        ColumnDescription::new("Complete marker text", None),
    );
    for key in extra {
        descriptions.insert(
            key.to_string(),
            ColumnDescription::new(format!("Marker field '{key}'"), None),
        );
    }

    SidecarRecord {
        channels: Vec::new(),
        columns,
        descriptor: Descriptor::Events(descriptions),
        warnings: Vec::new(),
    }
}

fn synthesize_meta(records: &[MarkerEvent], origin: TimeOrigin) -> SidecarRecord {
    let columns = meta_columns(records);

    let descriptions = columns
        .iter()
        .map(|column| {
            let description = match column.as_str() {
                "onset" => onset_description("Trial record onset", origin),
                "duration" => ColumnDescription::new("Trial duration", Some("s")),
                "trial_name" => ColumnDescription::new("Trial name", None),
                "trial_type" => ColumnDescription::new("Trial condition", None),
                "has_perturbations" => {
                    ColumnDescription::new("Whether the trial contains perturbations", None)
                }
                "has_movement" => ColumnDescription::new("Whether the trial involves movement", None),
                other => ColumnDescription::new(format!("Trial field '{other}'"), None),
            };
            (column.clone(), description)
        })
        .collect();

    SidecarRecord {
        channels: Vec::new(),
        columns,
        descriptor: Descriptor::Events(descriptions),
        warnings: Vec::new(),
    }
}

/// Columns of a perturbations file.
pub const PERTURBATION_COLUMNS: [&str; 4] = ["onset", "duration", "perturbation_type", "marker"];

/// JSON sidecar of a perturbations file.
pub fn perturbation_descriptor(origin: TimeOrigin) -> Descriptor {
    let mut descriptions = BTreeMap::new();
    descriptions.insert("onset".to_string(), onset_description("Perturbation onset", origin));
    descriptions.insert(
        "duration".to_string(),
        ColumnDescription::new("Time from the start marker to the end marker", Some("s")),
    );
    descriptions.insert(
        "perturbation_type".to_string(),
        ColumnDescription::new("Always 'perturbation'", None),
    );
    descriptions.insert(
        "marker".to_string(),
        ColumnDescription::new("Complete text of the start marker", None),
    );
    Descriptor::Events(descriptions)
}

fn onset_description(what: &str, origin: TimeOrigin) -> ColumnDescription {
    ColumnDescription::new(format!("{what}, {}", origin.description()), Some("s"))
}
