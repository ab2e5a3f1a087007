//! Thin-waist ingestion contract for decoded XDF streams.
//!
//! The XDF container parser is an external collaborator. It hands the engine a
//! [`DecodedSession`]: a list of [`Stream`] records, each with its header, its
//! per-sample timestamps, the sample matrix and any clock-offset records. This
//! module defines those types and the invariants every stream must satisfy
//! before it enters the pipeline.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors returned when the ingestion contract is violated.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Contract violation with a human-readable message.
    #[error("ingest contract violation: {0}")]
    ContractViolation(String),

    /// The decoded session could not be read.
    #[error("failed to read decoded session: {0}")]
    Io(#[from] std::io::Error),

    /// The decoded session is not valid JSON for the session schema.
    #[error("failed to parse decoded session: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    fn violation(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }
}

/// Per-channel description from the stream header's `<desc><channels>` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel label, if the outlet declared one.
    #[serde(default)]
    pub label: Option<String>,
    /// Measurement unit (e.g. "microvolts", "cm").
    #[serde(default)]
    pub unit: Option<String>,
    /// Channel type (e.g. "EEG", "POS", "GAZE").
    #[serde(default, rename = "type")]
    pub channel_type: Option<String>,
}

/// Stream header metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamHeader {
    /// Outlet name (e.g. "BioSemi", "pupil_capture").
    pub name: String,
    /// Content type (e.g. "EEG", "Markers", "Gaze").
    #[serde(rename = "type")]
    pub stream_type: String,
    /// Declared number of channels.
    pub channel_count: usize,
    /// Nominal sampling rate in Hz; 0 for irregular streams.
    #[serde(default)]
    pub nominal_srate: f64,
    /// Stream-wide unit, used when a channel does not declare its own.
    #[serde(default)]
    pub unit: Option<String>,
    /// Outlet source identifier.
    #[serde(default)]
    pub source_id: Option<String>,
    /// Per-channel descriptions, possibly shorter than `channel_count`.
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
}

impl StreamHeader {
    /// Create a header with no channel descriptions.
    pub fn new(
        name: impl Into<String>,
        stream_type: impl Into<String>,
        channel_count: usize,
        nominal_srate: f64,
    ) -> Self {
        Self {
            name: name.into(),
            stream_type: stream_type.into(),
            channel_count,
            nominal_srate,
            unit: None,
            source_id: None,
            channels: Vec::new(),
        }
    }

    /// Attach channel labels, one per channel.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = labels
            .into_iter()
            .map(|label| ChannelInfo {
                label: Some(label.into()),
                ..Default::default()
            })
            .collect();
        self
    }

    /// Set the stream-wide unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// True when the outlet declared an irregular (event-driven) rate.
    pub fn is_irregular(&self) -> bool {
        self.nominal_srate <= 0.0 || !self.nominal_srate.is_finite()
    }
}

/// One clock-offset measurement: at local time `time`, reference time was
/// `time + value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockOffset {
    /// Collection instant on the stream's local clock (seconds).
    pub time: f64,
    /// Offset to add to local time to obtain reference time (seconds).
    pub value: f64,
}

impl ClockOffset {
    /// Create a new offset record.
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Sample matrix of a stream, one row per timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "rows", rename_all = "lowercase")]
pub enum SampleData {
    /// Numeric channels (float32/float64/int formats widened to f64).
    Numeric(Vec<Vec<f64>>),
    /// String channels, as used by marker outlets.
    Text(Vec<Vec<String>>),
}

impl SampleData {
    /// Number of sample rows.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Numeric(rows) => rows.len(),
            SampleData::Text(rows) => rows.len(),
        }
    }

    /// True when there are no sample rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row_width(&self, index: usize) -> usize {
        match self {
            SampleData::Numeric(rows) => rows[index].len(),
            SampleData::Text(rows) => rows[index].len(),
        }
    }
}

/// One decoded XDF stream. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Stream id as assigned in the XDF container.
    pub id: u32,
    /// Header metadata.
    pub header: StreamHeader,
    /// Per-sample timestamps on the stream's local clock (seconds).
    pub timestamps: Vec<f64>,
    /// Sample matrix, row-aligned with `timestamps`.
    pub samples: SampleData,
    /// Clock-offset records in collection order.
    #[serde(default)]
    pub clock_offsets: Vec<ClockOffset>,
}

impl Stream {
    /// Create a numeric stream.
    pub fn numeric(id: u32, header: StreamHeader, timestamps: Vec<f64>, rows: Vec<Vec<f64>>) -> Self {
        Self {
            id,
            header,
            timestamps,
            samples: SampleData::Numeric(rows),
            clock_offsets: Vec::new(),
        }
    }

    /// Create a single-channel marker stream.
    pub fn markers<I, S>(id: u32, name: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = (f64, S)>,
        S: Into<String>,
    {
        let (timestamps, rows): (Vec<f64>, Vec<Vec<String>>) = events
            .into_iter()
            .map(|(t, label)| (t, vec![label.into()]))
            .unzip();
        Self {
            id,
            header: StreamHeader::new(name, "Markers", 1, 0.0),
            timestamps,
            samples: SampleData::Text(rows),
            clock_offsets: Vec::new(),
        }
    }

    /// Attach clock-offset records.
    pub fn with_clock_offsets(mut self, offsets: Vec<ClockOffset>) -> Self {
        self.clock_offsets = offsets;
        self
    }

    /// Number of samples.
    pub fn sample_count(&self) -> usize {
        self.timestamps.len()
    }

    /// True when the stream carries no samples.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// First local timestamp, if any.
    pub fn first_timestamp(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    /// Check the shape invariants every decoded stream must satisfy.
    ///
    /// Invariants:
    /// - `timestamps` and sample rows have identical lengths.
    /// - Every sample row has exactly `channel_count` values.
    /// - Every timestamp is finite.
    pub fn validate_contract(&self) -> Result<(), IngestError> {
        if self.timestamps.len() != self.samples.len() {
            return Err(IngestError::violation(format!(
                "stream {}: {} timestamps but {} sample rows",
                self.id,
                self.timestamps.len(),
                self.samples.len()
            )));
        }

        if self.header.channel_count == 0 && !self.is_empty() {
            return Err(IngestError::violation(format!(
                "stream {}: channel_count is 0 but samples are present",
                self.id
            )));
        }

        if let Some(row) = (0..self.samples.len())
            .find(|&i| self.samples.row_width(i) != self.header.channel_count)
        {
            return Err(IngestError::violation(format!(
                "stream {}: sample row {row} has {} values, expected {}",
                self.id,
                self.samples.row_width(row),
                self.header.channel_count
            )));
        }

        if let Some(position) = self.timestamps.iter().position(|t| !t.is_finite()) {
            return Err(IngestError::violation(format!(
                "stream {}: timestamp {position} is not finite",
                self.id
            )));
        }

        Ok(())
    }
}

/// A whole decoded recording as handed over by the XDF decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedSession {
    /// Decoded streams in container order.
    pub streams: Vec<Stream>,
    /// Recording start from the XDF file header, if known.
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl DecodedSession {
    /// Wrap a list of streams.
    pub fn new(streams: Vec<Stream>) -> Self {
        Self {
            streams,
            recorded_at: None,
        }
    }

    /// Read a decoded session from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read a decoded session from any JSON reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, IngestError> {
        Ok(serde_json::from_reader(reader)?)
    }
}
