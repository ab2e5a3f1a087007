//! # Segmenter
//!
//! Cuts aligned streams into per-run [`Segment`]s.
//!
//! Runs are planned once per session by [`plan_runs`], either as a single run
//! spanning the reference stream or from a designated marker stream. Each
//! aligned stream is then sliced against every run: a sample belongs to a run
//! when its reference-clock time lies in `[run.start, run.end)`. Because mapped
//! timestamps are non-decreasing, the slice bounds are found by binary search
//! and only the selected samples are copied.
//!
//! A run that contains no samples of a stream still yields a Segment; it is
//! empty, and the writer decides whether to emit it.

mod error;
mod events;
mod perturbations;
mod runs;


pub use error::SegmentError;
pub use events::{extract_events, extract_meta, meta_columns, parse_marker, MarkerEvent, ParsedMarker};
pub use perturbations::{pair_perturbations, Perturbation, PerturbationTable};
pub use runs::{plan_runs, DurationAnchor, Run, RunBoundarySource, RunPlan, SegmentationPolicy};

use std::ops::Range;

use log::debug;

use crate::classify::Modality;
use crate::clock::AlignedStream;
use crate::ingest::SampleData;

/// Samples of one segment.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentData {
    /// Numeric sample rows, one per reference time
    Numeric(Vec<Vec<f64>>),
    /// Marker events (or trial metadata records) with onsets inside the run
    Events(Vec<MarkerEvent>),
}

impl SegmentData {
    /// Number of samples or events.
    pub fn len(&self) -> usize {
        match self {
            SegmentData::Numeric(rows) => rows.len(),
            SegmentData::Events(events) => events.len(),
        }
    }

    /// True when nothing fell inside the run.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The part of one stream that falls inside one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Source stream id
    pub stream_id: u32,
    /// Position of the run in the session's run plan
    pub run: usize,
    /// Reference-clock time of every sample (for events: every onset)
    pub reference_times: Vec<f64>,
    /// Copied samples
    pub data: SegmentData,
}

impl Segment {
    /// True when the run contains no samples of this stream.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of samples.
    pub fn sample_count(&self) -> usize {
        self.data.len()
    }
}

/// Reasons a stream cannot be segmented at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentSkip {
    /// A continuous modality was assigned to a text stream
    #[error("{modality} output requires numeric samples, stream carries text")]
    NonNumeric {
        /// Assigned modality
        modality: Modality,
    },
}

/// Cut one aligned stream against every run.
///
/// Events and meta streams yield event segments; every other modality yields
/// numeric segments.
pub fn cut_segments(stream: &AlignedStream<'_>, runs: &[Run]) -> Result<Vec<Segment>, SegmentSkip> {
    let modality = stream.classified.modality;

    if matches!(modality, Modality::Events | Modality::Meta) {
        let events = if modality == Modality::Meta {
            extract_meta(stream)
        } else {
            extract_events(stream)
        };
        return Ok(runs
            .iter()
            .enumerate()
            .map(|(position, run)| {
                let lo = events.partition_point(|e| e.onset < run.start);
                let hi = events.partition_point(|e| e.onset < run.end);
                let selected = events[lo..hi.max(lo)].to_vec();
                Segment {
                    stream_id: stream.id(),
                    run: position,
                    reference_times: selected.iter().map(|e| e.onset).collect(),
                    data: SegmentData::Events(selected),
                }
            })
            .collect());
    }

    let SampleData::Numeric(rows) = &stream.classified.stream.samples else {
        return Err(SegmentSkip::NonNumeric { modality });
    };

    let segments = runs
        .iter()
        .enumerate()
        .map(|(position, run)| {
            let indices = select_indices(&stream.reference_times, stream.monotonic, run);
            let segment = Segment {
                stream_id: stream.id(),
                run: position,
                reference_times: indices.clone().map(|i| stream.reference_times[i]).collect(),
                data: SegmentData::Numeric(indices.map(|i| rows[i].clone()).collect()),
            };
            debug!(
                "Stream {} run {} ({}): {} sample(s)",
                stream.id(),
                run.index,
                run.task,
                segment.sample_count()
            );
            segment
        })
        .collect();

    Ok(segments)
}

/// Indices of the samples inside `run`.
#[derive(Clone)]
enum Selection {
    Contiguous(Range<usize>),
    Scattered(std::vec::IntoIter<usize>),
}

impl Iterator for Selection {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            Selection::Contiguous(range) => range.next(),
            Selection::Scattered(indices) => indices.next(),
        }
    }
}

fn select_indices(times: &[f64], monotonic: bool, run: &Run) -> Selection {
    if monotonic {
        let lo = times.partition_point(|&t| t < run.start);
        let hi = times.partition_point(|&t| t < run.end);
        Selection::Contiguous(lo..hi.max(lo))
    } else {
        // order is not usable for search; keep sample order
        let indices: Vec<usize> = times
            .iter()
            .enumerate()
            .filter(|(_, &t)| run.contains(t))
            .map(|(i, _)| i)
            .collect();
        Selection::Scattered(indices.into_iter())
    }
}
