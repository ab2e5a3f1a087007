//! # Clock Reconciler
//!
//! Every stream in an XDF recording carries timestamps from its own device
//! clock. This module picks one stream as the reference, builds a monotone
//! [`ClockMapping`] from every other stream's clock-offset records, and maps
//! all timestamps onto the shared [`ReferenceClock`].
//!
//! Streams without offset records fall back to the identity mapping (logged,
//! not an error). Offset records that would make the mapping run backwards
//! are clamped and the stream is flagged unreliable. Streams with zero samples
//! are excluded and reported as skipped.

mod error;
mod mapping;

#[cfg(test)]
mod tests;

pub use error::ClockError;
pub use mapping::{ClockMapping, MappingKind};

use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedStream;

/// Which stream's local clock becomes the reference clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReferenceSelector {
    /// Highest nominal rate; ties go to the earliest first timestamp, then to
    /// container order.
    #[default]
    HighestRate,
    /// Stream whose id (numeric) or header name equals the given value.
    Named(String),
}

impl FromStr for ReferenceSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "highest-rate" {
            return Ok(Self::HighestRate);
        }
        match s.strip_prefix("named:") {
            Some(name) if !name.trim().is_empty() => Ok(Self::Named(name.trim().to_string())),
            _ => Err(format!(
                "invalid reference stream selector '{s}' (expected \"highest-rate\" or \"named:<id>\")"
            )),
        }
    }
}

impl TryFrom<String> for ReferenceSelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceSelector> for String {
    fn from(selector: ReferenceSelector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for ReferenceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighestRate => f.write_str("highest-rate"),
            Self::Named(name) => write!(f, "named:{name}"),
        }
    }
}

/// Session-wide time base.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceClock {
    /// Stream whose local clock is the reference
    pub stream_id: u32,
    /// Header name of the reference stream
    pub stream_name: String,
    /// First reference-stream timestamp
    pub start: f64,
    /// Exclusive end: last reference-stream timestamp plus one sample period
    pub end: f64,
}

impl ReferenceClock {
    /// Recorded duration of the reference stream.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A classified stream with its timestamps mapped onto the reference clock.
#[derive(Debug, Clone)]
pub struct AlignedStream<'a> {
    /// The classified input
    pub classified: ClassifiedStream<'a>,
    /// Local-to-reference mapping
    pub mapping: ClockMapping,
    /// Mapped timestamp of every sample, in sample order
    pub reference_times: Vec<f64>,
    /// True when `reference_times` is non-decreasing
    pub monotonic: bool,
}

impl<'a> AlignedStream<'a> {
    fn new(classified: ClassifiedStream<'a>, mapping: ClockMapping) -> Self {
        let reference_times = mapping.map_all(&classified.stream.timestamps);
        let monotonic = reference_times.windows(2).all(|w| w[0] <= w[1]);
        Self {
            classified,
            mapping,
            reference_times,
            monotonic,
        }
    }

    /// Stream id shorthand.
    pub fn id(&self) -> u32 {
        self.classified.id()
    }

    /// True when any offset record was dropped or clamped.
    pub fn clock_unreliable(&self) -> bool {
        !self.mapping.is_reliable()
    }

    /// Warnings accumulated while aligning this stream.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match self.mapping.kind() {
            MappingKind::IdentityFallback => {
                warnings.push("no clock offsets; identity mapping used".to_string());
            }
            MappingKind::Offsets if !self.mapping.is_reliable() => {
                warnings.push(format!(
                    "clock unreliable: {} offset record(s) regressed and were clamped",
                    self.mapping.regressions()
                ));
            }
            _ => {}
        }
        if !self.monotonic {
            warnings.push("timestamps are not monotonically increasing".to_string());
        }
        warnings
    }
}

/// A stream excluded from reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedStream {
    /// Stream id
    pub stream_id: u32,
    /// Human-readable reason
    pub reason: String,
}

/// Output of the reconciler.
#[derive(Debug, Clone)]
pub struct Reconciliation<'a> {
    /// The reference time base
    pub clock: ReferenceClock,
    /// Aligned streams in input order
    pub streams: Vec<AlignedStream<'a>>,
    /// Streams excluded because they have no samples
    pub skipped: Vec<SkippedStream>,
}

/// Select the reference stream and align every classified stream to it.
pub fn reconcile<'a>(
    classified: Vec<ClassifiedStream<'a>>,
    selector: &ReferenceSelector,
) -> Result<Reconciliation<'a>, ClockError> {
    let (populated, empty): (Vec<_>, Vec<_>) =
        classified.into_iter().partition(|c| !c.stream.is_empty());

    let skipped: Vec<SkippedStream> = empty
        .iter()
        .map(|c| {
            warn!("Stream {} ('{}') has no samples; skipped", c.id(), c.header().name);
            SkippedStream {
                stream_id: c.id(),
                reason: "stream has no samples".to_string(),
            }
        })
        .collect();

    let reference_index = select_reference(&populated, &empty, selector)?;
    let reference = &populated[reference_index];
    let clock = reference_clock(reference);
    let reference_id = reference.id();

    info!(
        "Reference clock: stream {} ('{}'), {:.3}s to {:.3}s",
        clock.stream_id,
        clock.stream_name,
        clock.start,
        clock.end
    );

    let streams = populated
        .into_iter()
        .map(|c| {
            let mapping = if c.id() == reference_id {
                if !c.stream.clock_offsets.is_empty() {
                    debug!(
                        "Stream {} is the reference; its {} offset record(s) are not applied",
                        c.id(),
                        c.stream.clock_offsets.len()
                    );
                }
                ClockMapping::reference()
            } else {
                ClockMapping::from_offsets(&c.stream.clock_offsets)
            };
            let aligned = AlignedStream::new(c, mapping);
            for warning in aligned.warnings() {
                warn!("Stream {} ('{}'): {}", aligned.id(), aligned.classified.header().name, warning);
            }
            aligned
        })
        .collect();

    Ok(Reconciliation {
        clock,
        streams,
        skipped,
    })
}

fn select_reference(
    populated: &[ClassifiedStream<'_>],
    empty: &[ClassifiedStream<'_>],
    selector: &ReferenceSelector,
) -> Result<usize, ClockError> {
    match selector {
        ReferenceSelector::HighestRate => {
            let rate = |c: &ClassifiedStream<'_>| {
                let r = c.header().nominal_srate;
                if r.is_finite() && r > 0.0 {
                    r
                } else {
                    0.0
                }
            };
            let start = |c: &ClassifiedStream<'_>| c.stream.first_timestamp().unwrap_or(f64::INFINITY);

            let mut best: Option<usize> = None;
            for (i, candidate) in populated.iter().enumerate() {
                let better = match best {
                    None => true,
                    Some(b) => {
                        let current = &populated[b];
                        rate(candidate) > rate(current)
                            || (rate(candidate) == rate(current) && start(candidate) < start(current))
                    }
                };
                if better {
                    best = Some(i);
                }
            }
            best.ok_or(ClockError::NoReferenceCandidate)
        }
        ReferenceSelector::Named(name) => {
            let is_named = |c: &ClassifiedStream<'_>| {
                c.header().name == *name || name.parse::<u32>().map_or(false, |id| id == c.id())
            };
            if let Some(index) = populated.iter().position(is_named) {
                return Ok(index);
            }
            if empty.iter().any(is_named) {
                return Err(ClockError::EmptyReference(name.clone()));
            }
            Err(ClockError::ReferenceNotFound(name.clone()))
        }
    }
}

fn reference_clock(reference: &ClassifiedStream<'_>) -> ReferenceClock {
    let timestamps = &reference.stream.timestamps;
    let start = timestamps.iter().copied().fold(f64::INFINITY, f64::min);
    let last = timestamps.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let header = reference.header();
    let period = if !header.is_irregular() {
        1.0 / header.nominal_srate
    } else if timestamps.len() > 1 && last > start {
        (last - start) / (timestamps.len() - 1) as f64
    } else {
        last.abs().max(1.0) * f64::EPSILON * 4.0
    };

    ReferenceClock {
        stream_id: reference.id(),
        stream_name: header.name.clone(),
        start,
        end: last + period,
    }
}
