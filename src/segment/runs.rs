use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::events::{extract_events, MarkerEvent};
use super::SegmentError;
use crate::bids::bids_label;
use crate::clock::{AlignedStream, ReferenceClock};

/// Interval boundaries closer than this are the same boundary.
const BOUNDARY_TOLERANCE: f64 = 1e-3;

/// Where run boundaries come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RunBoundarySource {
    /// One run spanning the reference stream
    #[default]
    SingleRun,
    /// Markers of the stream with this header name
    MarkerStream(String),
}

impl FromStr for RunBoundarySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "single-run" {
            return Ok(Self::SingleRun);
        }
        match s.strip_prefix("marker-stream:") {
            Some(name) if !name.trim().is_empty() => Ok(Self::MarkerStream(name.trim().to_string())),
            _ => Err(format!(
                "invalid run boundary source '{s}' (expected \"single-run\" or \"marker-stream:<name>\")"
            )),
        }
    }
}

impl TryFrom<String> for RunBoundarySource {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunBoundarySource> for String {
    fn from(source: RunBoundarySource) -> Self {
        source.to_string()
    }
}

impl fmt::Display for RunBoundarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleRun => f.write_str("single-run"),
            Self::MarkerStream(name) => write!(f, "marker-stream:{name}"),
        }
    }
}

/// Which end of an interval a duration-bearing marker is stamped at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DurationAnchor {
    /// Marker sent when the interval ends (`TRIAL_END:…:duration=45`)
    #[default]
    End,
    /// Marker sent when the interval starts
    Start,
}

/// Policy for turning boundary markers into runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationPolicy {
    /// Boundary source
    pub source: RunBoundarySource,
    /// Emit a run from the reference start to the first boundary
    pub include_pre_roll: bool,
    /// Emit a run from the last boundary to the reference end
    pub include_tail: bool,
    /// Only markers whose text contains this (case-insensitive) are boundaries
    pub boundary_pattern: Option<String>,
    /// Anchor for duration-bearing markers
    pub duration_anchor: DurationAnchor,
}

impl Default for SegmentationPolicy {
    fn default() -> Self {
        Self {
            source: RunBoundarySource::SingleRun,
            include_pre_roll: false,
            include_tail: true,
            boundary_pattern: None,
            duration_anchor: DurationAnchor::End,
        }
    }
}

impl SegmentationPolicy {
    /// Policy reading boundaries from the named marker stream.
    pub fn from_marker_stream(name: impl Into<String>) -> Self {
        Self {
            source: RunBoundarySource::MarkerStream(name.into()),
            ..Default::default()
        }
    }
}

/// A labeled window `[start, end)` on the reference clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    /// 1-based index within the run's task
    pub index: usize,
    /// BIDS task label
    pub task: String,
    /// Inclusive start (reference seconds)
    pub start: f64,
    /// Exclusive end (reference seconds)
    pub end: f64,
    /// Marker text that opened this run, if any
    pub marker: Option<String>,
}

impl Run {
    /// Window length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// True when `t` lies in `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// Runs for one session plus the warnings raised while planning them.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    /// Non-overlapping runs sorted by start
    pub runs: Vec<Run>,
    /// Session-level warnings
    pub warnings: Vec<String>,
}

struct Window {
    start: f64,
    end: f64,
    task: Option<String>,
    marker: Option<String>,
}

/// Plan the session's runs.
///
/// With [`RunBoundarySource::MarkerStream`], markers carrying a duration define
/// explicit interval runs; otherwise every boundary marker is an instant and
/// runs are the windows between consecutive instants. When the marker stream
/// is absent or yields no boundaries, a single run over the reference clock is
/// used and a warning recorded.
pub fn plan_runs(
    streams: &[AlignedStream<'_>],
    clock: &ReferenceClock,
    policy: &SegmentationPolicy,
    default_task: &str,
) -> Result<RunPlan, SegmentError> {
    let mut warnings = Vec::new();

    let windows = match &policy.source {
        RunBoundarySource::SingleRun => vec![full_window(clock)],
        RunBoundarySource::MarkerStream(name) => {
            match streams.iter().find(|s| s.classified.header().name == *name) {
                None => {
                    let msg = format!(
                        "boundary marker stream '{name}' not found or empty; using a single run"
                    );
                    warn!("{msg}");
                    warnings.push(msg);
                    vec![full_window(clock)]
                }
                Some(stream) => {
                    let boundaries = boundary_events(stream, policy);
                    if boundaries.is_empty() {
                        let msg = format!(
                            "marker stream '{name}' has no boundary markers; using a single run"
                        );
                        warn!("{msg}");
                        warnings.push(msg);
                        vec![full_window(clock)]
                    } else {
                        windows_from_boundaries(&boundaries, clock, policy, &mut warnings)?
                    }
                }
            }
        }
    };

    let runs = number_runs(windows, default_task);
    info!("Planned {} run(s)", runs.len());
    Ok(RunPlan { runs, warnings })
}

fn full_window(clock: &ReferenceClock) -> Window {
    Window {
        start: clock.start,
        end: clock.end,
        task: None,
        marker: None,
    }
}

fn boundary_events(stream: &AlignedStream<'_>, policy: &SegmentationPolicy) -> Vec<MarkerEvent> {
    let pattern = policy.boundary_pattern.as_ref().map(|p| p.to_lowercase());
    extract_events(stream)
        .into_iter()
        .filter(|e| {
            pattern
                .as_ref()
                .map_or(true, |p| e.value.to_lowercase().contains(p.as_str()))
        })
        .collect()
}

fn windows_from_boundaries(
    boundaries: &[MarkerEvent],
    clock: &ReferenceClock,
    policy: &SegmentationPolicy,
    warnings: &mut Vec<String>,
) -> Result<Vec<Window>, SegmentError> {
    let (intervals, instants): (Vec<&MarkerEvent>, Vec<&MarkerEvent>) =
        boundaries.iter().partition(|e| e.duration.is_some());

    if !intervals.is_empty() {
        if !instants.is_empty() {
            let msg = format!(
                "{} boundary marker(s) without duration ignored; interval markers define the runs",
                instants.len()
            );
            warn!("{msg}");
            warnings.push(msg);
        }
        return interval_windows(&intervals, policy.duration_anchor, warnings);
    }

    Ok(instant_windows(&instants, clock, policy))
}

fn interval_windows(
    events: &[&MarkerEvent],
    anchor: DurationAnchor,
    warnings: &mut Vec<String>,
) -> Result<Vec<Window>, SegmentError> {
    let mut windows = Vec::with_capacity(events.len());
    for event in events {
        let duration = event.duration.unwrap_or_default();
        if duration <= 0.0 {
            return Err(SegmentError::InvalidDuration {
                marker: event.value.clone(),
                duration,
            });
        }
        let (start, end) = match anchor {
            DurationAnchor::End => (event.onset - duration, event.onset),
            DurationAnchor::Start => (event.onset, event.onset + duration),
        };
        windows.push(Window {
            start,
            end,
            task: event.field("task").map(str::to_string),
            marker: Some(event.value.clone()),
        });
    }

    windows.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));

    // identical intervals come from duplicated marker outlets
    windows.dedup_by(|b, a| {
        (a.start - b.start).abs() < BOUNDARY_TOLERANCE && (a.end - b.end).abs() < BOUNDARY_TOLERANCE
    });

    // runs never share a sample: an overlap within tolerance is marker
    // jitter and the later run starts where the earlier one ends
    for i in 1..windows.len() {
        let (done, rest) = windows.split_at_mut(i);
        let (a, b) = (&done[i - 1], &mut rest[0]);
        if b.start >= a.end {
            continue;
        }
        if a.end - b.start > BOUNDARY_TOLERANCE || b.end <= a.end {
            return Err(SegmentError::OverlappingRuns {
                first: a.marker.clone().unwrap_or_default(),
                first_end: a.end,
                second: b.marker.clone().unwrap_or_default(),
                second_start: b.start,
            });
        }
        let msg = format!(
            "run '{}' started {:.6}s before the previous run ended; start moved to {:.6}s",
            b.marker.as_deref().unwrap_or_default(),
            a.end - b.start,
            a.end
        );
        warn!("{msg}");
        warnings.push(msg);
        b.start = a.end;
    }

    Ok(windows)
}

fn instant_windows(
    events: &[&MarkerEvent],
    clock: &ReferenceClock,
    policy: &SegmentationPolicy,
) -> Vec<Window> {
    let mut instants: Vec<&MarkerEvent> = events.to_vec();
    instants.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    instants.dedup_by(|b, a| (a.onset - b.onset).abs() < BOUNDARY_TOLERANCE);

    let mut windows = Vec::new();
    let (Some(first), Some(last)) = (instants.first(), instants.last()) else {
        return windows;
    };

    if policy.include_pre_roll && first.onset > clock.start {
        windows.push(Window {
            start: clock.start,
            end: first.onset,
            task: None,
            marker: None,
        });
    }

    for pair in instants.windows(2) {
        windows.push(Window {
            start: pair[0].onset,
            end: pair[1].onset,
            task: pair[0].field("task").map(str::to_string),
            marker: Some(pair[0].value.clone()),
        });
    }

    if policy.include_tail && clock.end > last.onset {
        windows.push(Window {
            start: last.onset,
            end: clock.end,
            task: last.field("task").map(str::to_string),
            marker: Some(last.value.clone()),
        });
    }

    windows
}

fn number_runs(windows: Vec<Window>, default_task: &str) -> Vec<Run> {
    let mut per_task: BTreeMap<String, usize> = BTreeMap::new();
    windows
        .into_iter()
        .filter(|w| w.end > w.start)
        .map(|w| {
            let task = w
                .task
                .as_deref()
                .map(bids_label)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| default_task.to_string());
            let counter = per_task.entry(task.clone()).or_insert(0);
            *counter += 1;
            Run {
                index: *counter,
                task,
                start: w.start,
                end: w.end,
                marker: w.marker,
            }
        })
        .collect()
}
