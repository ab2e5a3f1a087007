use log::warn;

use super::events::MarkerEvent;
use super::runs::Run;

/// Start markers within this many seconds of each other are one marker sent
/// twice; the same holds for end markers.
const PAIRING_TOLERANCE: f64 = 1e-5;

const START_TOKEN: &str = "perturbation_start";
const END_TOKEN: &str = "perturbation_end";

/// One perturbation: a start marker paired with its end marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    /// Reference-clock onset of the start marker (seconds)
    pub onset: f64,
    /// End onset minus start onset; zero when the end marker was missing
    pub duration: f64,
    /// Complete text of the start marker
    pub marker: String,
}

/// Perturbations of one marker stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerturbationTable {
    /// Paired perturbations in onset order
    pub perturbations: Vec<Perturbation>,
    /// Problems met while pairing
    pub warnings: Vec<String>,
}

impl PerturbationTable {
    /// True when no perturbation was paired.
    pub fn is_empty(&self) -> bool {
        self.perturbations.is_empty()
    }

    /// Perturbations whose onset lies inside `run`.
    pub fn within(&self, run: &Run) -> Vec<Perturbation> {
        let lo = self.perturbations.partition_point(|p| p.onset < run.start);
        let hi = self.perturbations.partition_point(|p| p.onset < run.end);
        self.perturbations[lo..hi.max(lo)].to_vec()
    }
}

/// Pair `perturbation_start` and `perturbation_end` markers.
///
/// Matching is a case-insensitive substring test on the marker text. Both
/// lists are sorted and de-duplicated, then paired in order. With exactly one
/// end marker missing, the last start is paired with itself and gets a zero
/// duration. Any other count mismatch, or an end that precedes its start,
/// leaves the table empty with a warning.
pub fn pair_perturbations(events: &[MarkerEvent]) -> PerturbationTable {
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    for event in events {
        let text = event.value.to_lowercase();
        if text.contains(START_TOKEN) {
            starts.push(event);
        } else if text.contains(END_TOKEN) {
            ends.push(event);
        }
    }
    let starts = dedup_onsets(starts);
    let ends = dedup_onsets(ends);

    let mut table = PerturbationTable::default();
    if starts.is_empty() && ends.is_empty() {
        return table;
    }

    let end_onsets: Vec<f64> = match starts.len().checked_sub(ends.len()) {
        Some(0) => ends.iter().map(|e| e.onset).collect(),
        Some(1) => {
            let message = format!(
                "{} perturbation start(s) but {} end(s); last perturbation has no end and gets duration 0",
                starts.len(),
                ends.len()
            );
            warn!("{message}");
            table.warnings.push(message);
            ends.iter()
                .chain(starts.last())
                .map(|e| e.onset)
                .collect()
        }
        _ => {
            let message = format!(
                "cannot pair {} perturbation start(s) with {} end(s); perturbations not written",
                starts.len(),
                ends.len()
            );
            warn!("{message}");
            table.warnings.push(message);
            return table;
        }
    };

    let paired: Vec<Perturbation> = starts
        .iter()
        .zip(&end_onsets)
        .map(|(start, &end)| Perturbation {
            onset: start.onset,
            duration: end - start.onset,
            marker: start.value.clone(),
        })
        .collect();

    if let Some(bad) = paired.iter().find(|p| p.duration < 0.0) {
        let message = format!(
            "perturbation starting at {:.6}s ends before it starts; perturbations not written",
            bad.onset
        );
        warn!("{message}");
        table.warnings.push(message);
        return table;
    }

    table.perturbations = paired;
    table
}

fn dedup_onsets(mut events: Vec<&MarkerEvent>) -> Vec<&MarkerEvent> {
    events.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    let mut kept: Vec<&MarkerEvent> = Vec::with_capacity(events.len());
    for event in events {
        let repeat = kept
            .last()
            .is_some_and(|prev| (event.onset - prev.onset).abs() <= PAIRING_TOLERANCE);
        if !repeat {
            kept.push(event);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(list: &[(f64, &str)]) -> Vec<MarkerEvent> {
        list.iter()
            .map(|&(t, m)| MarkerEvent::from_marker(t, m))
            .collect()
    }

    #[test]
    fn test_pairs_in_onset_order() {
        let events = markers(&[
            (10.0, "perturbation_start:left"),
            (12.5, "perturbation_end"),
            (20.0, "Perturbation_Start:right"),
            (21.0, "PERTURBATION_END"),
            (22.0, "beep"),
        ]);
        let table = pair_perturbations(&events);
        assert!(table.warnings.is_empty());
        assert_eq!(table.perturbations.len(), 2);
        assert_eq!(table.perturbations[0].onset, 10.0);
        assert!((table.perturbations[0].duration - 2.5).abs() < 1e-12);
        assert_eq!(table.perturbations[1].marker, "Perturbation_Start:right");
        assert!((table.perturbations[1].duration - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_markers_collapse() {
        let events = markers(&[
            (10.0, "perturbation_start"),
            (10.000001, "perturbation_start"),
            (12.0, "perturbation_end"),
            (12.000004, "perturbation_end"),
        ]);
        let table = pair_perturbations(&events);
        assert_eq!(table.perturbations.len(), 1);
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn test_single_missing_end_repaired() {
        let events = markers(&[
            (10.0, "perturbation_start"),
            (11.0, "perturbation_end"),
            (30.0, "perturbation_start"),
        ]);
        let table = pair_perturbations(&events);
        assert_eq!(table.perturbations.len(), 2);
        assert_eq!(table.perturbations[1].onset, 30.0);
        assert_eq!(table.perturbations[1].duration, 0.0);
        assert!(table.warnings[0].contains("no end"));
    }

    #[test]
    fn test_unresolvable_counts_yield_nothing() {
        let events = markers(&[
            (10.0, "perturbation_start"),
            (11.0, "perturbation_end"),
            (12.0, "perturbation_end"),
        ]);
        let table = pair_perturbations(&events);
        assert!(table.is_empty());
        assert!(table.warnings[0].contains("cannot pair 1"));
    }

    #[test]
    fn test_end_before_start_yields_nothing() {
        let events = markers(&[(10.0, "perturbation_end"), (11.0, "perturbation_start")]);
        let table = pair_perturbations(&events);
        assert!(table.is_empty());
        assert!(table.warnings[0].contains("ends before it starts"));
    }

    #[test]
    fn test_no_perturbation_markers() {
        let table = pair_perturbations(&markers(&[(1.0, "beep"), (2.0, "TRIAL_END:1")]));
        assert!(table.is_empty());
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn test_within_selects_by_start_onset() {
        let table = pair_perturbations(&markers(&[
            (1.0, "perturbation_start"),
            (2.0, "perturbation_end"),
            (5.0, "perturbation_start"),
            (6.5, "perturbation_end"),
        ]));
        let run = Run {
            index: 2,
            task: "balance".into(),
            start: 4.0,
            end: 8.0,
            marker: None,
        };
        let selected = table.within(&run);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].onset, 5.0);
    }
}
