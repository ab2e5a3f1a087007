use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::clock::AlignedStream;
use crate::ingest::SampleData;

/// Onsets closer than this (after rounding) with the same marker text are one
/// event recorded twice, e.g. by duplicate marker outlets.
const DUPLICATE_ONSET_DECIMALS: i32 = 3;

/// A marker string split into its parts.
///
/// Markers are written as `NAME[:token]*`. Tokens of the form `key=value`
/// become fields; `duration=<seconds>` additionally sets the duration.
/// Positional tokens (e.g. the trial number in `TRIAL_END:3:duration=45`)
/// stay in the raw value only. Trial metadata records have no name and start
/// with a field (`trial_name=walk:trial_type=balance`), so a first token
/// holding `=` is a field too.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMarker {
    /// First token
    pub label: String,
    /// Parsed `duration=` field, if valid
    pub duration: Option<f64>,
    /// All `key=value` tokens
    pub fields: BTreeMap<String, String>,
}

/// Parse a marker string.
pub fn parse_marker(raw: &str) -> ParsedMarker {
    let mut tokens = raw.split(':').peekable();
    let label = tokens.peek().copied().unwrap_or_default().trim().to_string();
    if !label.contains('=') {
        tokens.next();
    }
    let mut fields = BTreeMap::new();

    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                fields.insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    let duration = fields
        .get("duration")
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite());

    ParsedMarker {
        label,
        duration,
        fields,
    }
}

/// One event on the reference clock.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerEvent {
    /// Reference-clock onset (seconds)
    pub onset: f64,
    /// Duration in seconds, if the marker declared one
    pub duration: Option<f64>,
    /// First token of the marker
    pub label: String,
    /// Complete marker text
    pub value: String,
    /// Parsed `key=value` fields
    pub fields: BTreeMap<String, String>,
}

impl MarkerEvent {
    /// Build an event from raw marker text.
    pub fn from_marker(onset: f64, raw: &str) -> Self {
        let parsed = parse_marker(raw);
        Self {
            onset,
            duration: parsed.duration,
            label: parsed.label,
            value: raw.to_string(),
            fields: parsed.fields,
        }
    }

    /// Field lookup.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Extract events from an aligned stream, sorted by onset and deduplicated.
///
/// Text streams use the first channel of each sample; numeric streams use
/// the first channel formatted as a number. Empty markers are ignored.
pub fn extract_events(stream: &AlignedStream<'_>) -> Vec<MarkerEvent> {
    let times = &stream.reference_times;
    let mut events: Vec<MarkerEvent> = match &stream.classified.stream.samples {
        SampleData::Text(rows) => rows
            .iter()
            .zip(times)
            .filter_map(|(row, &t)| {
                row.first()
                    .filter(|m| !m.trim().is_empty())
                    .map(|m| MarkerEvent::from_marker(t, m))
            })
            .collect(),
        SampleData::Numeric(rows) => rows
            .iter()
            .zip(times)
            .filter_map(|(row, &t)| {
                row.first()
                    .filter(|v| v.is_finite())
                    .map(|v| MarkerEvent::from_marker(t, &v.to_string()))
            })
            .collect(),
    };

    events.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    dedup_events(events, |e| e.value.as_str())
}

/// Extract trial metadata records from an aligned meta stream.
///
/// Records are parsed like markers. Duplicates share a rounded onset and the
/// same `trial_name` field (the full record text when a record has none).
pub fn extract_meta(stream: &AlignedStream<'_>) -> Vec<MarkerEvent> {
    dedup_events(extract_events(stream), |e| {
        e.field("trial_name").unwrap_or(e.value.as_str())
    })
}

/// Column order of a meta table: onset, the known trial columns that occur,
/// then every other field name in sorted order.
pub fn meta_columns(records: &[MarkerEvent]) -> Vec<String> {
    let present: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    let mut columns = vec!["onset".to_string()];
    columns.extend(
        META_COLUMN_ORDER
            .iter()
            .filter(|c| present.contains(**c))
            .map(|c| c.to_string()),
    );
    columns.extend(
        present
            .iter()
            .filter(|c| **c != "onset" && !META_COLUMN_ORDER.contains(*c))
            .map(|c| c.to_string()),
    );
    columns
}

/// Known trial columns, in output order.
const META_COLUMN_ORDER: [&str; 5] = [
    "duration",
    "trial_name",
    "trial_type",
    "has_perturbations",
    "has_movement",
];

fn dedup_events<F>(events: Vec<MarkerEvent>, key: F) -> Vec<MarkerEvent>
where
    F: Fn(&MarkerEvent) -> &str,
{
    let scale = 10f64.powi(DUPLICATE_ONSET_DECIMALS);
    let mut seen: HashSet<(i64, String)> = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(((e.onset * scale).round() as i64, key(e).to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_marker() {
        let parsed = parse_marker("stimulus_on");
        assert_eq!(parsed.label, "stimulus_on");
        assert!(parsed.duration.is_none());
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn test_parse_trial_end_marker() {
        let parsed = parse_marker("TRIAL_END:1:time=1252.1662882:duration=45.00090410000007");
        assert_eq!(parsed.label, "TRIAL_END");
        assert_eq!(parsed.fields.get("time").map(String::as_str), Some("1252.1662882"));
        assert!((parsed.duration.unwrap() - 45.0009041).abs() < 1e-6);
    }

    #[test]
    fn test_parse_invalid_duration_kept_as_field() {
        let parsed = parse_marker("block:duration=soon:task=balance");
        assert!(parsed.duration.is_none());
        assert_eq!(parsed.fields.get("duration").map(String::as_str), Some("soon"));
        assert_eq!(parsed.fields.get("task").map(String::as_str), Some("balance"));
    }

    #[test]
    fn test_dedup_within_a_millisecond() {
        let events = vec![
            MarkerEvent::from_marker(1.0001, "start"),
            MarkerEvent::from_marker(1.0002, "start"),
            MarkerEvent::from_marker(1.0002, "other"),
            MarkerEvent::from_marker(2.0, "start"),
        ];
        let deduped = dedup_events(events, |e| e.value.as_str());
        let values: Vec<&str> = deduped.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["start", "other", "start"]);
    }

    #[test]
    fn test_parse_meta_record() {
        let parsed = parse_marker("trial_name=walk_1:trial_type=walking:has_movement=true");
        assert_eq!(parsed.fields.get("trial_name").map(String::as_str), Some("walk_1"));
        assert_eq!(parsed.fields.get("trial_type").map(String::as_str), Some("walking"));
        assert_eq!(parsed.fields.len(), 3);
    }

    #[test]
    fn test_meta_dedup_keys_on_trial_name() {
        let records = vec![
            MarkerEvent::from_marker(5.0001, "trial_name=a:trial_type=x"),
            // same trial re-sent with a different type string
            MarkerEvent::from_marker(5.0002, "trial_name=a:trial_type=y"),
            MarkerEvent::from_marker(5.0002, "trial_name=b:trial_type=x"),
            MarkerEvent::from_marker(9.0, "trial_name=a:trial_type=x"),
        ];
        let deduped = dedup_events(records, |e| e.field("trial_name").unwrap_or(e.value.as_str()));
        let names: Vec<(f64, &str)> = deduped
            .iter()
            .map(|e| (e.onset, e.field("trial_name").unwrap()))
            .collect();
        assert_eq!(names, vec![(5.0001, "a"), (5.0002, "b"), (9.0, "a")]);
    }

    #[test]
    fn test_meta_columns_follow_trial_order() {
        let records = vec![
            MarkerEvent::from_marker(1.0, "zeta=1:trial_type=walking:trial_name=w"),
            MarkerEvent::from_marker(2.0, "has_movement=true:alpha=2"),
        ];
        assert_eq!(
            meta_columns(&records),
            vec!["onset", "trial_name", "trial_type", "has_movement", "alpha", "zeta"]
        );
    }
}
