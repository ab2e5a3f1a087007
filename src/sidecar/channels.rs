use std::collections::HashSet;

use serde::Serialize;

use crate::classify::Modality;
use crate::ingest::StreamHeader;

/// Name of the time column prepended to data files.
pub const TIME_COLUMN: &str = "time";

/// Replacement for a data channel that would collide with [`TIME_COLUMN`].
pub const RENAMED_TIME_CHANNEL: &str = "trial_time";

/// One row of `_channels.tsv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRow {
    /// Unique channel label
    pub name: String,
    /// BIDS channel type
    #[serde(rename = "type")]
    pub channel_type: String,
    /// Measurement unit, `n/a` when unknown
    pub units: String,
    /// Nominal rate as recorded; `None` for irregular streams
    pub sampling_frequency: Option<f64>,
}

/// Resolve the output label of every channel.
///
/// Missing labels become `Channel_<n>`. With a time column, a channel named
/// `time` becomes `trial_time`. Remaining duplicates are disambiguated by
/// [`disambiguate_labels`]. Every rename is reported as a warning.
pub fn resolve_labels(header: &StreamHeader, include_time_column: bool) -> (Vec<String>, Vec<String>) {
    let mut warnings = Vec::new();

    let labels: Vec<String> = (0..header.channel_count)
        .map(|i| {
            let declared = header
                .channels
                .get(i)
                .and_then(|c| c.label.as_deref())
                .map(str::trim)
                .filter(|l| !l.is_empty());
            match declared {
                Some(label) if include_time_column && label.eq_ignore_ascii_case(TIME_COLUMN) => {
                    warnings.push(format!(
                        "channel {} label '{label}' renamed to '{RENAMED_TIME_CHANNEL}' to avoid the time column",
                        i + 1
                    ));
                    RENAMED_TIME_CHANNEL.to_string()
                }
                Some(label) => label.to_string(),
                None => format!("Channel_{}", i + 1),
            }
        })
        .collect();

    let (labels, mut renamed) = disambiguate_labels(labels);
    warnings.append(&mut renamed);
    (labels, warnings)
}

/// Make labels unique by appending `-<k>` to repeats, in channel order.
///
/// The first occurrence keeps its label; the k-th repeat becomes
/// `<label>-<k>`, skipping any suffix that is already a label.
pub fn disambiguate_labels(labels: Vec<String>) -> (Vec<String>, Vec<String>) {
    let original: HashSet<String> = labels.iter().cloned().collect();
    let mut used: HashSet<String> = HashSet::with_capacity(labels.len());
    let mut warnings = Vec::new();

    let unique = labels
        .into_iter()
        .enumerate()
        .map(|(position, label)| {
            if used.insert(label.clone()) {
                return label;
            }
            let mut k = 1;
            let candidate = loop {
                let candidate = format!("{label}-{k}");
                if !original.contains(&candidate) && !used.contains(&candidate) {
                    break candidate;
                }
                k += 1;
            };
            used.insert(candidate.clone());
            warnings.push(format!(
                "duplicate channel label '{label}' at channel {} renamed to '{candidate}'",
                position + 1
            ));
            candidate
        })
        .collect();

    (unique, warnings)
}

/// Build the channel table rows for a header with resolved labels.
pub fn channel_rows(header: &StreamHeader, modality: Modality, labels: &[String]) -> Vec<ChannelRow> {
    let sampling_frequency = (!header.is_irregular()).then_some(header.nominal_srate);
    labels
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let info = header.channels.get(i);
            let channel_type = info
                .and_then(|c| c.channel_type.as_deref())
                .filter(|t| !t.trim().is_empty())
                .map(|t| t.trim().to_uppercase())
                .unwrap_or_else(|| modality.default_channel_type().to_string());
            let units = info
                .and_then(|c| c.unit.as_deref())
                .or(header.unit.as_deref())
                .filter(|u| !u.trim().is_empty())
                .unwrap_or("n/a")
                .to_string();
            ChannelRow {
                name: name.clone(),
                channel_type,
                units,
                sampling_frequency,
            }
        })
        .collect()
}
