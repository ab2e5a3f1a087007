use serde::{Deserialize, Serialize};

use super::Modality;
use crate::ingest::StreamHeader;

/// How a predicate compares header fields against its patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Matching {
    /// Case-insensitive equality
    Exact,
    /// Case-insensitive substring
    #[default]
    Pattern,
}

/// Predicate over a stream header.
///
/// Empty pattern lists match anything; all populated constraints must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamPredicate {
    /// Patterns for the outlet name (any may match)
    pub name: Vec<String>,
    /// Patterns for the content type (any may match)
    #[serde(rename = "type")]
    pub stream_type: Vec<String>,
    /// Comparison mode for `name` and `type`
    pub matching: Matching,
    /// Minimum channel count
    pub min_channels: Option<usize>,
    /// Maximum channel count
    pub max_channels: Option<usize>,
    /// Require a regular (true) or irregular (false) nominal rate
    pub regular_rate: Option<bool>,
}

impl StreamPredicate {
    /// Predicate matching on content type only.
    pub fn by_type<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stream_type: lowercase_all(patterns),
            ..Default::default()
        }
    }

    /// Restrict the outlet name as well.
    pub fn with_name<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name = lowercase_all(patterns);
        self
    }

    /// Switch to exact comparison.
    pub fn exact(mut self) -> Self {
        self.matching = Matching::Exact;
        self
    }

    /// Require a regular or irregular rate.
    pub fn regular(mut self, regular: bool) -> Self {
        self.regular_rate = Some(regular);
        self
    }

    /// Evaluate against a header.
    pub fn matches(&self, header: &StreamHeader) -> bool {
        let name = header.name.to_lowercase();
        let stream_type = header.stream_type.to_lowercase();

        self.field_matches(&self.name, &name)
            && self.field_matches(&self.stream_type, &stream_type)
            && self.min_channels.map_or(true, |min| header.channel_count >= min)
            && self.max_channels.map_or(true, |max| header.channel_count <= max)
            && self
                .regular_rate
                .map_or(true, |regular| regular == !header.is_irregular())
    }

    fn field_matches(&self, patterns: &[String], value: &str) -> bool {
        if patterns.is_empty() {
            return true;
        }
        patterns.iter().any(|p| {
            let p = p.to_lowercase();
            match self.matching {
                Matching::Exact => value == p,
                Matching::Pattern => value.contains(&p),
            }
        })
    }
}

fn lowercase_all<I, S>(patterns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    patterns.into_iter().map(|p| p.into().to_lowercase()).collect()
}

/// One entry of the rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Modality assigned on match
    pub modality: Modality,
    /// Header predicate
    #[serde(flatten)]
    pub predicate: StreamPredicate,
    /// Higher priorities are evaluated first; equal priorities keep
    /// declaration order.
    #[serde(default)]
    pub priority: i32,
    /// Optional label reported in the manifest.
    #[serde(default)]
    pub label: Option<String>,
}

impl ClassificationRule {
    /// Create a rule with priority 0.
    pub fn new(modality: Modality, predicate: StreamPredicate) -> Self {
        Self {
            modality,
            predicate,
            priority: 0,
            label: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the label.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label used in diagnostics.
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.modality.to_string())
    }
}

/// Ordered rule table.
///
/// Rules are stably sorted by descending priority when the table is built, so
/// for equal priorities the rule registered first is evaluated first. That
/// ordering is the tie-break: the outcome never depends on hashing or
/// iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTable {
    rules: Vec<ClassificationRule>,
}

impl RuleTable {
    /// Build a table from rules in declaration order.
    pub fn new(mut rules: Vec<ClassificationRule>) -> Self {
        // sort_by is stable
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// User rules evaluated ahead of the built-in defaults.
    pub fn with_defaults(user_rules: Vec<ClassificationRule>) -> Self {
        let mut rules = user_rules;
        rules.extend(default_rules());
        Self::new(rules)
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// Built-in rules for common Lab Streaming Layer outlets.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(Modality::Meta, StreamPredicate::by_type(["meta"]))
            .labeled("trial-meta"),
        ClassificationRule::new(
            Modality::Meta,
            StreamPredicate::by_type(["marker"]).with_name(["trial_meta"]),
        )
        .labeled("trial-meta"),
        ClassificationRule::new(Modality::Events, StreamPredicate::by_type(["marker", "event"]))
            .labeled("markers"),
        ClassificationRule::new(
            Modality::EyeTracking,
            StreamPredicate::by_type(["gaze", "fixation", "pupil", "eyetrack"]),
        )
        .labeled("eye-tracker"),
        ClassificationRule::new(Modality::Eeg, StreamPredicate::by_type(["eeg"])).labeled("eeg"),
        ClassificationRule::new(
            Modality::Motion,
            StreamPredicate::by_type(["mocap", "motion", "imu", "accelerometer", "force"]),
        )
        .labeled("motion"),
        ClassificationRule::new(
            Modality::Physio,
            StreamPredicate::by_type(["ecg", "emg", "eda", "gsr", "ppg", "resp", "physio"]),
        )
        .labeled("physio"),
        ClassificationRule::new(
            Modality::Stimulus,
            StreamPredicate::by_type(["timeseries", "stim"])
                .with_name(["stim", "vr_bodysway"]),
        )
        .labeled("stimulus"),
    ]
}
