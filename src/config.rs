//! Per-conversion configuration.
//!
//! Everything the engine needs arrives through [`ConversionConfig`]; nothing is
//! read from process-wide state, so independent conversions can run side by
//! side. The structure deserializes from TOML/JSON:
//!
//! ```toml
//! reference_stream_selector = "highest-rate"
//! run_boundary_source = "marker-stream:Markers"
//! conflict_policy = "fail"
//!
//! [identifiers]
//! participant = "01"
//! session = "01"
//! task = "balance"
//!
//! [[classification_rules]]
//! modality = "motion"
//! name = ["wii"]
//! type = ["mocap"]
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bids::ConflictPolicy;
use crate::classify::{ClassificationRule, RuleTable};
use crate::clock::ReferenceSelector;
use crate::segment::{DurationAnchor, RunBoundarySource, SegmentationPolicy};

/// Errors in a conversion configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A BIDS label is empty or contains non-alphanumeric characters
    #[error("invalid {entity} label '{value}': BIDS labels must be non-empty and alphanumeric")]
    InvalidLabel {
        /// Entity name (participant, session, task)
        entity: &'static str,
        /// Rejected value
        value: String,
    },

    /// The rule table is empty
    #[error("classification rule table is empty")]
    EmptyRuleTable,

    /// A rule has no constraints and would match every stream
    #[error("classification rule {index} ({modality}) has no constraints")]
    UnconstrainedRule {
        /// Position in the user rule list
        index: usize,
        /// Modality of the rule
        modality: String,
    },
}

/// Participant, session and default task labels for one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentifiers {
    /// `sub-<participant>`
    pub participant: String,
    /// `ses-<session>`
    pub session: String,
    /// `task-<task>` for runs whose markers name no task
    #[serde(default = "default_task")]
    pub task: String,
}

fn default_task() -> String {
    "default".to_string()
}

impl Default for SessionIdentifiers {
    fn default() -> Self {
        Self {
            participant: "01".to_string(),
            session: "01".to_string(),
            task: default_task(),
        }
    }
}

impl SessionIdentifiers {
    /// Create identifiers.
    pub fn new(
        participant: impl Into<String>,
        session: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            participant: participant.into(),
            session: session.into(),
            task: task.into(),
        }
    }

    /// Check every label against the BIDS label rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (entity, value) in [
            ("participant", &self.participant),
            ("session", &self.session),
            ("task", &self.task),
        ] {
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigError::InvalidLabel {
                    entity,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Origin of written time columns and event onsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeOrigin {
    /// Seconds since the start of the run
    #[default]
    RunStart,
    /// Seconds since the first reference-stream sample
    SessionStart,
    /// Reference-clock seconds as recorded
    Absolute,
}

impl TimeOrigin {
    /// Description written into sidecars.
    pub fn description(&self) -> &'static str {
        match self {
            TimeOrigin::RunStart => "seconds relative to the start of the run",
            TimeOrigin::SessionStart => "seconds relative to the start of the reference stream",
            TimeOrigin::Absolute => "reference-clock timestamps as recorded",
        }
    }
}

impl fmt::Display for TimeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeOrigin::RunStart => "run-start",
            TimeOrigin::SessionStart => "session-start",
            TimeOrigin::Absolute => "absolute",
        })
    }
}

impl FromStr for TimeOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "run-start" => Ok(TimeOrigin::RunStart),
            "session-start" => Ok(TimeOrigin::SessionStart),
            "absolute" => Ok(TimeOrigin::Absolute),
            other => Err(format!("unknown time origin '{other}'")),
        }
    }
}

/// What to do with a run that contains no samples of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptySegmentPolicy {
    /// Write a header-only data file and its sidecars
    #[default]
    WriteEmpty,
    /// Write nothing and record the reason
    Skip,
}

/// Complete configuration of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Participant / session / task labels
    pub identifiers: SessionIdentifiers,
    /// User classification rules, evaluated before the defaults
    pub classification_rules: Vec<ClassificationRule>,
    /// Append the built-in rule table after the user rules
    pub use_default_rules: bool,
    /// Reference stream selection
    pub reference_stream_selector: ReferenceSelector,
    /// Run boundary source
    pub run_boundary_source: RunBoundarySource,
    /// Existing-file policy
    pub conflict_policy: ConflictPolicy,
    /// Abort the session when any stream is unsupported
    pub strict_unsupported: bool,
    /// Empty segment handling
    pub empty_segments: EmptySegmentPolicy,
    /// Emit a run before the first boundary marker
    pub include_pre_roll: bool,
    /// Emit a run after the last boundary marker
    pub include_tail: bool,
    /// Only markers containing this text are run boundaries
    pub boundary_pattern: Option<String>,
    /// Anchor of duration-bearing boundary markers
    pub duration_anchor: DurationAnchor,
    /// Origin of time columns and onsets
    pub time_origin: TimeOrigin,
    /// Prepend a `time` column to data files
    pub include_time_column: bool,
    /// `Name` in dataset_description.json
    pub dataset_name: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            identifiers: SessionIdentifiers::default(),
            classification_rules: Vec::new(),
            use_default_rules: true,
            reference_stream_selector: ReferenceSelector::HighestRate,
            run_boundary_source: RunBoundarySource::SingleRun,
            conflict_policy: ConflictPolicy::Fail,
            strict_unsupported: false,
            empty_segments: EmptySegmentPolicy::WriteEmpty,
            include_pre_roll: false,
            include_tail: true,
            boundary_pattern: None,
            duration_anchor: DurationAnchor::End,
            time_origin: TimeOrigin::RunStart,
            include_time_column: true,
            dataset_name: "XDF recordings".to_string(),
        }
    }
}

impl ConversionConfig {
    /// Defaults with the given identifiers.
    pub fn new(identifiers: SessionIdentifiers) -> Self {
        Self {
            identifiers,
            ..Default::default()
        }
    }

    /// Validate labels and rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.identifiers.validate()?;

        for (index, rule) in self.classification_rules.iter().enumerate() {
            let p = &rule.predicate;
            let unconstrained = p.name.is_empty()
                && p.stream_type.is_empty()
                && p.min_channels.is_none()
                && p.max_channels.is_none()
                && p.regular_rate.is_none();
            if unconstrained {
                return Err(ConfigError::UnconstrainedRule {
                    index,
                    modality: rule.modality.to_string(),
                });
            }
        }

        if self.classification_rules.is_empty() && !self.use_default_rules {
            return Err(ConfigError::EmptyRuleTable);
        }
        Ok(())
    }

    /// The rule table this configuration describes.
    pub fn rule_table(&self) -> RuleTable {
        if self.use_default_rules {
            RuleTable::with_defaults(self.classification_rules.clone())
        } else {
            RuleTable::new(self.classification_rules.clone())
        }
    }

    /// The segmentation policy this configuration describes.
    pub fn segmentation_policy(&self) -> SegmentationPolicy {
        SegmentationPolicy {
            source: self.run_boundary_source.clone(),
            include_pre_roll: self.include_pre_roll,
            include_tail: self.include_tail,
            boundary_pattern: self.boundary_pattern.clone(),
            duration_anchor: self.duration_anchor,
        }
    }
}
