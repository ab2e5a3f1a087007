//! TOML configuration file support.
//!
//! Everything the converter accepts can live in a file, so a study can keep
//! one configuration for all of its sessions:
//!
//! ```toml
//! # xdf2bids.toml
//! reference_stream_selector = "named:BioSemi"
//! run_boundary_source = "marker-stream:Markers"
//! conflict_policy = "version-suffix"
//!
//! [identifiers]
//! participant = "01"
//! session = "01"
//! task = "balance"
//!
//! [[classification_rules]]
//! modality = "stimulus"
//! name = ["vr_bodysway"]
//! priority = 10
//! ```
//!
//! Command-line flags override the file field by field.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use xdf2bids::bids::ConflictPolicy;
use xdf2bids::clock::ReferenceSelector;
use xdf2bids::config::{ConversionConfig, EmptySegmentPolicy, TimeOrigin};
use xdf2bids::segment::RunBoundarySource;

/// Load configuration from a TOML file.
pub fn from_file(path: &Path) -> Result<ConversionConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    from_str(&content)
}

/// Parse configuration from a TOML string.
pub fn from_str(content: &str) -> Result<ConversionConfig> {
    toml::from_str(content).context("Failed to parse TOML configuration")
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub participant: Option<String>,
    pub session: Option<String>,
    pub task: Option<String>,
    pub reference: Option<ReferenceSelector>,
    pub boundaries: Option<RunBoundarySource>,
    pub conflict: Option<ConflictPolicy>,
    pub time_origin: Option<TimeOrigin>,
    pub boundary_pattern: Option<String>,
    pub strict: bool,
    pub skip_empty: bool,
    pub no_time_column: bool,
}

impl Overrides {
    /// Start from `file` (or defaults) and apply the overrides.
    pub fn resolve(self, file: Option<&PathBuf>) -> Result<ConversionConfig> {
        let mut config = match file {
            Some(path) => from_file(path)?,
            None => ConversionConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(self, config: &mut ConversionConfig) {
        if let Some(participant) = self.participant {
            config.identifiers.participant = participant;
        }
        if let Some(session) = self.session {
            config.identifiers.session = session;
        }
        if let Some(task) = self.task {
            config.identifiers.task = task;
        }
        if let Some(reference) = self.reference {
            config.reference_stream_selector = reference;
        }
        if let Some(boundaries) = self.boundaries {
            config.run_boundary_source = boundaries;
        }
        if let Some(conflict) = self.conflict {
            config.conflict_policy = conflict;
        }
        if let Some(origin) = self.time_origin {
            config.time_origin = origin;
        }
        if self.boundary_pattern.is_some() {
            config.boundary_pattern = self.boundary_pattern;
        }
        if self.strict {
            config.strict_unsupported = true;
        }
        if self.skip_empty {
            config.empty_segments = EmptySegmentPolicy::Skip;
        }
        if self.no_time_column {
            config.include_time_column = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            reference_stream_selector = "named:BioSemi"
            conflict_policy = "overwrite"

            [identifiers]
            participant = "03"
            session = "02"
            task = "sway"
        "#;

        let config = from_str(toml).unwrap();
        assert_eq!(config.identifiers.participant, "03");
        assert_eq!(config.conflict_policy, ConflictPolicy::Overwrite);
        assert_eq!(
            config.reference_stream_selector,
            ReferenceSelector::Named("BioSemi".into())
        );
    }

    #[test]
    fn test_empty_config() {
        let config = from_str("").unwrap();
        assert_eq!(config, ConversionConfig::default());
    }

    #[test]
    fn test_bad_value_is_an_error() {
        assert!(from_str(r#"conflict_policy = "merge""#).is_err());
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut config = from_str(
            r#"
            conflict_policy = "overwrite"
            [identifiers]
            participant = "03"
            session = "02"
            "#,
        )
        .unwrap();

        Overrides {
            participant: Some("04".into()),
            conflict: Some(ConflictPolicy::Fail),
            skip_empty: true,
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.identifiers.participant, "04");
        assert_eq!(config.identifiers.session, "02");
        assert_eq!(config.conflict_policy, ConflictPolicy::Fail);
        assert_eq!(config.empty_segments, EmptySegmentPolicy::Skip);
        assert!(config.include_time_column);
    }
}
