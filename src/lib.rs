//! # xdf2bids - XDF recordings to BIDS
//!
//! `xdf2bids` converts multi-stream lab-streaming recordings (XDF) into BIDS
//! directory trees: one time-aligned, segmented, annotated file set per
//! modality and run.
//!
//! ## Pipeline
//!
//! - **Classification** ([`classify`]): an ordered rule table assigns every
//!   stream a modality (EEG, motion, eye-tracking, physio, stimulus, events)
//!   or marks it unsupported.
//!
//! - **Clock reconciliation** ([`clock`]): one stream becomes the reference
//!   clock; every other stream is mapped onto it through a monotone
//!   piecewise-linear function built from its clock-offset records.
//!
//! - **Segmentation** ([`segment`]): runs are planned from a marker stream or
//!   as a single run, and each stream is cut into per-run segments.
//!
//! - **Metadata** ([`sidecar`]): channel tables and JSON sidecars with the
//!   sampling rate observed in each segment.
//!
//! - **Writing** ([`bids`]): deterministic, collision-free BIDS names with a
//!   configurable policy for files that already exist.
//!
//! - **Orchestration** ([`convert`]): sequences the stages and folds
//!   per-stream failures into a [`manifest::ConversionManifest`].
//!
//! The XDF container itself is decoded elsewhere; this crate consumes the
//! decoded streams ([`ingest::DecodedSession`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xdf2bids::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let eeg = Stream::numeric(
//!     1,
//!     StreamHeader::new("BioSemi", "EEG", 2, 512.0).with_labels(["Fz", "Cz"]),
//!     vec![0.0, 1.0 / 512.0],
//!     vec![vec![1.0, 2.0], vec![3.0, 4.0]],
//! );
//! let markers = Stream::markers(2, "Markers", [(0.0, "block_start:task=rest")]);
//! let session = DecodedSession::new(vec![eeg, markers]);
//!
//! let mut config = ConversionConfig::new(SessionIdentifiers::new("01", "01", "rest"));
//! config.run_boundary_source = RunBoundarySource::MarkerStream("Markers".into());
//!
//! let manifest = Converter::new(config)?.convert(&session, "bids_root")?;
//! for entry in &manifest.entries {
//!     println!("{} -> {:?}", entry.stream_name, entry.outcome);
//! }
//! # Ok(())
//! # }
//! ```

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod bids;
pub mod classify;
pub mod clock;
pub mod config;
pub mod convert;
pub mod ingest;
pub mod manifest;
pub mod segment;
pub mod sidecar;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::bids::{BidsName, BidsWriter, ConflictPolicy, WriteError};
    pub use crate::classify::{
        ClassificationRule, ClassifiedStream, Classifier, Modality, RuleTable, StreamPredicate,
    };
    pub use crate::clock::{reconcile, ClockError, ClockMapping, ReferenceClock, ReferenceSelector};
    pub use crate::config::{
        ConfigError, ConversionConfig, EmptySegmentPolicy, SessionIdentifiers, TimeOrigin,
    };
    pub use crate::convert::{
        AbortReason, CancelToken, ConversionAborted, Converter, SegmentProgress, Stage,
    };
    pub use crate::ingest::{
        ChannelInfo, ClockOffset, DecodedSession, IngestError, SampleData, Stream, StreamHeader,
    };
    pub use crate::manifest::{ConversionManifest, ConversionStatus, ManifestEntry, Outcome};
    pub use crate::segment::{
        cut_segments, pair_perturbations, plan_runs, Perturbation, Run, RunBoundarySource,
        Segment, SegmentError, SegmentationPolicy,
    };
    pub use crate::sidecar::{synthesize, SidecarRecord};
}
