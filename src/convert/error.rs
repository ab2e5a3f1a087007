use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::ClockError;
use crate::ingest::IngestError;
use crate::manifest::ConversionManifest;
use crate::segment::SegmentError;

/// Pipeline stage, as reported in aborts and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Reading the decoded session
    Decoding,
    /// Assigning modalities
    Classifying,
    /// Building the reference clock
    Reconciling,
    /// Planning runs and cutting segments
    Segmenting,
    /// Writing files
    Writing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Decoding => "decoding",
            Stage::Classifying => "classifying",
            Stage::Reconciling => "reconciling",
            Stage::Segmenting => "segmenting",
            Stage::Writing => "writing",
        })
    }
}

/// Whole-session failures.
#[derive(Debug, thiserror::Error)]
pub enum AbortReason {
    /// The decoded session could not be read
    #[error("undecodable input: {0}")]
    Decode(#[from] IngestError),

    /// No reference clock could be derived
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// Run boundaries are inconsistent
    #[error(transparent)]
    Segmentation(#[from] SegmentError),

    /// Strict mode and at least one stream is unsupported
    #[error("unsupported stream(s) {stream_ids:?} with strict_unsupported enabled")]
    UnsupportedStreams {
        /// Ids of the unsupported streams
        stream_ids: Vec<u32>,
    },
}

/// A conversion stopped by a whole-session failure.
///
/// Carries the manifest as it stood when the failure occurred.
#[derive(Debug, thiserror::Error)]
#[error("conversion aborted while {stage}: {reason}")]
pub struct ConversionAborted {
    /// Stage that failed
    pub stage: Stage,
    /// What went wrong
    #[source]
    pub reason: AbortReason,
    /// Manifest-so-far, with status `aborted`
    pub manifest: ConversionManifest,
}
