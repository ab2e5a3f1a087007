//! # Writer
//!
//! Serializes segments and their sidecars into the BIDS directory layout:
//!
//! ```text
//! <root>/dataset_description.json
//! <root>/sub-<p>/ses-<s>/sub-<p>_ses-<s>_scans.tsv
//! <root>/sub-<p>/ses-<s>/<datatype>/sub-<p>_ses-<s>_task-<t>[_acq-<a>]_run-<nn>_<suffix>.tsv
//!                                                                       ..._<suffix>.json
//!                                                                       ..._channels.tsv
//! <root>/sub-<p>/ses-<s>/beh/..._run-<nn>_perturbations.{tsv,json}
//! ```
//!
//! Names are a pure function of identifiers, task, acquisition, run and
//! modality, so identical inputs into an empty destination always produce the
//! same tree. Pre-existing files are handled by [`ConflictPolicy`].

mod error;
mod naming;
mod writer;


pub use error::WriteError;
pub use naming::{
    assign_acquisitions, bids_label, session_directory, BidsName, ConflictPolicy, FileKind,
    PERTURBATION_KINDS,
};
pub use writer::{format_value, BidsWriter, DatasetDescription, GeneratedBy, BIDS_VERSION};
