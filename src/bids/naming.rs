use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::Modality;
use crate::config::SessionIdentifiers;

/// Handling of output paths that already exist in the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Replace the existing file
    Overwrite,
    /// Leave the existing file alone and fail the segment
    #[default]
    Fail,
    /// Write alongside with the smallest free `_v<N>` suffix
    VersionSuffix,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Fail => "fail",
            ConflictPolicy::VersionSuffix => "version-suffix",
        })
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "fail" => Ok(ConflictPolicy::Fail),
            "version-suffix" => Ok(ConflictPolicy::VersionSuffix),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected overwrite, fail or version-suffix)"
            )),
        }
    }
}

/// Files produced for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// `_<suffix>.tsv`
    Data,
    /// `_<suffix>.json`
    Sidecar,
    /// `_channels.tsv`
    Channels,
    /// `_perturbations.tsv`
    Perturbations,
    /// `_perturbations.json`
    PerturbationsSidecar,
}

/// Files of a perturbations group.
pub const PERTURBATION_KINDS: [FileKind; 2] = [FileKind::Perturbations, FileKind::PerturbationsSidecar];

/// BIDS entities of one output file group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsName {
    /// `sub-` label
    pub participant: String,
    /// `ses-` label
    pub session: String,
    /// `task-` label
    pub task: String,
    /// `acq-` label, set when streams would otherwise collide
    pub acquisition: Option<String>,
    /// `run-` index (1-based)
    pub run: usize,
    /// Output modality
    pub modality: Modality,
}

impl BidsName {
    /// Name for one run of one stream.
    pub fn new(
        identifiers: &SessionIdentifiers,
        task: impl Into<String>,
        acquisition: Option<String>,
        run: usize,
        modality: Modality,
    ) -> Self {
        Self {
            participant: identifiers.participant.clone(),
            session: identifiers.session.clone(),
            task: task.into(),
            acquisition,
            run,
            modality,
        }
    }

    /// `sub-<p>_ses-<s>_task-<t>[_acq-<a>]_run-<nn>`
    pub fn stem(&self) -> String {
        let mut stem = format!("sub-{}_ses-{}_task-{}", self.participant, self.session, self.task);
        if let Some(acq) = &self.acquisition {
            stem.push_str("_acq-");
            stem.push_str(acq);
        }
        stem.push_str(&format!("_run-{:02}", self.run));
        stem
    }

    /// `sub-<p>/ses-<s>/<datatype>`, relative to the dataset root.
    pub fn directory(&self) -> PathBuf {
        session_directory(&self.participant, &self.session).join(self.modality.datatype_dir())
    }

    /// File kinds written for this modality.
    pub fn kinds(&self) -> &'static [FileKind] {
        if !self.modality.is_continuous() {
            &[FileKind::Data, FileKind::Sidecar]
        } else {
            &[FileKind::Data, FileKind::Sidecar, FileKind::Channels]
        }
    }

    /// File name of one kind, with an optional `_v<N>` version.
    pub fn file_name(&self, kind: FileKind, version: Option<u32>) -> String {
        let mut stem = self.stem();
        if let Some(n) = version {
            stem.push_str(&format!("_v{n}"));
        }
        match kind {
            FileKind::Data => format!("{stem}_{}.tsv", self.modality.suffix()),
            FileKind::Sidecar => format!("{stem}_{}.json", self.modality.suffix()),
            FileKind::Channels => format!("{stem}_channels.tsv"),
            FileKind::Perturbations => format!("{stem}_perturbations.tsv"),
            FileKind::PerturbationsSidecar => format!("{stem}_perturbations.json"),
        }
    }

    /// Relative path of one kind.
    pub fn path(&self, kind: FileKind, version: Option<u32>) -> PathBuf {
        self.directory().join(self.file_name(kind, version))
    }
}

/// `sub-<p>/ses-<s>`
pub fn session_directory(participant: &str, session: &str) -> PathBuf {
    PathBuf::from(format!("sub-{participant}")).join(format!("ses-{session}"))
}

/// Reduce a free-form name to a BIDS label (ASCII alphanumerics only).
pub fn bids_label(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Assign `acq-` labels to streams that share a datatype directory and suffix.
///
/// Input is `(stream id, stream name, modality)` in stream order. Streams
/// alone in their group get `None`. Otherwise the label is the sanitized
/// stream name, with the stream id appended when that is empty or repeats
/// within the group.
pub fn assign_acquisitions(streams: &[(u32, &str, Modality)]) -> BTreeMap<u32, Option<String>> {
    let mut groups: BTreeMap<(&'static str, &'static str), Vec<(u32, &str)>> = BTreeMap::new();
    for &(id, name, modality) in streams {
        groups
            .entry((modality.datatype_dir(), modality.suffix()))
            .or_default()
            .push((id, name));
    }

    let mut assigned = BTreeMap::new();
    for members in groups.into_values() {
        if members.len() == 1 {
            assigned.insert(members[0].0, None);
            continue;
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for (_, name) in &members {
            *counts.entry(bids_label(name)).or_default() += 1;
        }

        let mut used = HashSet::new();
        for (id, name) in members {
            let base = bids_label(name);
            let mut label = if base.is_empty() || counts[&base] > 1 {
                format!("{base}{id}")
            } else {
                base
            };
            if label.is_empty() || !used.insert(label.clone()) {
                label = format!("stream{id}");
                used.insert(label.clone());
            }
            assigned.insert(id, Some(label));
        }
    }
    assigned
}
