use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info};
use serde::Serialize;
use tempfile::NamedTempFile;

use super::error::WriteError;
use super::naming::{session_directory, BidsName, ConflictPolicy, FileKind, PERTURBATION_KINDS};
use crate::config::SessionIdentifiers;
use crate::segment::{MarkerEvent, Perturbation, Segment, SegmentData};
use crate::sidecar::{ChannelRow, Descriptor, SidecarRecord, PERTURBATION_COLUMNS};

/// BIDS version declared in `dataset_description.json`.
pub const BIDS_VERSION: &str = "1.9.0";

const MISSING: &str = "n/a";

/// Contents of `dataset_description.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetDescription {
    /// Dataset name
    pub name: String,
    /// BIDS version
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    /// Always `raw`
    pub dataset_type: String,
    /// Producing software
    pub generated_by: Vec<GeneratedBy>,
}

/// One `GeneratedBy` entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GeneratedBy {
    /// Software name
    pub name: String,
    /// Software version
    pub version: String,
}

impl DatasetDescription {
    /// Description naming this converter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bids_version: BIDS_VERSION.to_string(),
            dataset_type: "raw".to_string(),
            generated_by: vec![GeneratedBy {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }],
        }
    }
}

/// Writes one session's segments into a BIDS tree.
///
/// The writer is the single owner of the destination: it resolves conflicts,
/// remembers every path it has produced so two segments of one conversion can
/// never land on the same file, and collects the rows of the session's scans
/// file. Each file is written to a temporary file in its target directory and
/// then moved into place, so a failed write never leaves a truncated file.
#[derive(Debug)]
pub struct BidsWriter {
    root: PathBuf,
    participant: String,
    session: String,
    policy: ConflictPolicy,
    claimed: HashSet<PathBuf>,
    scans: BTreeMap<String, String>,
}

impl BidsWriter {
    /// Create a writer rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P, identifiers: &SessionIdentifiers, policy: ConflictPolicy) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            participant: identifiers.participant.clone(),
            session: identifiers.session.clone(),
            policy,
            claimed: HashSet::new(),
            scans: BTreeMap::new(),
        }
    }

    /// Dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Conflict policy in effect.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Write the data file and sidecars of one segment.
    ///
    /// `origin` is subtracted from reference times before they are written.
    /// Returns the written paths relative to the root, data file first. When
    /// a later file of the group fails, the error is
    /// [`WriteError::Incomplete`] and lists the files already in place.
    pub fn write_segment(
        &mut self,
        name: &BidsName,
        segment: &Segment,
        record: &SidecarRecord,
        origin: f64,
        acq_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<PathBuf>, WriteError> {
        let kinds = name.kinds();
        let version = self.resolve_version(name, kinds)?;

        let mut files = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let bytes = match kind {
                FileKind::Data => data_tsv(segment, record, origin)?,
                FileKind::Sidecar => json_bytes(&record.descriptor)?,
                FileKind::Channels => channels_tsv(&record.channels)?,
                FileKind::Perturbations | FileKind::PerturbationsSidecar => continue,
            };
            files.push((name.path(kind, version), bytes));
        }

        fs::create_dir_all(self.root.join(name.directory()))?;
        let result = self.commit_group(files);

        // the data file is committed first
        let data_written = match &result {
            Ok(_) => true,
            Err(e) => !e.written_paths().is_empty(),
        };
        if data_written && name.modality.is_continuous() {
            let in_session = Path::new(name.modality.datatype_dir())
                .join(name.file_name(FileKind::Data, version));
            self.scans.insert(
                to_slash(&in_session),
                acq_time.map_or_else(|| MISSING.to_string(), format_acq_time),
            );
        }
        result
    }

    /// Write the perturbations of one run next to its events file.
    ///
    /// Returns the written paths relative to the root, table first.
    pub fn write_perturbations(
        &mut self,
        name: &BidsName,
        perturbations: &[Perturbation],
        descriptor: &Descriptor,
        origin: f64,
    ) -> Result<Vec<PathBuf>, WriteError> {
        let version = self.resolve_version(name, &PERTURBATION_KINDS)?;
        let files = vec![
            (
                name.path(FileKind::Perturbations, version),
                perturbations_tsv(perturbations, origin)?,
            ),
            (
                name.path(FileKind::PerturbationsSidecar, version),
                json_bytes(descriptor)?,
            ),
        ];

        fs::create_dir_all(self.root.join(name.directory()))?;
        self.commit_group(files)
    }

    /// Commit files in order, stopping at the first failure.
    fn commit_group(&mut self, files: Vec<(PathBuf, Vec<u8>)>) -> Result<Vec<PathBuf>, WriteError> {
        let clobber = self.policy == ConflictPolicy::Overwrite;
        let mut written = Vec::with_capacity(files.len());
        for (path, bytes) in files {
            if let Err(source) = self.commit(&path, &bytes, clobber) {
                if written.is_empty() {
                    return Err(source);
                }
                return Err(WriteError::Incomplete {
                    written,
                    source: Box::new(source),
                });
            }
            debug!("Wrote {}", path.display());
            self.claimed.insert(path.clone());
            written.push(path);
        }
        Ok(written)
    }

    /// Pick the version for a file group under the conflict policy.
    fn resolve_version(&self, name: &BidsName, kinds: &[FileKind]) -> Result<Option<u32>, WriteError> {
        for &kind in kinds {
            let path = name.path(kind, None);
            if self.claimed.contains(&path) {
                return Err(WriteError::InternalCollision { path });
            }
        }

        let occupied = |version: Option<u32>| {
            kinds.iter().find_map(|&kind| {
                let path = name.path(kind, version);
                (self.claimed.contains(&path) || self.root.join(&path).exists()).then_some(path)
            })
        };

        match (self.policy, occupied(None)) {
            (_, None) | (ConflictPolicy::Overwrite, Some(_)) => Ok(None),
            (ConflictPolicy::Fail, Some(path)) => Err(WriteError::Conflict { path }),
            (ConflictPolicy::VersionSuffix, Some(_)) => {
                let mut n = 2;
                while occupied(Some(n)).is_some() {
                    n += 1;
                }
                info!("Existing output for {}; writing version {n}", name.stem());
                Ok(Some(n))
            }
        }
    }

    /// Move `bytes` into place at `relative` through a temporary file.
    fn commit(&self, relative: &Path, bytes: &[u8], clobber: bool) -> Result<(), WriteError> {
        let target = self.root.join(relative);
        let dir = target.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        let persisted = if clobber {
            tmp.persist(&target)
        } else {
            tmp.persist_noclobber(&target)
        };
        persisted.map(|_| ()).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                WriteError::Conflict {
                    path: relative.to_path_buf(),
                }
            } else {
                WriteError::Persist {
                    path: target,
                    source: e.error,
                }
            }
        })
    }

    /// Write `dataset_description.json` unless one already exists.
    ///
    /// Returns the relative path when a file was written.
    pub fn write_dataset_description(&self, dataset_name: &str) -> Result<Option<PathBuf>, WriteError> {
        let relative = PathBuf::from("dataset_description.json");
        if self.root.join(&relative).exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.root)?;
        let bytes = json_bytes(&DatasetDescription::new(dataset_name))?;
        match self.commit(&relative, &bytes, false) {
            Ok(()) => Ok(Some(relative)),
            // another session created it first
            Err(WriteError::Conflict { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the session's scans file, merged with any existing rows.
    ///
    /// Returns `None` when no data file was written and no scans file exists.
    pub fn write_scans(&self) -> Result<Option<PathBuf>, WriteError> {
        let session_dir = session_directory(&self.participant, &self.session);
        let relative = session_dir.join(format!(
            "sub-{}_ses-{}_scans.tsv",
            self.participant, self.session
        ));
        let target = self.root.join(&relative);

        let mut rows = BTreeMap::new();
        if target.exists() {
            let mut reader = ReaderBuilder::new().delimiter(b'\t').from_path(&target)?;
            for record in reader.records() {
                let record = record?;
                if let Some(file) = record.get(0) {
                    rows.insert(file.to_string(), record.get(1).unwrap_or(MISSING).to_string());
                }
            }
        } else if self.scans.is_empty() {
            return Ok(None);
        }
        rows.extend(self.scans.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut writer = tsv_writer();
        writer.write_record(["filename", "acq_time"])?;
        for (file, acq_time) in &rows {
            writer.write_record([file.as_str(), acq_time.as_str()])?;
        }
        let bytes = finish(writer)?;

        fs::create_dir_all(self.root.join(&session_dir))?;
        self.commit(&relative, &bytes, true)?;
        Ok(Some(relative))
    }
}

fn tsv_writer() -> csv::Writer<Vec<u8>> {
    WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, WriteError> {
    writer.into_inner().map_err(|e| WriteError::Io(e.into_error()))
}

fn json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, WriteError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn format_time(t: f64) -> String {
    format!("{t:.6}")
}

/// Sample value as written; NaN is BIDS `n/a`.
pub fn format_value(v: f64) -> String {
    if v.is_nan() {
        MISSING.to_string()
    } else {
        v.to_string()
    }
}

fn format_acq_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn data_tsv(segment: &Segment, record: &SidecarRecord, origin: f64) -> Result<Vec<u8>, WriteError> {
    let mut writer = tsv_writer();
    writer.write_record(&record.columns)?;

    match &segment.data {
        SegmentData::Numeric(rows) => {
            let with_time = record.columns.len() > record.channels.len();
            for (t, row) in segment.reference_times.iter().zip(rows) {
                let mut fields = Vec::with_capacity(row.len() + 1);
                if with_time {
                    fields.push(format_time(t - origin));
                }
                fields.extend(row.iter().copied().map(format_value));
                writer.write_record(&fields)?;
            }
        }
        SegmentData::Events(events) => {
            for event in events {
                let fields: Vec<String> = record
                    .columns
                    .iter()
                    .map(|column| event_cell(event, column, origin))
                    .collect();
                writer.write_record(&fields)?;
            }
        }
    }
    finish(writer)
}

/// One cell of an events or meta row.
fn event_cell(event: &MarkerEvent, column: &str, origin: f64) -> String {
    match column {
        "onset" => format_time(event.onset - origin),
        "duration" => event.duration.map_or_else(|| MISSING.to_string(), format_time),
        "label" => event.label.clone(),
        "value" => event.value.clone(),
        key => event.field(key).unwrap_or(MISSING).to_string(),
    }
}

fn perturbations_tsv(perturbations: &[Perturbation], origin: f64) -> Result<Vec<u8>, WriteError> {
    let mut writer = tsv_writer();
    writer.write_record(PERTURBATION_COLUMNS)?;
    for p in perturbations {
        writer.write_record([
            format_time(p.onset - origin),
            format_time(p.duration),
            "perturbation".to_string(),
            p.marker.clone(),
        ])?;
    }
    finish(writer)
}

fn channels_tsv(channels: &[ChannelRow]) -> Result<Vec<u8>, WriteError> {
    let mut writer = tsv_writer();
    writer.write_record(["name", "type", "units", "sampling_frequency"])?;
    for channel in channels {
        let rate = channel
            .sampling_frequency
            .map_or_else(|| MISSING.to_string(), |r| r.to_string());
        writer.write_record([
            channel.name.as_str(),
            channel.channel_type.as_str(),
            channel.units.as_str(),
            rate.as_str(),
        ])?;
    }
    finish(writer)
}
