use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// BIDS modality a stream is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    /// Electroencephalography
    Eeg,
    /// Motion capture, IMUs, force plates
    Motion,
    /// Gaze, pupil and fixation streams
    #[serde(rename = "eyetracking")]
    EyeTracking,
    /// Other physiological recordings (ECG, EMG, EDA, respiration)
    Physio,
    /// Continuous stimulus parameters
    Stimulus,
    /// Marker / event streams
    Events,
    /// Trial metadata streams (`trial_name=...:trial_type=...` records)
    Meta,
    /// No rule matched; excluded from output
    Unsupported,
}

impl Modality {
    /// Every modality that produces output, in a stable order.
    pub const SUPPORTED: [Modality; 7] = [
        Modality::Eeg,
        Modality::Motion,
        Modality::EyeTracking,
        Modality::Physio,
        Modality::Stimulus,
        Modality::Events,
        Modality::Meta,
    ];

    /// BIDS datatype directory under `ses-<label>/`.
    pub fn datatype_dir(&self) -> &'static str {
        match self {
            Modality::Eeg => "eeg",
            Modality::Motion => "motion",
            Modality::EyeTracking
            | Modality::Physio
            | Modality::Stimulus
            | Modality::Events
            | Modality::Meta => "beh",
            Modality::Unsupported => "",
        }
    }

    /// BIDS filename suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Modality::Eeg => "eeg",
            Modality::Motion => "motion",
            Modality::EyeTracking | Modality::Physio => "physio",
            Modality::Stimulus => "stim",
            Modality::Events => "events",
            Modality::Meta => "meta",
            Modality::Unsupported => "",
        }
    }

    /// Default BIDS channel type for channels that declare none.
    pub fn default_channel_type(&self) -> &'static str {
        match self {
            Modality::Eeg => "EEG",
            Modality::Motion => "POS",
            Modality::EyeTracking => "GAZE",
            Modality::Physio
            | Modality::Stimulus
            | Modality::Events
            | Modality::Meta
            | Modality::Unsupported => "MISC",
        }
    }

    /// True for modalities that carry a numeric sample matrix.
    pub fn is_continuous(&self) -> bool {
        !matches!(self, Modality::Events | Modality::Meta | Modality::Unsupported)
    }

    /// Name as used in configuration files and the manifest.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Eeg => "eeg",
            Modality::Motion => "motion",
            Modality::EyeTracking => "eyetracking",
            Modality::Physio => "physio",
            Modality::Stimulus => "stimulus",
            Modality::Events => "events",
            Modality::Meta => "meta",
            Modality::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eeg" => Ok(Modality::Eeg),
            "motion" => Ok(Modality::Motion),
            "eyetracking" | "eye-tracking" => Ok(Modality::EyeTracking),
            "physio" => Ok(Modality::Physio),
            "stimulus" | "stim" => Ok(Modality::Stimulus),
            "events" | "markers" => Ok(Modality::Events),
            "meta" => Ok(Modality::Meta),
            "unsupported" => Ok(Modality::Unsupported),
            other => Err(format!("unknown modality '{other}'")),
        }
    }
}
