/// Errors in run planning.
///
/// Run definitions are shared by every modality, so any of these aborts the
/// whole session.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Two interval markers describe overlapping runs
    #[error(
        "overlapping run boundaries: '{first}' ends at {first_end:.6}s but '{second}' starts at {second_start:.6}s"
    )]
    OverlappingRuns {
        /// Marker of the earlier run
        first: String,
        /// End of the earlier run
        first_end: f64,
        /// Marker of the later run
        second: String,
        /// Start of the later run
        second_start: f64,
    },

    /// A marker declared a non-positive duration
    #[error("marker '{marker}' declares a non-positive duration ({duration})")]
    InvalidDuration {
        /// Offending marker text
        marker: String,
        /// Parsed duration
        duration: f64,
    },
}
