/// Errors that prevent deriving a reference clock.
///
/// All of these invalidate shared state and abort the whole session.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// No stream with samples is available to serve as reference
    #[error("no stream with samples is available as reference clock")]
    NoReferenceCandidate,

    /// The configured reference stream does not exist among supported streams
    #[error("reference stream '{0}' not found")]
    ReferenceNotFound(String),

    /// The configured reference stream has no samples
    #[error("reference stream '{0}' has no samples")]
    EmptyReference(String),
}
