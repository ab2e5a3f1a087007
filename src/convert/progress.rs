/// Position of a conversion, passed to the progress callback after every
/// segment (written, skipped or failed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentProgress {
    /// Stream the segment belongs to
    pub stream_id: u32,
    /// BIDS run index of the segment
    pub run_index: usize,
    /// Segments handled so far, this one included
    pub completed: usize,
    /// Segments the session will produce
    pub total: usize,
}

impl SegmentProgress {
    /// Completed share in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}
