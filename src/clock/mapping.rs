use crate::ingest::ClockOffset;

/// How a [`ClockMapping`] was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// The stream's local clock is the reference clock.
    Reference,
    /// No offset records; local time is taken as reference time.
    IdentityFallback,
    /// Piecewise-linear interpolation of the stream's offset records.
    Offsets,
}

/// Non-decreasing piecewise-linear map from a stream's local clock to the
/// reference clock.
///
/// The map is stored as knots `(local, reference)` with strictly increasing
/// local times and non-decreasing reference times. Between knots it
/// interpolates linearly; outside the knot span it extrapolates with slope 1
/// from the nearest knot.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockMapping {
    kind: MappingKind,
    knots: Vec<(f64, f64)>,
    regressions: usize,
}

impl ClockMapping {
    /// Identity map for the reference stream itself.
    pub fn reference() -> Self {
        Self {
            kind: MappingKind::Reference,
            knots: Vec::new(),
            regressions: 0,
        }
    }

    /// Build a map from offset records in collection order.
    ///
    /// A record is a regression when its collection time does not advance past
    /// the previous knot, when it is not finite, or when it would map to a
    /// reference time earlier than the previous knot. Time regressions and
    /// non-finite records are dropped; value regressions are clamped to the
    /// last valid reference time. Either way the count is kept so the stream
    /// can be flagged as having an unreliable clock.
    pub fn from_offsets(offsets: &[ClockOffset]) -> Self {
        if offsets.is_empty() {
            return Self {
                kind: MappingKind::IdentityFallback,
                knots: Vec::new(),
                regressions: 0,
            };
        }

        let mut knots: Vec<(f64, f64)> = Vec::with_capacity(offsets.len());
        let mut regressions = 0;

        for offset in offsets {
            if !offset.time.is_finite() || !offset.value.is_finite() {
                regressions += 1;
                continue;
            }
            let local = offset.time;
            let mut mapped = offset.time + offset.value;

            if let Some(&(last_local, last_mapped)) = knots.last() {
                if local <= last_local {
                    regressions += 1;
                    continue;
                }
                if mapped < last_mapped {
                    regressions += 1;
                    mapped = last_mapped;
                }
            }
            knots.push((local, mapped));
        }

        let kind = if knots.is_empty() {
            MappingKind::IdentityFallback
        } else {
            MappingKind::Offsets
        };

        Self {
            kind,
            knots,
            regressions,
        }
    }

    /// How this map was derived.
    pub fn kind(&self) -> MappingKind {
        self.kind
    }

    /// Number of offset records that had to be dropped or clamped.
    pub fn regressions(&self) -> usize {
        self.regressions
    }

    /// False when any offset record had to be dropped or clamped.
    pub fn is_reliable(&self) -> bool {
        self.regressions == 0
    }

    /// Knots `(local, reference)` of the map.
    pub fn knots(&self) -> &[(f64, f64)] {
        &self.knots
    }

    /// Map one local timestamp to reference time.
    pub fn map(&self, local: f64) -> f64 {
        let knots = &self.knots;
        let (Some(&(first_t, first_r)), Some(&(last_t, last_r))) = (knots.first(), knots.last())
        else {
            return local;
        };

        if local <= first_t {
            return first_r - (first_t - local);
        }
        if local >= last_t {
            return last_r + (local - last_t);
        }

        // first knot with local time > `local`; 1 <= idx < len here
        let idx = knots.partition_point(|&(t, _)| t <= local);
        let (t0, r0) = knots[idx - 1];
        let (t1, r1) = knots[idx];
        let fraction = (local - t0) / (t1 - t0);
        let mapped = r0 + fraction * (r1 - r0);
        // guard against rounding pushing us outside the segment
        mapped.clamp(r0, r1)
    }

    /// Map a whole timestamp sequence.
    pub fn map_all(&self, timestamps: &[f64]) -> Vec<f64> {
        timestamps.iter().map(|&t| self.map(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_offsets_fall_back_to_identity() {
        let mapping = ClockMapping::from_offsets(&[]);
        assert_eq!(mapping.kind(), MappingKind::IdentityFallback);
        assert!(mapping.is_reliable());
        assert_eq!(mapping.map(12.5), 12.5);
    }

    #[test]
    fn test_single_offset_is_constant_shift() {
        let mapping = ClockMapping::from_offsets(&[ClockOffset::new(10.0, 2.0)]);
        assert_eq!(mapping.kind(), MappingKind::Offsets);
        assert_eq!(mapping.map(0.0), 2.0);
        assert_eq!(mapping.map(20.0), 22.0);
    }

    #[test]
    fn test_interpolates_between_offsets() {
        let mapping = ClockMapping::from_offsets(&[
            ClockOffset::new(0.0, 1.0),
            ClockOffset::new(10.0, 2.0),
        ]);
        assert!((mapping.map(5.0) - 6.5).abs() < 1e-12);
        // extrapolation keeps slope 1 from the end knots
        assert!((mapping.map(-2.0) - -1.0).abs() < 1e-12);
        assert!((mapping.map(12.0) - 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_value_regression_is_clamped_and_flagged() {
        // mapped knots would be 1.0, 10.1, 9.0 (regression), 31.0
        let mapping = ClockMapping::from_offsets(&[
            ClockOffset::new(0.0, 1.0),
            ClockOffset::new(10.0, 0.1),
            ClockOffset::new(10.5, -1.5),
            ClockOffset::new(30.0, 1.0),
        ]);
        assert!(!mapping.is_reliable());
        assert_eq!(mapping.regressions(), 1);
        let held = mapping.knots()[1].1;
        assert_eq!(mapping.knots()[2], (10.5, held));
        assert_eq!(mapping.map(10.25), held);
    }

    #[test]
    fn test_time_regression_is_dropped_and_flagged() {
        let mapping = ClockMapping::from_offsets(&[
            ClockOffset::new(0.0, 1.0),
            ClockOffset::new(5.0, 1.0),
            ClockOffset::new(4.0, 1.0),
            ClockOffset::new(f64::NAN, 1.0),
        ]);
        assert_eq!(mapping.regressions(), 2);
        assert_eq!(mapping.knots().len(), 2);
    }

    #[test]
    fn test_map_is_non_decreasing_across_knots() {
        let mapping = ClockMapping::from_offsets(&[
            ClockOffset::new(0.0, 0.5),
            ClockOffset::new(1.0, -0.4),
            ClockOffset::new(2.0, 0.3),
        ]);
        let mut previous = f64::NEG_INFINITY;
        for i in -100..400 {
            let mapped = mapping.map(i as f64 * 0.01);
            assert!(mapped >= previous);
            previous = mapped;
        }
    }
}
