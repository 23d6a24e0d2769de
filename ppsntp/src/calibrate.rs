//! Automatic derivation of the fudge from observed offsets ("rebase")

use crate::time::Fudge;

/// Owner of the fudge applied to every capture.
///
/// When rebasing is enabled, the first `rebase_count` raw nanosecond offsets
/// are averaged and the fudge is replaced, once, by the correction that
/// cancels that average. This is useful with a pulse source that is not
/// aligned to UTC seconds, e.g. a free running TCXO.
#[derive(Debug, Clone)]
pub struct FudgeCalibrator {
    fudge: Fudge,
    rebase: Option<RebaseState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RebaseState {
    target: i64,
    count: i64,
    total_nanos: i64,
}

impl FudgeCalibrator {
    /// Create a calibrator starting out with `initial`. A `rebase_count` of
    /// zero or less disables rebasing and keeps `initial` forever.
    pub fn new(initial: Fudge, rebase_count: i64) -> Self {
        let rebase = (rebase_count > 0).then_some(RebaseState {
            target: rebase_count,
            count: 0,
            total_nanos: 0,
        });

        Self {
            fudge: initial,
            rebase,
        }
    }

    /// The fudge currently in effect
    pub fn fudge(&self) -> Fudge {
        self.fudge
    }

    /// Whether the next call to [`observe`](Self::observe) will still be
    /// consumed by the calibration
    pub fn is_calibrating(&self) -> bool {
        self.rebase.is_some()
    }

    /// Samples collected so far and samples needed, while calibrating
    pub fn progress(&self) -> Option<(i64, i64)> {
        self.rebase.map(|state| (state.count, state.target))
    }

    /// Feed the nanosecond part of a raw capture.
    ///
    /// Returns `true` when the sample was consumed by the calibration, in
    /// which case it must not be published. The sample that completes the
    /// calibration is consumed as well; from the next call onward this
    /// always returns `false`.
    pub fn observe(&mut self, raw_nanos: i64) -> bool {
        let Some(state) = self.rebase.as_mut() else {
            return false;
        };

        state.total_nanos += raw_nanos;
        state.count += 1;
        log::trace!("rebase sample {}/{}: {raw_nanos}ns", state.count, state.target);

        if state.count >= state.target {
            let average = state.total_nanos / state.target;
            self.fudge = Fudge::cancelling(average);
            self.rebase = None;
            log::info!("rebasing to {average}ns, fudge is now {}", self.fudge);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebase_averages_first_samples() {
        let mut calibrator = FudgeCalibrator::new(Fudge::ZERO, 3);

        assert!(calibrator.observe(100_000_000));
        assert!(calibrator.observe(200_000_000));
        assert_eq!(calibrator.progress(), Some((2, 3)));
        assert!(calibrator.observe(300_000_000));

        assert_eq!(calibrator.fudge(), Fudge::new(0, -200_000_000));
        assert!(!calibrator.is_calibrating());
        assert_eq!(calibrator.progress(), None);
    }

    #[test]
    fn fudge_frozen_after_rebase() {
        let mut calibrator = FudgeCalibrator::new(Fudge::from_micros(10), 1);

        assert!(calibrator.observe(400_000_000));
        assert_eq!(calibrator.fudge(), Fudge::new(0, -400_000_000));

        for raw in [0, 999_999_999, 123] {
            assert!(!calibrator.observe(raw));
        }
        assert_eq!(calibrator.fudge(), Fudge::new(0, -400_000_000));
    }

    #[test]
    fn average_truncates() {
        let mut calibrator = FudgeCalibrator::new(Fudge::ZERO, 2);
        calibrator.observe(1);
        calibrator.observe(2);
        assert_eq!(calibrator.fudge(), Fudge::new(0, -1));
    }

    #[test]
    fn disabled_rebase_keeps_initial() {
        for count in [0, -1] {
            let initial = Fudge::from_micros(-1500);
            let mut calibrator = FudgeCalibrator::new(initial, count);

            assert!(!calibrator.is_calibrating());
            assert!(!calibrator.observe(300_000_000));
            assert_eq!(calibrator.fudge(), initial);
        }
    }
}
