//! The per-pulse state machine tying all components together

use crate::{
    calibrate::FudgeCalibrator,
    clock::Clock,
    config::CaptureConfig,
    correct::{Correction, TimestampCorrector},
    edge::{EdgeMode, EdgeSource},
    observability::CaptureState,
    output::{OutputLine, OutputPulser},
    shm::{ShmPublisher, TimeExchange},
    stats::DebugStatsTracker,
};

/// Failure of one of the collaborators of the [`CaptureLoop`].
///
/// All of these are fatal: a time source that cannot read its own inputs
/// must stop publishing.
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum CaptureError<S, C, O> {
    #[cfg_attr(feature = "std", error("waiting for a PPS edge failed: {0:?}"))]
    EdgeSource(S),
    #[cfg_attr(feature = "std", error("reading the clock failed: {0:?}"))]
    Clock(C),
    #[cfg_attr(feature = "std", error("driving the output pulse failed: {0:?}"))]
    OutputLine(O),
}

/// What happened to a detected pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The capture was dropped because the edge source could not guarantee
    /// it was taken at an actual edge
    Skipped,
    /// The capture was consumed by the fudge calibration
    Calibrating,
    /// The capture was corrected and handed to the time daemon
    Published(Correction),
}

type Error<S, C, O> = CaptureError<
    <S as EdgeSource>::Error,
    <C as Clock>::Error,
    <O as OutputLine>::Error,
>;

/// Drives one detected pulse at a time from the [`EdgeSource`] through
/// calibration and correction into the shared memory segment.
///
/// Every cycle runs the same steps in the same order: wait for the edge,
/// read the clock, calibrate or correct, publish, toggle the output pulse
/// and log statistics. The only place a cycle blocks is the wait for the
/// edge.
pub struct CaptureLoop<S, C, T, O> {
    source: S,
    clock: C,
    edge_mode: EdgeMode,
    calibrator: FudgeCalibrator,
    corrector: TimestampCorrector,
    publisher: ShmPublisher<T>,
    pulser: OutputPulser<O>,
    stats: Option<DebugStatsTracker>,
    skip_next: bool,
    pulses: u64,
    last: Option<Correction>,
}

impl<S, C, T, O> CaptureLoop<S, C, T, O>
where
    S: EdgeSource,
    C: Clock,
    T: TimeExchange,
    O: OutputLine,
{
    pub fn new(
        config: CaptureConfig,
        source: S,
        clock: C,
        publisher: ShmPublisher<T>,
        pulser: OutputPulser<O>,
    ) -> Self {
        let skip_next = !source.captures_first_edge_reliably();

        Self {
            source,
            clock,
            edge_mode: config.edge_mode,
            calibrator: FudgeCalibrator::new(config.fudge, config.rebase_count),
            corrector: TimestampCorrector::new(),
            publisher,
            pulser,
            stats: config.debug.then(DebugStatsTracker::new),
            skip_next,
            pulses: 0,
            last: None,
        }
    }

    /// Process pulses until a collaborator fails, calling `on_cycle` after
    /// every pulse. Only returns with the failure.
    pub fn run(&mut self, mut on_cycle: impl FnMut(&Self, CycleOutcome)) -> Error<S, C, O> {
        log::info!("Waiting for PPS edges ({:?})", self.edge_mode);

        loop {
            match self.step() {
                Ok(outcome) => on_cycle(self, outcome),
                Err(error) => return error,
            }
        }
    }

    /// Wait for the next pulse and process it
    pub fn step(&mut self) -> Result<CycleOutcome, Error<S, C, O>> {
        self.wait_for_edge()?;
        let raw = self.clock.now().map_err(CaptureError::Clock)?;
        self.pulses += 1;

        let outcome = if self.skip_next {
            self.skip_next = false;
            log::trace!("Not using first capture {raw}, it may not be at an edge");
            CycleOutcome::Skipped
        } else if self.calibrator.observe(raw.nanos) {
            self.publisher.invalidate();
            CycleOutcome::Calibrating
        } else {
            let correction = self.corrector.correct(raw, self.calibrator.fudge());
            self.publisher.publish(correction.receive, correction.clock);
            self.last = Some(correction);
            CycleOutcome::Published(correction)
        };

        self.pulser.toggle().map_err(CaptureError::OutputLine)?;

        if let Some(stats) = self.stats.as_mut() {
            let observed = match outcome {
                CycleOutcome::Published(correction) => correction.receive,
                CycleOutcome::Skipped | CycleOutcome::Calibrating => raw,
            };
            stats.record(observed.signed_subsecond());
            log::debug!(
                "{}",
                stats.report(
                    observed,
                    self.corrector.wraps(),
                    self.publisher.retrieved()
                )
            );
        }

        Ok(outcome)
    }

    fn wait_for_edge(&mut self) -> Result<(), Error<S, C, O>> {
        match self.edge_mode {
            EdgeMode::Rising => self
                .source
                .wait_for_rising_edge()
                .map_err(CaptureError::EdgeSource),
            EdgeMode::Both => loop {
                self.source
                    .wait_for_either_edge()
                    .map_err(CaptureError::EdgeSource)?;

                if self.source.read_level().map_err(CaptureError::EdgeSource)? {
                    return Ok(());
                }

                log::trace!("Ignoring falling edge");
            },
        }
    }

    pub fn state(&self) -> CaptureState {
        CaptureState {
            fudge: self.calibrator.fudge(),
            calibrating: self.calibrator.is_calibrating(),
            pulses: self.pulses,
            published: self.publisher.published(),
            wraps: self.corrector.wraps(),
            retrieved: self.publisher.retrieved(),
            last_receive: self.last.map(|correction| correction.receive),
            last_clock: self.last.map(|correction| correction.clock.seconds),
        }
    }

    pub fn calibrator(&self) -> &FudgeCalibrator {
        &self.calibrator
    }

    pub fn publisher(&self) -> &ShmPublisher<T> {
        &self.publisher
    }

    pub fn pulser(&self) -> &OutputPulser<O> {
        &self.pulser
    }

    pub fn stats(&self) -> Option<&DebugStatsTracker> {
        self.stats.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, vec, vec::Vec};

    use super::*;
    use crate::{
        output::tests::RecordingLine,
        shm::tests::{Access, RecordingSegment},
        time::{Fudge, Timestamp},
    };

    #[derive(Debug, PartialEq, Eq)]
    enum ScriptError {
        Exhausted,
    }

    /// Edge source replaying a list of line levels, one per edge
    struct ScriptedSource {
        edges: VecDeque<bool>,
        level: bool,
        reliable_first: bool,
    }

    impl ScriptedSource {
        fn new(edges: Vec<bool>) -> Self {
            Self {
                edges: edges.into(),
                level: false,
                reliable_first: true,
            }
        }

        fn polling(edges: Vec<bool>) -> Self {
            Self {
                reliable_first: false,
                ..Self::new(edges)
            }
        }
    }

    impl EdgeSource for ScriptedSource {
        type Error = ScriptError;

        fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
            loop {
                self.level = self.edges.pop_front().ok_or(ScriptError::Exhausted)?;
                if self.level {
                    return Ok(());
                }
            }
        }

        fn wait_for_either_edge(&mut self) -> Result<(), Self::Error> {
            self.level = self.edges.pop_front().ok_or(ScriptError::Exhausted)?;
            Ok(())
        }

        fn read_level(&mut self) -> Result<bool, Self::Error> {
            Ok(self.level)
        }

        fn captures_first_edge_reliably(&self) -> bool {
            self.reliable_first
        }
    }

    struct ScriptedClock {
        times: VecDeque<Timestamp>,
        reads: usize,
    }

    impl ScriptedClock {
        fn new(times: &[(i64, i64)]) -> Self {
            Self {
                times: times
                    .iter()
                    .map(|&(seconds, nanos)| Timestamp::new(seconds, nanos))
                    .collect(),
                reads: 0,
            }
        }
    }

    impl Clock for ScriptedClock {
        type Error = ScriptError;

        fn now(&mut self) -> Result<Timestamp, Self::Error> {
            self.reads += 1;
            self.times.pop_front().ok_or(ScriptError::Exhausted)
        }
    }

    type TestLoop = CaptureLoop<ScriptedSource, ScriptedClock, RecordingSegment, RecordingLine>;

    fn setup_test_loop(
        config: CaptureConfig,
        source: ScriptedSource,
        times: &[(i64, i64)],
    ) -> TestLoop {
        CaptureLoop::new(
            config,
            source,
            ScriptedClock::new(times),
            ShmPublisher::new(RecordingSegment::default()),
            OutputPulser::new(Some(RecordingLine::default()), true),
        )
    }

    fn run_to_end(
        capture: &mut TestLoop,
    ) -> (
        Vec<CycleOutcome>,
        Error<ScriptedSource, ScriptedClock, RecordingLine>,
    ) {
        let mut outcomes = Vec::new();
        let error = capture.run(|_, outcome| outcomes.push(outcome));
        (outcomes, error)
    }

    #[test]
    fn calibration_withholds_publication() {
        let config = CaptureConfig {
            rebase_count: 3,
            ..Default::default()
        };
        let mut capture = setup_test_loop(
            config,
            ScriptedSource::new(vec![true; 4]),
            &[
                (100, 100_000_000),
                (101, 200_000_000),
                (102, 300_000_000),
                (103, 400_000_000),
            ],
        );

        let (outcomes, error) = run_to_end(&mut capture);
        assert!(matches!(error, CaptureError::EdgeSource(ScriptError::Exhausted)));

        assert_eq!(outcomes[..3], [CycleOutcome::Calibrating; 3]);
        let CycleOutcome::Published(correction) = outcomes[3] else {
            panic!("expected a publication, got {:?}", outcomes[3]);
        };
        assert_eq!(correction.receive, Timestamp::new(103, 200_000_000));
        assert_eq!(correction.clock, Timestamp::new(103, 0));

        assert_eq!(capture.calibrator().fudge(), Fudge::new(0, -200_000_000));

        let segment = capture.publisher().segment();
        assert_eq!(segment.samples(), [(103, 200_000, 103, 0)]);
        assert_eq!(
            segment.writes[..3],
            [Access::Valid(false), Access::Valid(false), Access::Valid(false)]
        );
        assert_eq!(capture.publisher().published(), 1);
    }

    #[test]
    fn every_edge_published_without_rebase() {
        let mut capture = setup_test_loop(
            CaptureConfig {
                fudge: Fudge::from_micros(-100_000),
                ..Default::default()
            },
            ScriptedSource::new(vec![true; 3]),
            &[(100, 400_000_000), (101, 700_000_000), (102, 50_000_000)],
        );

        let (outcomes, _) = run_to_end(&mut capture);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, CycleOutcome::Published(_))));

        assert_eq!(
            capture.publisher().segment().samples(),
            [
                (100, 300_000, 100, 0),
                (101, 600_000, 102, 0),
                (101, 950_000, 102, 0),
            ]
        );

        let state = capture.state();
        assert_eq!(state.pulses, 3);
        assert_eq!(state.published, 3);
        assert_eq!(state.wraps, 2);
        assert_eq!(state.last_clock, Some(102));
        assert!(!state.calibrating);
    }

    #[test]
    fn published_metadata_is_zero() {
        let mut capture = setup_test_loop(
            CaptureConfig::default(),
            ScriptedSource::new(vec![true; 2]),
            &[(1, 0), (2, 999_999_999)],
        );
        run_to_end(&mut capture);

        let metadata: Vec<_> = capture
            .publisher()
            .segment()
            .writes
            .iter()
            .filter(|access| matches!(access, Access::Metadata { .. }))
            .copied()
            .collect();
        assert_eq!(
            metadata,
            [Access::Metadata {
                mode: 0,
                count: 0,
                leap: 0,
                precision: 0
            }; 2]
        );
    }

    #[test]
    fn falling_edges_are_filtered() {
        let mut capture = setup_test_loop(
            CaptureConfig {
                edge_mode: EdgeMode::Both,
                ..Default::default()
            },
            ScriptedSource::new(vec![false, true, false, false, true]),
            &[(10, 1000), (11, 2000)],
        );

        let (outcomes, error) = run_to_end(&mut capture);
        assert!(matches!(error, CaptureError::EdgeSource(ScriptError::Exhausted)));
        assert_eq!(outcomes.len(), 2);
        assert_eq!(capture.clock.reads, 2);
        assert_eq!(capture.pulser().line().unwrap().levels, [true, false]);
    }

    #[test]
    fn unreliable_first_edge_is_skipped() {
        let mut capture = setup_test_loop(
            CaptureConfig {
                debug: true,
                ..Default::default()
            },
            ScriptedSource::polling(vec![true; 3]),
            &[(50, 123_000_000), (51, 1_000), (52, 2_000)],
        );

        let (outcomes, _) = run_to_end(&mut capture);
        assert_eq!(outcomes[0], CycleOutcome::Skipped);
        assert!(matches!(outcomes[1], CycleOutcome::Published(_)));
        assert!(matches!(outcomes[2], CycleOutcome::Published(_)));

        // skipped pulse still drives the diagnostics
        assert_eq!(capture.pulser().line().unwrap().levels, [true, false, true]);
        assert_eq!(capture.stats().unwrap().samples(), 3);
        assert_eq!(capture.publisher().published(), 2);
    }

    #[test]
    fn skipped_edge_does_not_count_for_rebase() {
        let mut capture = setup_test_loop(
            CaptureConfig {
                rebase_count: 1,
                ..Default::default()
            },
            ScriptedSource::polling(vec![true; 3]),
            &[(1, 900_000_000), (2, 100_000_000), (3, 150_000_000)],
        );

        let (outcomes, _) = run_to_end(&mut capture);
        assert_eq!(
            outcomes[..2],
            [CycleOutcome::Skipped, CycleOutcome::Calibrating]
        );
        assert_eq!(capture.calibrator().fudge(), Fudge::new(0, -100_000_000));
        assert_eq!(capture.publisher().segment().samples(), [(3, 50_000, 3, 0)]);
    }

    #[test]
    fn clock_failure_is_fatal() {
        let mut capture = setup_test_loop(
            CaptureConfig::default(),
            ScriptedSource::new(vec![true; 5]),
            &[(1, 0)],
        );

        let (outcomes, error) = run_to_end(&mut capture);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(error, CaptureError::Clock(ScriptError::Exhausted)));
    }

    #[test]
    fn output_failure_is_fatal() {
        let mut capture = CaptureLoop::new(
            CaptureConfig::default(),
            ScriptedSource::new(vec![true; 5]),
            ScriptedClock::new(&[(1, 0), (2, 0)]),
            ShmPublisher::new(RecordingSegment::default()),
            OutputPulser::new(
                Some(RecordingLine {
                    levels: Vec::new(),
                    fail: true,
                }),
                false,
            ),
        );

        assert!(matches!(capture.step(), Err(CaptureError::OutputLine(()))));
    }

    #[test]
    fn stats_disabled_without_debug() {
        let mut capture = setup_test_loop(
            CaptureConfig::default(),
            ScriptedSource::new(vec![true]),
            &[(1, 0)],
        );
        capture.step().unwrap();
        assert!(capture.stats().is_none());
    }
}
