//! Diagnostic output pulse for measuring capture latency with a scope

/// A GPIO line driven by the daemon
pub trait OutputLine {
    type Error: core::fmt::Debug;

    /// Drive the line high (`true`) or low (`false`)
    fn set_level(&mut self, high: bool) -> Result<(), Self::Error>;
}

/// Toggles an output line once per processed pulse, so the delay between
/// the PPS edge and its processing can be measured by comparing both lines.
/// Does nothing when no line is configured.
#[derive(Debug)]
pub struct OutputPulser<O> {
    line: Option<O>,
    next_level: bool,
}

impl<O: OutputLine> OutputPulser<O> {
    /// `first_level` is the level written by the first [`toggle`](Self::toggle)
    pub fn new(line: Option<O>, first_level: bool) -> Self {
        Self {
            line,
            next_level: first_level,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.line.is_some()
    }

    pub fn toggle(&mut self) -> Result<(), O::Error> {
        if let Some(line) = self.line.as_mut() {
            line.set_level(self.next_level)?;
            self.next_level = !self.next_level;
        }

        Ok(())
    }

    pub fn line(&self) -> Option<&O> {
        self.line.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::vec::Vec;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingLine {
        pub levels: Vec<bool>,
        pub fail: bool,
    }

    impl OutputLine for RecordingLine {
        type Error = ();

        fn set_level(&mut self, high: bool) -> Result<(), Self::Error> {
            if self.fail {
                return Err(());
            }
            self.levels.push(high);
            Ok(())
        }
    }

    #[test]
    fn toggle_alternates() {
        for first in [true, false] {
            let mut pulser = OutputPulser::new(Some(RecordingLine::default()), first);
            for _ in 0..5 {
                pulser.toggle().unwrap();
            }

            let levels = &pulser.line().unwrap().levels;
            assert_eq!(levels.len(), 5);
            assert_eq!(levels[0], first);
            assert!(levels.windows(2).all(|pair| pair[0] != pair[1]));
        }
    }

    #[test]
    fn failed_write_keeps_level() {
        let mut pulser = OutputPulser::new(
            Some(RecordingLine {
                levels: Vec::new(),
                fail: true,
            }),
            true,
        );
        assert!(pulser.toggle().is_err());
        assert!(pulser.next_level);
    }

    #[test]
    fn disabled_is_noop() {
        let mut pulser = OutputPulser::<RecordingLine>::disabled();
        assert!(!pulser.is_enabled());
        assert!(pulser.toggle().is_ok());
    }
}
