use std::time::Duration;

use super::AudioSource;
use crate::constants::{SILENT_FRAME, TIMESTEP_LENGTH};

/// Silence which lasts for a fixed number of ticks, then finishes.
///
/// Never produces a frame: every [`has_next_frame`] call consumes one tick and returns `false`.
/// Once the countdown reaches zero, [`has_finished`] is `true` for good.
///
/// Always reports itself as muted; [`set_muted`] is ignored.
///
/// [`has_next_frame`]: AudioSource::has_next_frame
/// [`has_finished`]: AudioSource::has_finished
/// [`set_muted`]: AudioSource::set_muted
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoundedSilence {
    ticks: u64,
    remaining: u64,
}

impl BoundedSilence {
    /// Silence lasting `duration`, rounded down to whole 20ms ticks.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self::from_ticks((duration.as_millis() / TIMESTEP_LENGTH.as_millis()) as u64)
    }

    #[must_use]
    pub fn from_ticks(ticks: u64) -> Self {
        Self {
            ticks,
            remaining: ticks,
        }
    }

    /// Ticks left before this source finishes.
    #[must_use]
    pub fn remaining_ticks(&self) -> u64 {
        self.remaining
    }
}

impl AudioSource for BoundedSilence {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn has_next_frame(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        false
    }

    fn has_finished(&self) -> bool {
        self.remaining == 0
    }

    fn is_muted(&self) -> bool {
        true
    }

    fn set_muted(&mut self, _muted: bool) {}

    fn copy(&self) -> Box<dyn AudioSource> {
        Box::new(Self::from_ticks(self.ticks))
    }
}

/// Silence which never ends, emitting the 3-byte silence sentinel on every tick.
///
/// Always reports itself as muted; [`set_muted`] is ignored.
///
/// [`set_muted`]: AudioSource::set_muted
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConstantSilence;

impl AudioSource for ConstantSilence {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        Some(SILENT_FRAME.to_vec())
    }

    fn has_next_frame(&mut self) -> bool {
        true
    }

    fn has_finished(&self) -> bool {
        false
    }

    fn is_muted(&self) -> bool {
        true
    }

    fn set_muted(&mut self, _muted: bool) {}

    fn copy(&self) -> Box<dyn AudioSource> {
        Box::new(Self)
    }
}
