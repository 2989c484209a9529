use std::time::{Duration, Instant};

/// Ticks after which the schedule's origin is moved forward, keeping multiplication small.
const REBASE_INTERVAL: u32 = 1 << 16;

/// Absolute tick deadlines: tick `n` is due at `start + n * period`.
///
/// Deadlines never depend on when previous ticks actually ran, so per-tick processing cost
/// cannot accumulate into drift.
#[derive(Clone, Debug)]
pub(crate) struct Schedule {
    start: Instant,
    period: Duration,
    tick: u32,
}

impl Schedule {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(Instant::now(), period)
    }

    pub fn starting_at(start: Instant, period: Duration) -> Self {
        Self {
            start,
            period,
            tick: 0,
        }
    }

    /// Restarts the schedule with tick 0 due now.
    pub fn restart(&mut self) {
        self.start = Instant::now();
        self.tick = 0;
    }

    /// Deadline of the current tick.
    pub fn deadline(&self) -> Instant {
        self.start + self.period * self.tick
    }

    /// Moves to the next tick, returning its deadline.
    pub fn advance(&mut self) -> Instant {
        self.tick += 1;

        if self.tick == REBASE_INTERVAL {
            self.start = self.deadline();
            self.tick = 0;
        }

        self.deadline()
    }

    /// Drops every tick which is already more than one period late, returning how many were
    /// skipped.
    pub fn skip_missed(&mut self, now: Instant) -> u32 {
        let mut skipped = 0;

        while now.saturating_duration_since(self.deadline()) > self.period {
            self.advance();
            skipped += 1;
        }

        skipped
    }
}
