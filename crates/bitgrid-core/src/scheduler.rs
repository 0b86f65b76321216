//! Fixed-cadence tick source.
//!
//! The engine feeds real frame deltas in; a `TickTimer` answers how many
//! whole periods elapsed. Logic functions never see the clock.

use std::time::Duration;

use bitgrid_logic::constants::{ARENA_STEP_MS, PRODUCTION_PERIOD_MS};

/// Accumulates elapsed time and releases it in whole periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickTimer {
    period: Duration,
    accumulated: Duration,
    active: bool,
}

impl TickTimer {
    /// A zero period is bumped to one millisecond.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            accumulated: Duration::ZERO,
            active: true,
        }
    }

    /// One tick per second of production.
    pub fn production() -> Self {
        Self::new(Duration::from_millis(PRODUCTION_PERIOD_MS))
    }

    /// One tick per arena step.
    pub fn arena() -> Self {
        Self::new(Duration::from_millis(ARENA_STEP_MS))
    }

    /// Add `delta` and return the number of whole periods now due. The
    /// remainder carries over. A cancelled timer always returns 0.
    pub fn advance(&mut self, delta: Duration) -> u32 {
        if !self.active {
            return 0;
        }
        self.accumulated += delta;
        let period = self.period.as_nanos();
        let due = self.accumulated.as_nanos() / period;
        if due == 0 {
            return 0;
        }
        let rest = self.accumulated.as_nanos() % period;
        self.accumulated = Duration::from_nanos(rest as u64);
        u32::try_from(due).unwrap_or(u32::MAX)
    }

    /// Stop ticking and drop any partial period.
    pub fn cancel(&mut self) {
        self.active = false;
        self.accumulated = Duration::ZERO;
    }

    /// Resume from a clean slate.
    pub fn restart(&mut self) {
        self.active = true;
        self.accumulated = Duration::ZERO;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
