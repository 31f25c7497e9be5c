/// Pre-run countdown.
///
/// Advanced cooperatively by whoever owns the session: one `tick()` per
/// period. Dropping or cancelling the countdown aborts the pending
/// transition, nothing fires afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    cancelled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownTick {
    /// Still counting, value is the ticks left
    Remaining(u32),
    /// Reached zero on this tick
    Elapsed,
    /// Cancelled or already elapsed earlier
    Inactive,
}

impl Countdown {
    pub fn new(ticks: u32) -> Self {
        Self {
            remaining: ticks,
            cancelled: false,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled && self.remaining > 0
    }

    pub fn tick(&mut self) -> CountdownTick {
        if !self.is_active() {
            return CountdownTick::Inactive;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            CountdownTick::Elapsed
        } else {
            CountdownTick::Remaining(self.remaining)
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}
