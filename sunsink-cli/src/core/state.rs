use sunsink_quantities::Watts;

/// Rate limit: number of remaining ticks during which no actuation is allowed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[must_use]
pub struct Lock(u32);

impl Lock {
    pub const fn arm(&mut self, ticks: u32) {
        self.0 = ticks;
    }

    /// Count down one tick, stopping at zero.
    pub const fn tick(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    #[must_use]
    pub const fn is_locked(self) -> bool {
        self.0 != 0
    }

    #[must_use]
    pub const fn remaining(self) -> u32 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ControlState {
    /// Primary charging switch is confirmed to be on.
    pub charging: bool,

    /// Aggregate charging power requested across all charging paths.
    pub setpoint: Watts,

    /// Part of the setpoint sent to the batteries, the rest is taken by the secondary path.
    pub primary_share: Watts,

    pub lock: Lock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_counts_down_to_zero() {
        let mut lock = Lock::default();
        lock.arm(3);
        let mut remaining = Vec::new();
        for _ in 0..5 {
            lock.tick();
            remaining.push(lock.remaining());
        }
        assert_eq!(remaining, [2, 1, 0, 0, 0]);
        assert!(!lock.is_locked());
    }

    #[test]
    fn rearming_restarts_the_countdown() {
        let mut lock = Lock::default();
        lock.arm(4);
        lock.tick();
        lock.arm(4);
        assert_eq!(lock.remaining(), 4);
        assert!(lock.is_locked());
    }
}
