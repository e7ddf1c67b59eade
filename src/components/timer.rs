use std::time::Duration;

/// Upper bound on accumulated time. A timer parked on an energized coil for
/// days stops counting here instead of growing without bound.
pub const MAX_ELAPSED: Duration = Duration::from_secs(24 * 60 * 60);

/// On-delay timer driven by a relay coil.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DelayTimer {
    pub active: bool,
    pub elapsed: Duration,
    /// Delay latched when the coil was energized.
    pub delay: Duration,
}

impl DelayTimer {
    /// Latch `delay` and start counting from zero.
    pub fn start(&mut self, delay: Duration) {
        self.active = true;
        self.delay = delay;
        self.elapsed = Duration::ZERO;
    }

    /// Accumulate `dt` while active.
    pub fn advance(&mut self, dt: Duration) {
        if self.active {
            self.elapsed = self.elapsed.saturating_add(dt).min(MAX_ELAPSED);
        }
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.elapsed = Duration::ZERO;
    }

    pub fn expired(&self) -> bool {
        self.active && self.elapsed >= self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_lifecycle() {
        let mut timer = DelayTimer::default();
        timer.advance(Duration::from_secs(5));
        assert_eq!(timer.elapsed, Duration::ZERO);

        timer.start(Duration::from_millis(2000));
        timer.advance(Duration::from_millis(1500));
        assert!(!timer.expired());
        timer.advance(Duration::from_millis(500));
        assert!(timer.expired());

        timer.stop();
        assert!(!timer.active);
        assert_eq!(timer.elapsed, Duration::ZERO);
    }

    #[test]
    fn test_timer_saturates() {
        let mut timer = DelayTimer::default();
        timer.start(Duration::from_secs(1));
        timer.advance(Duration::MAX);
        timer.advance(Duration::MAX);
        assert_eq!(timer.elapsed, MAX_ELAPSED);
    }
}
