#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaybackClock {
    pub time_seconds: f32,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

/// Fires once every `interval_seconds` of accumulated time. A non-positive
/// interval never fires.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalTimer {
    interval_seconds: f32,
    elapsed: f32,
}

impl IntervalTimer {
    pub fn new(interval_seconds: f32) -> Self {
        Self {
            interval_seconds,
            elapsed: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_seconds > 0.0
    }

    /// Accumulates `delta` and returns how many intervals elapsed.
    pub fn tick(&mut self, delta: f32) -> u32 {
        if !self.is_enabled() {
            return 0;
        }

        self.elapsed += delta.max(0.0);
        let mut fired = 0;
        while self.elapsed >= self.interval_seconds {
            self.elapsed -= self.interval_seconds;
            fired += 1;
        }
        fired
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_never_goes_negative() {
        let mut clock = PlaybackClock::default();
        clock.advance(0.5);
        clock.advance(-2.0);
        assert_eq!(clock.time_seconds, 0.0);
    }

    #[test]
    fn timer_fires_per_interval() {
        let mut timer = IntervalTimer::new(1.0);

        assert_eq!(timer.tick(0.6), 0);
        assert_eq!(timer.tick(0.6), 1);
        assert_eq!(timer.tick(2.0), 2);
    }

    #[test]
    fn disabled_timer_is_silent() {
        let mut timer = IntervalTimer::new(0.0);
        assert!(!timer.is_enabled());
        assert_eq!(timer.tick(100.0), 0);
    }
}
