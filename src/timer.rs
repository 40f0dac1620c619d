/// After a reset the display reads zero for this long, wall clock
pub const DISPLAY_HOLD_MS: f64 = 300.0;

/// Elapsed play time of one level run. Only grows, and only from the frame
/// deltas it's fed, so pausing is just not ticking.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LevelTimer {
    elapsed_ms: f64,
    hold_until: Option<f64>,
}

impl LevelTimer {
    pub fn new() -> Self {
        LevelTimer::default()
    }

    /// Hard reset: zero elapsed time and start the display hold at `now`
    pub fn reset(&mut self, now: f64) {
        self.elapsed_ms = 0.0;
        self.hold_until = Some(now + DISPLAY_HOLD_MS);
    }

    pub fn is_started(&self) -> bool {
        self.hold_until.is_some()
    }

    /// Accumulate one frame. A timer that was never reset resets itself first.
    /// Negative and non-finite deltas count as zero.
    pub fn tick(&mut self, now: f64, delta_ms: f64) {
        if !self.is_started() {
            self.reset(now);
        }
        if delta_ms.is_finite() && delta_ms > 0.0 {
            self.elapsed_ms += delta_ms;
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_ms / 1000.0
    }

    /// Seconds to show at `now`; zero while the reset hold lasts
    pub fn display_seconds(&self, now: f64) -> f64 {
        match self.hold_until {
            Some(until) if now < until => 0.0,
            _ => self.elapsed_seconds(),
        }
    }

    pub fn display(&self, now: f64) -> String {
        format_time(self.display_seconds(now))
    }
}

/// `m:ss.mmm`, minutes unpadded, every part truncated
pub fn format_time(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        // truncate, but absorb the ms -> s -> ms conversion error
        (seconds * 1000.0 + 1e-6).floor() as u64
    } else {
        0
    };
    let minutes = total_ms / 60_000;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{}:{:02}.{:03}", minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn formats_minutes_seconds_millis() {
        assert_eq!(format_time(75.123), "1:15.123");
        assert_eq!(format_time(0.0), "0:00.000");
        assert_eq!(format_time(9.5), "0:09.500");
        assert_eq!(format_time(600.001), "10:00.001");
    }

    #[test]
    fn partial_milliseconds_are_dropped() {
        assert_eq!(format_time(59.9996), "0:59.999");
        assert_eq!(format_time(42.0006), "0:42.000");
        assert_eq!(format_time(1.0009), "0:01.000");
    }

    #[test]
    fn bad_inputs_format_as_zero() {
        assert_eq!(format_time(-3.0), "0:00.000");
        assert_eq!(format_time(f64::NAN), "0:00.000");
        assert_eq!(format_time(f64::INFINITY), "0:00.000");
    }

    #[test]
    fn elapsed_never_decreases() {
        let mut timer = LevelTimer::new();
        timer.reset(0.0);
        timer.tick(16.0, 16.0);
        let before = timer.elapsed_ms();
        timer.tick(17.0, -50.0);
        timer.tick(18.0, f64::NAN);
        timer.tick(19.0, f64::INFINITY);
        assert_relative_eq!(timer.elapsed_ms(), before);
        timer.tick(35.0, 16.0);
        assert_relative_eq!(timer.elapsed_ms(), 32.0);
    }

    #[test]
    fn display_is_zero_during_the_hold() {
        let mut timer = LevelTimer::new();
        timer.reset(1000.0);
        for frame in 1..=10 {
            timer.tick(1000.0 + frame as f64 * 20.0, 20.0);
        }
        assert_relative_eq!(timer.elapsed_ms(), 200.0);
        assert_eq!(timer.display(1200.0), "0:00.000");
        assert_eq!(timer.display(1300.0), "0:00.200");
    }

    #[test]
    fn first_tick_without_reset_starts_the_timer() {
        let mut timer = LevelTimer::new();
        assert!(!timer.is_started());
        timer.tick(500.0, 16.0);
        assert!(timer.is_started());
        assert_relative_eq!(timer.elapsed_ms(), 16.0);
        assert_relative_eq!(timer.display_seconds(700.0), 0.0);
        assert_relative_eq!(timer.display_seconds(800.0), 0.016);
    }
}
