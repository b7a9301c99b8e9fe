use std::time::{Duration, Instant};

/// One step of the renderer's frame clock, handed to page content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Seconds since the clock started.
    pub now: f64,
    /// Seconds since the previous tick.
    pub delta: f64,
    /// Number of ticks before this one.
    pub frame: u64,
}

/// Monotonic clock driving `Renderer::update`.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last: f64,
    frame: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), last: 0.0, frame: 0 }
    }

    /// Seconds since the clock started.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn tick(&mut self) -> Tick {
        self.tick_at(self.start.elapsed())
    }

    // Time never runs backwards, even if `elapsed` does.
    pub(crate) fn tick_at(&mut self, elapsed: Duration) -> Tick {
        let now = elapsed.as_secs_f64().max(self.last);
        let tick = Tick { now, delta: now - self.last, frame: self.frame };
        self.last = now;
        self.frame += 1;
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_monotonic() {
        let mut clock = FrameClock::new();
        let a = clock.tick_at(Duration::from_millis(100));
        let b = clock.tick_at(Duration::from_millis(50));
        assert_eq!(a.frame, 0);
        assert_eq!(b.frame, 1);
        assert_eq!(b.now, a.now);
        assert_eq!(b.delta, 0.0);

        let c = clock.tick_at(Duration::from_millis(350));
        assert!((c.delta - 0.25).abs() < 1e-9);
    }
}
