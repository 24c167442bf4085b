use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    /// Seconds since the clock was created or last reset. Sums clamped deltas,
    /// so long stalls do not make animations jump.
    pub elapsed: f32,
    pub now: Instant,
    pub frame_index: u64,
}

/// Produces one [`FrameTime`] per tick.
///
/// Deltas are clamped to `[dt_min, dt_max]`: a minimum so tight loops never
/// report zero, a maximum so a stall (debugger, minimized window) does not
/// arrive as one huge step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    elapsed: f32,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            elapsed: 0.0,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts timing from now; the frame counter keeps counting.
    pub fn reset(&mut self) {
        self.last = Instant::now();
        self.elapsed = 0.0;
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max)
            .as_secs_f32();

        self.last = now;
        self.elapsed += dt;

        let time = FrameTime {
            dt,
            elapsed: self.elapsed,
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        time
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_are_clamped_and_frames_counted() {
        let min = Duration::from_millis(5);
        let mut clock = FrameClock::with_clamps(min, Duration::from_millis(10));

        let a = clock.tick();
        let b = clock.tick();
        assert_eq!((a.frame_index, b.frame_index), (0, 1));
        assert!(a.dt >= min.as_secs_f32());
        assert!(b.dt <= 0.010 + f32::EPSILON);
        assert!((b.elapsed - (a.dt + b.dt)).abs() < 1e-6);
    }

    #[test]
    fn reset_restarts_elapsed_time() {
        let mut clock = FrameClock::default();
        clock.tick();
        clock.reset();
        let t = clock.tick();
        assert_eq!(t.frame_index, 1);
        assert!(t.elapsed <= 0.25);
    }
}
