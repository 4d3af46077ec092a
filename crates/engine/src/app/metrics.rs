use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    /// Loop iterations per second.
    pub loop_hz: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    /// Iterations in the interval that hit the per-frame tick cap.
    pub clamp_events: u32,
}

/// Rolling counters for one metrics interval of the headless loop.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    iterations: u32,
    ticks: u32,
    clamp_events: u32,
    frame_time_sum: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval_start: start,
            interval,
            iterations: 0,
            ticks: 0,
            clamp_events: 0,
            frame_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_iteration(&mut self, frame_dt: Duration) {
        self.iterations = self.iterations.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
    }

    pub(crate) fn record_ticks(&mut self, ticks: u32) {
        self.ticks = self.ticks.saturating_add(ticks);
    }

    pub(crate) fn record_clamp(&mut self) {
        self.clamp_events = self.clamp_events.saturating_add(1);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.iterations == 0 {
            0.0
        } else {
            (self.frame_time_sum.as_secs_f32() / self.iterations as f32) * 1000.0
        };

        let snapshot = LoopMetricsSnapshot {
            loop_hz: self.iterations as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms,
            clamp_events: self.clamp_events,
        };

        self.interval_start = now;
        self.iterations = 0;
        self.ticks = 0;
        self.clamp_events = 0;
        self.frame_time_sum = Duration::ZERO;

        Some(snapshot)
    }
}
